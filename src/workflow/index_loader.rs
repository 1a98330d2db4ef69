use std::sync::Arc;

use log::{error, info};

use crate::backend::SearchBackend;
use crate::error::{BackendError, ValidationError, WorkflowError};
use crate::state::IndexInfo;

pub struct IndexLoader {
    backend: Arc<dyn SearchBackend>,
}

impl IndexLoader {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    pub async fn load(&self, index_dir: &str) -> Result<IndexInfo, WorkflowError> {
        if index_dir.trim().is_empty() {
            return Err(ValidationError::InvalidPath.into());
        }

        info!("loading index from \"{}\"", index_dir);
        let loaded = self.backend.load_index(index_dir).await.map_err(|e| {
            error!("index load failed: {}", e);
            match e {
                BackendError::Unreachable(_) => WorkflowError::BackendUnreachable(e.user_message()),
                other => WorkflowError::LoadFailed(other.user_message()),
            }
        })?;

        info!(
            "index loaded: {} vectors, {:?} images",
            loaded.total_vectors, loaded.unique_images
        );
        Ok(loaded)
    }
}
