use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::backend::SearchBackend;
use crate::error::WorkflowError;
use crate::state::SearchStatus;

/// Last known backend readiness. Stale between probes.
#[derive(Clone, Debug, Default)]
pub struct CachedStatus {
    pub status: SearchStatus,
    pub probed_at: Option<DateTime<Utc>>,
}

pub struct StatusProbe {
    backend: Arc<dyn SearchBackend>,
}

impl StatusProbe {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    pub async fn probe(&self) -> Result<SearchStatus, WorkflowError> {
        let status = self.backend.status().await.map_err(|e| {
            warn!("status probe against {} failed: {}", self.backend.endpoint(), e);
            WorkflowError::BackendUnreachable(e.user_message())
        })?;
        debug!(
            "status: embedder={} index={} size={:?}",
            status.embedder_loaded, status.index_loaded, status.index_size
        );
        Ok(status)
    }

    /// Probes and folds the outcome into `cache`; failures keep the old value.
    pub async fn refresh(&self, cache: CachedStatus) -> CachedStatus {
        match self.probe().await {
            Ok(status) => CachedStatus {
                status,
                probed_at: Some(Utc::now()),
            },
            Err(_) => cache,
        }
    }
}
