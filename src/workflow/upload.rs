use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use crate::backend::SearchBackend;
use crate::error::{UploadError, ValidationError, WorkflowError};
use crate::state::{Chip, ChipRegion};
use crate::workflow::chips::ChipRegistry;

pub type UploadOutcome = Result<Chip, UploadError>;

pub struct UploadCoordinator {
    backend: Arc<dyn SearchBackend>,
}

fn display_name(file: &Path) -> String {
    file.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.to_string_lossy().to_string())
}

impl UploadCoordinator {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    async fn upload_one(&self, file: &Path) -> UploadOutcome {
        let filename = display_name(file);
        let bytes = tokio::fs::read(file).await.map_err(|e| UploadError {
            filename: filename.clone(),
            cause: e.to_string(),
        })?;
        self.backend
            .upload_chip(&filename, bytes)
            .await
            .map_err(|e| {
                warn!("upload of {} failed: {}", filename, e);
                UploadError {
                    filename: filename.clone(),
                    cause: e.user_message(),
                }
            })
    }

    /// One independent attempt per file; outcomes come back in input order.
    pub async fn upload(&self, files: &[PathBuf]) -> Vec<UploadOutcome> {
        let attempts = files.iter().map(|f| self.upload_one(f));
        futures::future::join_all(attempts).await
    }

    pub async fn extract(&self, region: &ChipRegion) -> Result<Chip, WorkflowError> {
        validate_region(region)?;
        let mut chip = self.backend.draw_chip(region).await?;
        if chip.filename.is_empty() {
            chip.filename = format!(
                "{}@{},{}+{}x{}",
                display_name(Path::new(&region.image_path)),
                region.x,
                region.y,
                region.width,
                region.height
            );
        }
        Ok(chip)
    }
}

pub fn validate_region(region: &ChipRegion) -> Result<(), ValidationError> {
    if region.image_path.trim().is_empty() {
        return Err(ValidationError::InvalidPath);
    }
    if region.x < 0 || region.y < 0 {
        return Err(ValidationError::InvalidParameter {
            name: "origin",
            reason: format!("({}, {}) must not be negative", region.x, region.y),
        });
    }
    if region.width <= 0 || region.height <= 0 {
        return Err(ValidationError::InvalidParameter {
            name: "size",
            reason: format!("{}x{} must be positive", region.width, region.height),
        });
    }
    Ok(())
}

/// Registers every successful upload. A chip id the registry already holds
/// comes back as an error for that file.
pub fn reconcile(registry: &mut ChipRegistry, outcomes: Vec<UploadOutcome>) -> Vec<UploadOutcome> {
    let total = outcomes.len();
    let reconciled: Vec<UploadOutcome> = outcomes
        .into_iter()
        .map(|outcome| match outcome {
            Ok(chip) if !registry.insert(chip.clone()) => Err(UploadError {
                filename: chip.filename,
                cause: format!("duplicate chip id {}", chip.chip_id),
            }),
            other => other,
        })
        .inspect(|outcome| {
            if let Err(e) = outcome {
                warn!("{}", e);
            }
        })
        .collect();
    info!(
        "upload batch: {} of {} registered, {} chips total",
        reconciled.iter().filter(|o| o.is_ok()).count(),
        total,
        registry.len()
    );
    reconciled
}
