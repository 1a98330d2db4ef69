use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use log::{error, info, warn};
use tokio::fs::OpenOptions;

use crate::backend::SearchBackend;
use crate::error::{ValidationError, WorkflowError};
use crate::state::{Detection, ExportArtifact};

pub struct ExportPackager {
    backend: Arc<dyn SearchBackend>,
    output_dir: PathBuf,
}

fn artifact_path(dir: &Path, token: i64) -> PathBuf {
    dir.join(format!("submission_{}.txt", token))
}

/// Creates `submission_<token>.txt.part` exclusively, bumping the token past
/// any name another writer already holds.
async fn reserve_partial(dir: &Path, millis: i64) -> std::io::Result<(i64, PathBuf)> {
    let mut token = millis;
    loop {
        let partial = artifact_path(dir, token).with_extension("txt.part");
        match OpenOptions::new().write(true).create_new(true).open(&partial).await {
            Ok(_) => return Ok((token, partial)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => token += 1,
            Err(e) => return Err(e),
        }
    }
}

/// Links the finished partial to the first free `submission_<token>.txt`.
/// Never replaces an existing artifact.
async fn publish(dir: &Path, partial: &Path, token: i64) -> std::io::Result<PathBuf> {
    let mut token = token;
    loop {
        let path = artifact_path(dir, token);
        match tokio::fs::hard_link(partial, &path).await {
            Ok(()) => return Ok(path),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => token += 1,
            Err(e) => return Err(e),
        }
    }
}

async fn write_artifact(dir: &Path, bytes: &[u8]) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let (token, partial) = reserve_partial(dir, Utc::now().timestamp_millis()).await?;
    let published = match tokio::fs::write(&partial, bytes).await {
        Ok(()) => publish(dir, &partial, token).await,
        Err(e) => Err(e),
    };
    if let Err(e) = tokio::fs::remove_file(&partial).await {
        warn!("could not remove {:?}: {}", partial, e);
    }
    published
}

impl ExportPackager {
    pub fn new(backend: Arc<dyn SearchBackend>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            output_dir: output_dir.into(),
        }
    }

    pub async fn export(
        &self,
        detections: &[Detection],
        team_name: &str,
    ) -> Result<ExportArtifact, WorkflowError> {
        let team_name = team_name.trim();
        if team_name.is_empty() {
            return Err(ValidationError::MissingTeamName.into());
        }

        let submission = self
            .backend
            .export_submission(detections, team_name)
            .await
            .map_err(|e| {
                error!("export failed: {}", e);
                WorkflowError::ExportFailed(e.user_message())
            })?;

        let path = write_artifact(&self.output_dir, &submission.bytes)
            .await
            .map_err(|e| {
                error!("writing submission to {:?} failed: {}", self.output_dir, e);
                WorkflowError::ExportFailed(e.to_string())
            })?;

        info!(
            "exported {} detections ({} bytes) to {:?}",
            detections.len(),
            submission.bytes.len(),
            path
        );
        Ok(ExportArtifact {
            path,
            server_filename: submission.server_filename,
            size: submission.bytes.len(),
            detections: detections.len(),
        })
    }
}
