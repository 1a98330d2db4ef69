//! Error types for the search workflow.

use thiserror::Error;

/// A precondition that failed before any request left the client.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Please upload at least one chip")]
    NoChipsSelected,
    #[error("Please enter class name")]
    MissingClassName,
    #[error("Please enter index path")]
    InvalidPath,
    #[error("Invalid {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("Results are not available until a search has completed")]
    ResultsUnavailable,
    #[error("No results to export")]
    NoResultsToExport,
    #[error("Please enter team name")]
    MissingTeamName,
    #[error("No files selected")]
    EmptyBatch,
    #[error("Unknown chip: {0}")]
    UnknownChip(String),
}

pub const UNREACHABLE_MESSAGE: &str = "Backend unreachable";
pub const INVALID_RESPONSE_MESSAGE: &str = "Invalid response from backend";

/// Failure of a single backend call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("{0}")]
    Unreachable(String),
    #[error("backend returned {status}: {}", .detail.as_deref().unwrap_or("no detail"))]
    Rejected { status: u16, detail: Option<String> },
    #[error("failed to parse backend response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Backend-supplied detail when present, else a fixed line. Transport text stays in logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected { detail: Some(detail), .. } => detail.clone(),
            Self::Rejected { status, detail: None } => {
                format!("Backend request failed with status {}", status)
            }
            Self::Unreachable(_) => UNREACHABLE_MESSAGE.to_string(),
            Self::Decode(_) => INVALID_RESPONSE_MESSAGE.to_string(),
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Unreachable(e.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("Failed to upload {filename}: {cause}")]
pub struct UploadError {
    pub filename: String,
    pub cause: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    BackendUnreachable(String),
    #[error("{0}")]
    BackendRejected(String),
    #[error("Search failed: {message}")]
    SearchFailed { message: String },
    #[error("Failed to load index: {0}")]
    LoadFailed(String),
    #[error("Failed to export results: {0}")]
    ExportFailed(String),
    #[error("Another operation is still running")]
    Busy,
}

impl From<BackendError> for WorkflowError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Unreachable(_) => Self::BackendUnreachable(e.user_message()),
            other => Self::BackendRejected(other.user_message()),
        }
    }
}

pub type Result<T, E = WorkflowError> = std::result::Result<T, E>;
