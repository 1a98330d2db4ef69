pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod state;
pub mod workflow;

pub use controller::{ControllerSettings, WorkflowController};
pub use error::{BackendError, UploadError, ValidationError, WorkflowError};
