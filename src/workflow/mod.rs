pub mod chips;
pub mod export;
pub mod index_loader;
pub mod presenter;
pub mod search;
pub mod status;
pub mod upload;
pub mod view;

pub use chips::ChipRegistry;
pub use export::ExportPackager;
pub use index_loader::IndexLoader;
pub use presenter::{classify, present, ResultView, Tier, DISPLAY_CAP};
pub use search::SearchExecutor;
pub use status::{CachedStatus, StatusProbe};
pub use upload::{UploadCoordinator, UploadOutcome};
pub use view::{Event, View, WorkflowState};
