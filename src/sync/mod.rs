//! When and how local state meets the cloud.

mod orchestrator;
pub mod reconcile;
mod status;

pub use orchestrator::{PushHandle, PushOp, SyncOrchestrator, SyncOutcome};
pub use reconcile::{Choice, SyncDecision};
pub use status::{StatusIndicator, SyncStatus, ERROR_DISPLAY, SUCCESS_DISPLAY};
