pub mod cli;
pub mod config;
pub mod entity;
pub mod error;
pub mod gateway;
pub mod remote;
pub mod search;
pub mod storage;
pub mod sync;
pub mod versioning;
pub mod workspace;

pub use error::{PromptloomError, Result};
pub use workspace::Workspace;
