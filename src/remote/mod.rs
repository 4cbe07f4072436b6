//! Hosted backend access: auth, table transport and the entity mirror.

mod auth;
mod http;
mod memory;
mod mirror;
mod rows;

pub use auth::{get_session, AuthBackend, AuthUser, Session, SignUpOutcome};
pub use http::HttpBackend;
pub use memory::MemoryBackend;
pub use mirror::RemoteMirror;
pub use rows::{ArticleRow, PromptRow, RoleRow, ScenarioRow, TableRecord};

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::BackendSettings;
use crate::error::Result;

/// A row as it travels over the wire.
pub type Row = serde_json::Value;

/// The three primitive table operations. Each call is scoped server-side to
/// the session's user.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Insert or replace rows keyed by `id`.
    async fn upsert_rows(&self, session: &Session, table: &str, rows: Vec<Row>) -> Result<()>;

    async fn delete_row(&self, session: &Session, table: &str, id: &str) -> Result<()>;

    /// All of the user's rows, or `None` if the table is not provisioned.
    async fn fetch_all(&self, session: &Session, table: &str) -> Result<Option<Vec<Row>>>;
}

/// Table transport and auth bound to the same backend.
#[derive(Clone)]
pub struct Backends {
    pub data: Arc<dyn RemoteBackend>,
    pub auth: Arc<dyn AuthBackend>,
}

impl Backends {
    /// HTTP bindings for the configured backend, or `None` if url or key is
    /// missing.
    pub fn http(settings: &BackendSettings) -> Option<Self> {
        if !settings.is_configured() {
            return None;
        }
        let backend = Arc::new(HttpBackend::new(&settings.url, &settings.anon_key));
        Some(Self {
            data: backend.clone(),
            auth: backend,
        })
    }

    pub fn memory(backend: Arc<MemoryBackend>) -> Self {
        Self {
            data: backend.clone(),
            auth: backend,
        }
    }
}
