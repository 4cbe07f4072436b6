use thiserror::Error;

#[derive(Error, Debug)]
pub enum PromptloomError {
    #[error("Not in a promptloom workspace. Run 'promptloom init' first.")]
    NotInitialized,

    #[error("Already initialized. Remove .promptloom/ to reinitialize.")]
    AlreadyInitialized,

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Ambiguous id '{0}' matches more than one record; use a longer prefix")]
    AmbiguousId(String),

    #[error("Not signed in: {0}")]
    Auth(String),

    #[error("Cloud backend not configured (missing backend.url or backend.anonKey)")]
    NotConfigured,

    /// Backend rejected the call; carries the backend's message verbatim.
    #[error("{0}")]
    Remote(String),

    #[error("AI provider error: {0}")]
    Provider(String),

    #[error("Could not decode {0}")]
    Decode(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search cache error: {0}")]
    Cache(#[from] rusqlite::Error),
}

impl PromptloomError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        PromptloomError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PromptloomError>;
