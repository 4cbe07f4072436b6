use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::remote::Session;

use super::{read_json, write_json_atomic};

const SESSION_FILE: &str = "session.json";

/// Persisted auth session for the workspace.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(SESSION_FILE),
        }
    }

    /// The stored session, or `None` if absent or unreadable.
    pub fn load(&self) -> Option<Session> {
        read_json(&self.path).ok()
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        write_json_atomic(&self.path, session)
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
