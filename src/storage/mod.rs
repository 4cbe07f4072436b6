mod buffers;
mod entity_store;
mod session;

pub use buffers::BufferStore;
pub use entity_store::{find_workspace_root, EntityStore, WORKSPACE_DIR};
pub use session::SessionStore;

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{PromptloomError, Result};

/// Read and decode a JSON file. A missing or undecodable file is a `Decode`
/// error, which callers loading durable state treat as "no data".
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PromptloomError::Decode(format!(
                "{} (missing)",
                path.display()
            )))
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes)
        .map_err(|e| PromptloomError::Decode(format!("{}: {}", path.display(), e)))
}

/// Serialize `value` and replace `path` atomically (temp file, fsync, rename).
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let bytes = serde_json::to_vec_pretty(value)?;
    let temp_path = path.with_extension("json.tmp");

    let mut file = fs::File::create(&temp_path)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;

    Ok(())
}
