use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::versioning::EditBuffer;

use super::{read_json, write_json_atomic};

const BUFFERS_FILE: &str = "buffers.json";

/// Unsaved edit buffers keyed by prompt id, kept across CLI invocations.
pub struct BufferStore {
    path: PathBuf,
    buffers: BTreeMap<String, EditBuffer>,
}

impl BufferStore {
    pub fn open(dir: &Path) -> Self {
        let path = dir.join(BUFFERS_FILE);
        let buffers = read_json(&path).unwrap_or_else(|e| {
            tracing::debug!("No edit buffers loaded: {}", e);
            BTreeMap::new()
        });
        Self { path, buffers }
    }

    pub fn get(&self, prompt_id: &str) -> Option<&EditBuffer> {
        self.buffers.get(prompt_id)
    }

    pub fn put(&mut self, prompt_id: &str, buffer: EditBuffer) -> Result<()> {
        self.buffers.insert(prompt_id.to_string(), buffer);
        write_json_atomic(&self.path, &self.buffers)
    }

    pub fn remove(&mut self, prompt_id: &str) -> Result<Option<EditBuffer>> {
        let removed = self.buffers.remove(prompt_id);
        if removed.is_some() {
            write_json_atomic(&self.path, &self.buffers)?;
        }
        Ok(removed)
    }

    /// Drop buffers whose prompt no longer exists.
    pub fn retain<F>(&mut self, mut keep: F) -> Result<()>
    where
        F: FnMut(&str) -> bool,
    {
        let before = self.buffers.len();
        self.buffers.retain(|id, _| keep(id));
        if self.buffers.len() != before {
            write_json_atomic(&self.path, &self.buffers)?;
        }
        Ok(())
    }
}
