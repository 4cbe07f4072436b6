//! Prompt versioning.
//!
//! Saving a prompt never edits it in place: the pre-save draft is appended to
//! the prompt's history (unless it was still blank) and a new record with
//! `version + 1` replaces the old one in the store. Restoring an old version
//! only copies it into the edit buffer; it becomes current on the next save.

use serde::{Deserialize, Serialize};

use crate::entity::{now_millis, Prompt, PromptHistoryItem, Timestamp};
use crate::error::Result;
use crate::storage::EntityStore;

/// In-progress edits to a prompt that have not been saved yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditBuffer {
    pub title: String,
    pub content: String,
    pub optimized_content: String,
}

impl EditBuffer {
    /// Seed a buffer with the prompt's current state.
    pub fn from_prompt(prompt: &Prompt) -> Self {
        Self {
            title: prompt.title.clone(),
            content: prompt.content.clone(),
            optimized_content: prompt.optimized_content.clone().unwrap_or_default(),
        }
    }

    /// Copy a history entry's texts into the buffer. The title is kept.
    pub fn restore(&mut self, entry: &PromptHistoryItem) {
        self.content = entry.content.clone();
        self.optimized_content = entry.optimized_content.clone().unwrap_or_default();
    }
}

/// The record that replaces `existing` when `edit` is saved at `now`.
pub fn next_version(existing: &Prompt, edit: &EditBuffer, now: Timestamp) -> Prompt {
    let mut history = existing.history.clone();
    if existing.has_content() {
        history.push(PromptHistoryItem {
            version: existing.version,
            content: existing.content.clone(),
            optimized_content: existing.optimized_content.clone(),
            timestamp: existing.updated_at,
        });
    }

    let optimized_content = if edit.optimized_content.is_empty() {
        None
    } else {
        Some(edit.optimized_content.clone())
    };

    Prompt {
        title: edit.title.clone(),
        content: edit.content.clone(),
        optimized_content,
        updated_at: now,
        version: existing.version + 1,
        history,
        ..existing.clone()
    }
}

/// Commit `edit` as the next version of prompt `prompt_id` in the local store.
///
/// Fails with `NotFound` when the prompt does not exist. Pushing the result
/// to the remote mirror is the caller's job.
pub fn save(store: &mut EntityStore, prompt_id: &str, edit: &EditBuffer) -> Result<Prompt> {
    let existing = store.require::<Prompt>(prompt_id)?;
    let updated = next_version(existing, edit, now_millis());

    tracing::debug!(
        prompt = %updated.id,
        version = updated.version,
        history = updated.history.len(),
        "Saving prompt version"
    );

    store.upsert_local(updated.clone())?;
    Ok(updated)
}
