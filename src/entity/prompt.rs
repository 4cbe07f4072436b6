// src/entity/prompt.rs
use serde::{Deserialize, Serialize};

use super::{new_id, now_millis, Collection, Record, Snapshot, Timestamp};

pub const DEFAULT_PROMPT_TITLE: &str = "Original Draft";

/// Immutable snapshot of a superseded prompt version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptHistoryItem {
    /// The version number that was superseded
    pub version: u32,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimized_content: Option<String>,
    /// `updated_at` of the superseded version
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub id: String,
    /// Owning scenario; fixed at creation
    pub scenario_id: String,
    pub title: String,
    /// Current draft text
    pub content: String,
    /// Last AI-produced rewrite
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimized_content: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub version: u32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Oldest first, append-only
    #[serde(default)]
    pub history: Vec<PromptHistoryItem>,
}

impl Prompt {
    pub fn new(scenario_id: String, title: String) -> Self {
        let now = now_millis();
        Self {
            id: new_id(),
            scenario_id,
            title,
            content: String::new(),
            optimized_content: None,
            tags: Vec::new(),
            version: 1,
            created_at: now,
            updated_at: now,
            history: Vec::new(),
        }
    }

    /// True when either the draft or the optimized text is non-empty.
    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
            || self
                .optimized_content
                .as_deref()
                .is_some_and(|s| !s.is_empty())
    }

    pub fn history_entry(&self, version: u32) -> Option<&PromptHistoryItem> {
        self.history.iter().find(|h| h.version == version)
    }
}

impl Record for Prompt {
    const COLLECTION: Collection = Collection::Prompts;
    const KIND: &'static str = "Prompt";

    fn id(&self) -> &str {
        &self.id
    }

    fn items(snapshot: &Snapshot) -> &[Self] {
        &snapshot.prompts
    }

    fn items_mut(snapshot: &mut Snapshot) -> &mut Vec<Self> {
        &mut snapshot.prompts
    }
}
