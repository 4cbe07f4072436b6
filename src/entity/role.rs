// src/entity/role.rs
use serde::{Deserialize, Serialize};

use super::{new_id, now_millis, Collection, Record, Snapshot, Timestamp};

pub const DEFAULT_ROLE_ICON: &str = "🤖";
pub const DEFAULT_ROLE_COLOR: &str = "indigo";

/// A persona under which scenarios are grouped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Short display glyph, usually an emoji
    pub icon: String,
    /// Display accent token
    pub color: String,
    pub created_at: Timestamp,
}

impl Role {
    pub fn new(name: String, description: String) -> Self {
        Self {
            id: new_id(),
            name,
            description,
            icon: DEFAULT_ROLE_ICON.to_string(),
            color: DEFAULT_ROLE_COLOR.to_string(),
            created_at: now_millis(),
        }
    }
}

impl Record for Role {
    const COLLECTION: Collection = Collection::Roles;
    const KIND: &'static str = "Role";

    fn id(&self) -> &str {
        &self.id
    }

    fn items(snapshot: &Snapshot) -> &[Self] {
        &snapshot.roles
    }

    fn items_mut(snapshot: &mut Snapshot) -> &mut Vec<Self> {
        &mut snapshot.roles
    }

    fn cascade(snapshot: &mut Snapshot, removed_id: &str) -> Vec<Collection> {
        let before = snapshot.scenarios.len();
        snapshot.scenarios.retain(|s| s.role_id != removed_id);
        if snapshot.scenarios.len() == before {
            Vec::new()
        } else {
            vec![Collection::Scenarios]
        }
    }
}
