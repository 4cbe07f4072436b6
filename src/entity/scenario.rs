// src/entity/scenario.rs
use serde::{Deserialize, Serialize};

use super::{new_id, now_millis, Collection, Record, Snapshot, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: String,
    /// Owning role; fixed at creation
    pub role_id: String,
    pub title: String,
    pub goal: String,
    pub created_at: Timestamp,
}

impl Scenario {
    pub fn new(role_id: String, title: String, goal: String) -> Self {
        Self {
            id: new_id(),
            role_id,
            title,
            goal,
            created_at: now_millis(),
        }
    }
}

impl Record for Scenario {
    const COLLECTION: Collection = Collection::Scenarios;
    const KIND: &'static str = "Scenario";

    fn id(&self) -> &str {
        &self.id
    }

    fn items(snapshot: &Snapshot) -> &[Self] {
        &snapshot.scenarios
    }

    fn items_mut(snapshot: &mut Snapshot) -> &mut Vec<Self> {
        &mut snapshot.scenarios
    }

    fn cascade(snapshot: &mut Snapshot, removed_id: &str) -> Vec<Collection> {
        let before = snapshot.prompts.len();
        snapshot.prompts.retain(|p| p.scenario_id != removed_id);
        if snapshot.prompts.len() == before {
            Vec::new()
        } else {
            vec![Collection::Prompts]
        }
    }
}
