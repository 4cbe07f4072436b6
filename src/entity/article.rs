// src/entity/article.rs
use serde::{Deserialize, Serialize};

use super::{new_id, now_millis, Collection, Record, Snapshot, Timestamp};

/// A free-standing markdown note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub title: String,
    pub content: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Article {
    pub fn new(title: String, content: String) -> Self {
        let now = now_millis();
        Self {
            id: new_id(),
            title,
            content,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for Article {
    const COLLECTION: Collection = Collection::Articles;
    const KIND: &'static str = "Article";

    fn id(&self) -> &str {
        &self.id
    }

    fn items(snapshot: &Snapshot) -> &[Self] {
        &snapshot.articles
    }

    fn items_mut(snapshot: &mut Snapshot) -> &mut Vec<Self> {
        &mut snapshot.articles
    }
}
