mod article;
mod prompt;
mod role;
mod scenario;

pub use article::Article;
pub use prompt::{Prompt, PromptHistoryItem, DEFAULT_PROMPT_TITLE};
pub use role::{Role, DEFAULT_ROLE_COLOR, DEFAULT_ROLE_ICON};
pub use scenario::Scenario;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Milliseconds since the Unix epoch. Stored in this form both locally and remotely.
pub type Timestamp = i64;

pub fn now_millis() -> Timestamp {
    Utc::now().timestamp_millis()
}

/// Generate a fresh opaque record id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// The four persisted collections. The key doubles as the local file stem
/// and the remote table name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Roles,
    Scenarios,
    Prompts,
    Articles,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Roles,
        Collection::Scenarios,
        Collection::Prompts,
        Collection::Articles,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Collection::Roles => "roles",
            Collection::Scenarios => "scenarios",
            Collection::Prompts => "prompts",
            Collection::Articles => "articles",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl std::str::FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "role" | "roles" => Ok(Collection::Roles),
            "scenario" | "scenarios" => Ok(Collection::Scenarios),
            "prompt" | "prompts" => Ok(Collection::Prompts),
            "article" | "articles" => Ok(Collection::Articles),
            _ => Err(format!("Invalid entity type: {}", s)),
        }
    }
}

/// A record kept in one of the snapshot collections, addressable by id.
pub trait Record: Clone + Serialize + DeserializeOwned {
    const COLLECTION: Collection;
    /// Human-readable kind used in error messages.
    const KIND: &'static str;

    fn id(&self) -> &str;
    fn items(snapshot: &Snapshot) -> &[Self];
    fn items_mut(snapshot: &mut Snapshot) -> &mut Vec<Self>;

    /// Drop dependents of a removed record. Returns the collections it touched.
    fn cascade(_snapshot: &mut Snapshot, _removed_id: &str) -> Vec<Collection> {
        Vec::new()
    }
}

/// The full set of a user's records at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub roles: Vec<Role>,
    pub scenarios: Vec<Scenario>,
    pub prompts: Vec<Prompt>,
    pub articles: Vec<Article>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
            && self.scenarios.is_empty()
            && self.prompts.is_empty()
            && self.articles.is_empty()
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            roles: self.roles.len(),
            scenarios: self.scenarios.len(),
            prompts: self.prompts.len(),
            articles: self.articles.len(),
        }
    }
}

/// Record counts per collection, shown when asking the user to pick a side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SnapshotSummary {
    pub roles: usize,
    pub scenarios: usize,
    pub prompts: usize,
    pub articles: usize,
}

impl std::fmt::Display for SnapshotSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} roles, {} scenarios, {} prompts, {} articles",
            self.roles, self.scenarios, self.prompts, self.articles
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_from_str() {
        assert_eq!("prompt".parse::<Collection>().unwrap(), Collection::Prompts);
        assert_eq!("Roles".parse::<Collection>().unwrap(), Collection::Roles);
        assert!("decision".parse::<Collection>().is_err());
    }

    #[test]
    fn test_snapshot_summary() {
        let mut snapshot = Snapshot::default();
        assert!(snapshot.is_empty());

        let role = Role::new("Editor".to_string(), String::new());
        snapshot.scenarios.push(Scenario::new(
            role.id.clone(),
            "Blog".to_string(),
            String::new(),
        ));
        snapshot.roles.push(role);

        assert!(!snapshot.is_empty());
        let summary = snapshot.summary();
        assert_eq!(summary.roles, 1);
        assert_eq!(summary.scenarios, 1);
        assert_eq!(
            summary.to_string(),
            "1 roles, 1 scenarios, 0 prompts, 0 articles"
        );
    }

    #[test]
    fn test_missing_collections_decode_as_empty() {
        let snapshot: Snapshot = serde_json::from_str(r#"{"roles": []}"#).unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_new_ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }
}
