//! Row shapes of the hosted tables and the mapping to local entities.
//!
//! Rows use snake_case columns and carry the owning `user_id`; local
//! entities are camelCase and ownerless. `tags` and `history` travel as
//! JSON arrays.

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};

use crate::entity::{Article, Prompt, PromptHistoryItem, Record, Role, Scenario, Timestamp};

/// A null column reads as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A local entity that mirrors one row of a remote table.
pub trait TableRecord: Record + Send + Sync + 'static {
    type Row: Serialize + DeserializeOwned + Send;

    fn to_row(&self, owner: &str) -> Self::Row;
    fn from_row(row: Self::Row) -> Self;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRow {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub icon: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub color: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRow {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub role_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub goal: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRow {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub scenario_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default)]
    pub optimized_content: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default = "first_version")]
    pub version: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: Timestamp,
    #[serde(default, deserialize_with = "null_as_default")]
    pub updated_at: Timestamp,
    #[serde(default, deserialize_with = "null_as_default")]
    pub history: Vec<PromptHistoryItem>,
}

fn first_version() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRow {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: Timestamp,
    #[serde(default, deserialize_with = "null_as_default")]
    pub updated_at: Timestamp,
}

impl TableRecord for Role {
    type Row = RoleRow;

    fn to_row(&self, owner: &str) -> RoleRow {
        RoleRow {
            id: self.id.clone(),
            user_id: Some(owner.to_string()),
            name: self.name.clone(),
            description: self.description.clone(),
            icon: self.icon.clone(),
            color: self.color.clone(),
            created_at: self.created_at,
        }
    }

    fn from_row(row: RoleRow) -> Self {
        Role {
            id: row.id,
            name: row.name,
            description: row.description,
            icon: row.icon,
            color: row.color,
            created_at: row.created_at,
        }
    }
}

impl TableRecord for Scenario {
    type Row = ScenarioRow;

    fn to_row(&self, owner: &str) -> ScenarioRow {
        ScenarioRow {
            id: self.id.clone(),
            user_id: Some(owner.to_string()),
            role_id: self.role_id.clone(),
            title: self.title.clone(),
            goal: self.goal.clone(),
            created_at: self.created_at,
        }
    }

    fn from_row(row: ScenarioRow) -> Self {
        Scenario {
            id: row.id,
            role_id: row.role_id,
            title: row.title,
            goal: row.goal,
            created_at: row.created_at,
        }
    }
}

impl TableRecord for Prompt {
    type Row = PromptRow;

    fn to_row(&self, owner: &str) -> PromptRow {
        PromptRow {
            id: self.id.clone(),
            user_id: Some(owner.to_string()),
            scenario_id: self.scenario_id.clone(),
            title: self.title.clone(),
            content: self.content.clone(),
            optimized_content: self.optimized_content.clone(),
            tags: self.tags.clone(),
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            history: self.history.clone(),
        }
    }

    fn from_row(row: PromptRow) -> Self {
        Prompt {
            id: row.id,
            scenario_id: row.scenario_id,
            title: row.title,
            content: row.content,
            optimized_content: row.optimized_content,
            tags: row.tags,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
            history: row.history,
        }
    }
}

impl TableRecord for Article {
    type Row = ArticleRow;

    fn to_row(&self, owner: &str) -> ArticleRow {
        ArticleRow {
            id: self.id.clone(),
            user_id: Some(owner.to_string()),
            title: self.title.clone(),
            content: self.content.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn from_row(row: ArticleRow) -> Self {
        Article {
            id: row.id,
            title: row.title,
            content: row.content,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn through_json<T: TableRecord + PartialEq + std::fmt::Debug>(record: &T) -> T {
        let value = serde_json::to_value(record.to_row("user-1")).unwrap();
        assert_eq!(value["user_id"], "user-1");
        T::from_row(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn test_entities_survive_row_mapping() {
        let role = Role::new("Editor".to_string(), "Edits copy".to_string());
        let scenario = Scenario::new(role.id.clone(), "Blog".to_string(), "Posts".to_string());
        let mut prompt = Prompt::new(scenario.id.clone(), "Draft".to_string());
        prompt.content = "v2".to_string();
        prompt.optimized_content = Some("better".to_string());
        prompt.tags = vec!["seo".to_string(), "long-form".to_string()];
        prompt.version = 2;
        prompt.history.push(PromptHistoryItem {
            version: 1,
            content: "v1".to_string(),
            optimized_content: None,
            timestamp: 42,
        });
        let article = Article::new("Notes".to_string(), "Body".to_string());

        assert_eq!(through_json(&role), role);
        assert_eq!(through_json(&scenario), scenario);
        assert_eq!(through_json(&prompt), prompt);
        assert_eq!(through_json(&article), article);
    }

    #[test]
    fn test_prompt_row_uses_snake_case_and_nested_arrays() {
        let mut prompt = Prompt::new("s1".to_string(), "Draft".to_string());
        prompt.tags = vec!["a".to_string()];
        let value = serde_json::to_value(prompt.to_row("u")).unwrap();

        assert_eq!(value["scenario_id"], "s1");
        assert!(value["tags"].is_array());
        assert!(value["history"].is_array());
        assert!(value.get("scenarioId").is_none());
    }

    #[test]
    fn test_null_columns_read_as_empty() {
        let row: PromptRow = serde_json::from_value(json!({
            "id": "p1",
            "user_id": "u",
            "scenario_id": "s1",
            "title": "t",
            "content": null,
            "optimized_content": null,
            "tags": null,
            "version": 3,
            "created_at": 1,
            "updated_at": 2,
            "history": null
        }))
        .unwrap();

        let prompt = Prompt::from_row(row);
        assert!(prompt.tags.is_empty());
        assert!(prompt.history.is_empty());
        assert_eq!(prompt.content, "");
        assert_eq!(prompt.version, 3);
    }
}
