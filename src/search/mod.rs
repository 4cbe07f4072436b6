//! Search across the workspace: filter parsing plus full-text matching.

mod cache;

pub use cache::{SearchCache, TextMatch};

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::entity::{Collection, Snapshot, Timestamp};
use crate::error::{PromptloomError, Result};

/// Parsed search filter from query string.
///
/// Filters can be specified in the query string using prefixes:
/// - `type:prompt` - Filter by record type
/// - `tag:seo` - Filter by tag (can specify multiple)
/// - `scenario:3f2a` - Prompts under a scenario (id prefix)
/// - `role:9c1e` - Scenarios and prompts under a role (id prefix)
/// - `created:>2025-01-01` - Created after date
/// - `created:<2025-12-31` - Created before date
#[derive(Debug, Default, Clone)]
pub struct SearchFilter {
    pub entity_type: Option<String>,
    /// Record must carry all of these tags
    pub tags: Vec<String>,
    pub scenario: Option<String>,
    pub role: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_type.is_none()
            && self.tags.is_empty()
            && self.scenario.is_none()
            && self.role.is_none()
            && self.created_after.is_none()
            && self.created_before.is_none()
    }

    fn created_in_range(&self, created_at: Timestamp) -> bool {
        self.created_after
            .map_or(true, |after| created_at > after.timestamp_millis())
            && self
                .created_before
                .map_or(true, |before| created_at < before.timestamp_millis())
    }

    fn wants(&self, collection: Collection) -> bool {
        match collection {
            Collection::Roles | Collection::Articles => {
                self.tags.is_empty() && self.scenario.is_none()
            }
            Collection::Scenarios => self.tags.is_empty(),
            Collection::Prompts => true,
        }
    }
}

/// Parse a raw query string into (remaining query text, filters).
///
/// # Examples
///
/// ```ignore
/// let (query, filter) = parse_query("type:prompt tag:seo blog intro");
/// assert_eq!(query, "blog intro");
/// assert_eq!(filter.entity_type, Some("prompt".to_string()));
/// assert_eq!(filter.tags, vec!["seo".to_string()]);
/// ```
pub fn parse_query(raw: &str) -> (String, SearchFilter) {
    let mut filter = SearchFilter::default();
    let mut remaining = Vec::new();

    for token in raw.split_whitespace() {
        if let Some(value) = token.strip_prefix("type:") {
            filter.entity_type = Some(value.to_string());
        } else if let Some(value) = token.strip_prefix("tag:") {
            filter.tags.push(value.to_string());
        } else if let Some(value) = token.strip_prefix("scenario:") {
            filter.scenario = Some(value.to_string());
        } else if let Some(value) = token.strip_prefix("role:") {
            filter.role = Some(value.to_string());
        } else if let Some(value) = token.strip_prefix("created:>") {
            filter.created_after = parse_date(value);
        } else if let Some(value) = token.strip_prefix("created:<") {
            filter.created_before = parse_date(value);
        } else {
            remaining.push(token);
        }
    }

    (remaining.join(" "), filter)
}

/// Parse a date string into DateTime<Utc>.
/// Supports ISO 8601 date format (YYYY-MM-DD) or full datetime.
fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let datetime = date.and_hms_opt(0, 0, 0)?;
        return Some(DateTime::from_naive_utc_and_offset(datetime, Utc));
    }

    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub kind: Collection,
    pub id: String,
    pub title: String,
    pub snippet: Option<String>,
}

/// Run a raw query against the snapshot. Free text over prompts and articles
/// goes through the FTS cache; roles and scenarios match by substring. A
/// filter-only query lists every record passing the filters.
pub fn search(snapshot: &Snapshot, cache: &mut SearchCache, raw: &str) -> Result<Vec<SearchHit>> {
    let (text, filter) = parse_query(raw);
    let only: Option<Collection> = filter
        .entity_type
        .as_deref()
        .map(|t| t.parse().map_err(PromptloomError::InvalidInput))
        .transpose()?;
    let included = |c: Collection| only.map_or(true, |o| o == c) && filter.wants(c);

    let needle = text.to_lowercase();
    let has_prefix = |id: &str, prefix: &Option<String>| {
        prefix.as_deref().map_or(true, |p| id.starts_with(p))
    };
    let role_of_scenario: HashMap<&str, &str> = snapshot
        .scenarios
        .iter()
        .map(|s| (s.id.as_str(), s.role_id.as_str()))
        .collect();

    let mut hits = Vec::new();

    if included(Collection::Roles) {
        for role in &snapshot.roles {
            let text_ok = needle.is_empty()
                || role.name.to_lowercase().contains(&needle)
                || role.description.to_lowercase().contains(&needle);
            if text_ok && has_prefix(&role.id, &filter.role) && filter.created_in_range(role.created_at) {
                hits.push(SearchHit {
                    kind: Collection::Roles,
                    id: role.id.clone(),
                    title: role.name.clone(),
                    snippet: None,
                });
            }
        }
    }

    if included(Collection::Scenarios) {
        for scenario in &snapshot.scenarios {
            let text_ok = needle.is_empty()
                || scenario.title.to_lowercase().contains(&needle)
                || scenario.goal.to_lowercase().contains(&needle);
            if text_ok
                && has_prefix(&scenario.id, &filter.scenario)
                && has_prefix(&scenario.role_id, &filter.role)
                && filter.created_in_range(scenario.created_at)
            {
                hits.push(SearchHit {
                    kind: Collection::Scenarios,
                    id: scenario.id.clone(),
                    title: scenario.title.clone(),
                    snippet: None,
                });
            }
        }
    }

    let needs_index = !text.trim().is_empty()
        && (included(Collection::Prompts) || included(Collection::Articles));
    if needs_index {
        cache.sync(snapshot)?;
    }

    if included(Collection::Prompts) {
        let matches = text_matches(needs_index, || cache.search_prompts(&text))?;
        for prompt in &snapshot.prompts {
            let matched = match &matches {
                Some(found) => match found.get(prompt.id.as_str()) {
                    Some(m) => Some(m.snippet.clone()),
                    None => continue,
                },
                None => None,
            };
            let role_id = role_of_scenario.get(prompt.scenario_id.as_str()).copied().unwrap_or("");
            let passes = filter.tags.iter().all(|t| prompt.tags.contains(t))
                && has_prefix(&prompt.scenario_id, &filter.scenario)
                && (filter.role.is_none() || has_prefix(role_id, &filter.role))
                && filter.created_in_range(prompt.created_at);
            if passes {
                hits.push(SearchHit {
                    kind: Collection::Prompts,
                    id: prompt.id.clone(),
                    title: prompt.title.clone(),
                    snippet: matched.flatten(),
                });
            }
        }
    }

    if included(Collection::Articles) && filter.role.is_none() {
        let matches = text_matches(needs_index, || cache.search_articles(&text))?;
        for article in &snapshot.articles {
            let matched = match &matches {
                Some(found) => match found.get(article.id.as_str()) {
                    Some(m) => Some(m.snippet.clone()),
                    None => continue,
                },
                None => None,
            };
            if filter.created_in_range(article.created_at) {
                hits.push(SearchHit {
                    kind: Collection::Articles,
                    id: article.id.clone(),
                    title: article.title.clone(),
                    snippet: matched.flatten(),
                });
            }
        }
    }

    Ok(hits)
}

/// FTS matches keyed by id, or `None` when there is no free text.
fn text_matches<F>(run: bool, query: F) -> Result<Option<HashMap<String, TextMatch>>>
where
    F: FnOnce() -> Result<Vec<TextMatch>>,
{
    if !run {
        return Ok(None);
    }
    Ok(Some(
        query()?.into_iter().map(|m| (m.id.clone(), m)).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Article, Prompt, Role, Scenario};
    use chrono::Datelike;
    use tempfile::TempDir;

    #[test]
    fn test_parse_query_no_filters() {
        let (query, filter) = parse_query("hello world");
        assert_eq!(query, "hello world");
        assert!(filter.is_empty());
    }

    #[test]
    fn test_parse_query_combined() {
        let (query, filter) = parse_query("type:prompt tag:seo tag:tone scenario:ab role:cd blog intro");
        assert_eq!(query, "blog intro");
        assert_eq!(filter.entity_type, Some("prompt".to_string()));
        assert_eq!(filter.tags, vec!["seo".to_string(), "tone".to_string()]);
        assert_eq!(filter.scenario, Some("ab".to_string()));
        assert_eq!(filter.role, Some("cd".to_string()));
    }

    #[test]
    fn test_parse_query_date_filters() {
        let (query, filter) = parse_query("created:>2025-01-01 created:<2025-12-31 test");
        assert_eq!(query, "test");
        assert!(filter.created_after.is_some());
        assert!(filter.created_before.is_some());
    }

    #[test]
    fn test_parse_date() {
        let dt = parse_date("2025-06-15").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2025, 6, 15));
        assert!(parse_date("not-a-date").is_none());
    }

    fn sample() -> Snapshot {
        let editor = Role::new("Editor".to_string(), "Edits blog copy".to_string());
        let chef = Role::new("Chef".to_string(), "Plans menus".to_string());
        let blog = Scenario::new(editor.id.clone(), "Blog".to_string(), "Weekly posts".to_string());
        let menu = Scenario::new(chef.id.clone(), "Menu".to_string(), "Seasonal dishes".to_string());

        let mut intro = Prompt::new(blog.id.clone(), "Intro".to_string());
        intro.content = "Write a blog introduction".to_string();
        intro.tags = vec!["seo".to_string()];
        let mut dishes = Prompt::new(menu.id.clone(), "Dishes".to_string());
        dishes.content = "List winter dishes".to_string();

        Snapshot {
            roles: vec![editor, chef],
            scenarios: vec![blog, menu],
            prompts: vec![intro, dishes],
            articles: vec![Article::new("Blog style guide".to_string(), "Short sentences".to_string())],
        }
    }

    fn run(snapshot: &Snapshot, raw: &str) -> Vec<(Collection, String)> {
        let tmp = TempDir::new().unwrap();
        let mut cache = SearchCache::open(tmp.path()).unwrap();
        search(snapshot, &mut cache, raw)
            .unwrap()
            .into_iter()
            .map(|h| (h.kind, h.title))
            .collect()
    }

    #[test]
    fn test_free_text_spans_all_kinds() {
        let hits = run(&sample(), "blog");
        assert!(hits.contains(&(Collection::Roles, "Editor".to_string())));
        assert!(hits.contains(&(Collection::Scenarios, "Blog".to_string())));
        assert!(hits.contains(&(Collection::Prompts, "Intro".to_string())));
        assert!(hits.contains(&(Collection::Articles, "Blog style guide".to_string())));
        assert!(!hits.iter().any(|(_, t)| t == "Dishes"));
    }

    #[test]
    fn test_type_and_tag_filters() {
        let data = sample();
        assert_eq!(
            run(&data, "type:prompt"),
            vec![
                (Collection::Prompts, "Intro".to_string()),
                (Collection::Prompts, "Dishes".to_string())
            ]
        );
        assert_eq!(run(&data, "tag:seo"), vec![(Collection::Prompts, "Intro".to_string())]);
    }

    #[test]
    fn test_role_filter_reaches_prompts() {
        let data = sample();
        let chef_prefix = &data.roles[1].id[..8];
        let hits = run(&data, &format!("role:{} type:prompt", chef_prefix));
        assert_eq!(hits, vec![(Collection::Prompts, "Dishes".to_string())]);
    }

    #[test]
    fn test_invalid_type_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut cache = SearchCache::open(tmp.path()).unwrap();
        assert!(matches!(
            search(&sample(), &mut cache, "type:decision"),
            Err(PromptloomError::InvalidInput(_))
        ));
    }
}
