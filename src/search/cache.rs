use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::entity::{Article, Prompt, Snapshot};
use crate::error::Result;

const SEARCH_DB: &str = "search.db";
const FINGERPRINT_KEY: &str = "snapshot_fingerprint";
const MAX_RESULTS: usize = 50;

/// A full-text match with highlighted title and a content snippet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMatch {
    pub id: String,
    pub title: String,
    pub title_highlight: Option<String>,
    pub snippet: Option<String>,
}

/// Disposable SQLite FTS5 index over prompt and article text.
pub struct SearchCache {
    conn: Connection,
}

impl SearchCache {
    /// Open or create `search.db` in the workspace directory.
    pub fn open(dir: &Path) -> Result<Self> {
        let conn = Connection::open(dir.join(SEARCH_DB))?;
        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS prompts (
                id TEXT PRIMARY KEY,
                scenario_id TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT,
                optimized_content TEXT,
                tags TEXT
            );

            CREATE VIRTUAL TABLE IF NOT EXISTS prompts_fts USING fts5(
                id UNINDEXED,
                title,
                content,
                optimized_content,
                tags,
                content='prompts',
                content_rowid='rowid'
            );

            CREATE TRIGGER IF NOT EXISTS prompts_ai AFTER INSERT ON prompts BEGIN
                INSERT INTO prompts_fts(rowid, id, title, content, optimized_content, tags)
                VALUES (new.rowid, new.id, new.title, new.content, new.optimized_content, new.tags);
            END;

            CREATE TRIGGER IF NOT EXISTS prompts_ad AFTER DELETE ON prompts BEGIN
                INSERT INTO prompts_fts(prompts_fts, rowid, id, title, content, optimized_content, tags)
                VALUES ('delete', old.rowid, old.id, old.title, old.content, old.optimized_content, old.tags);
            END;

            CREATE TABLE IF NOT EXISTS articles (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT
            );

            CREATE VIRTUAL TABLE IF NOT EXISTS articles_fts USING fts5(
                id UNINDEXED,
                title,
                content,
                content='articles',
                content_rowid='rowid'
            );

            CREATE TRIGGER IF NOT EXISTS articles_ai AFTER INSERT ON articles BEGIN
                INSERT INTO articles_fts(rowid, id, title, content)
                VALUES (new.rowid, new.id, new.title, new.content);
            END;

            CREATE TRIGGER IF NOT EXISTS articles_ad AFTER DELETE ON articles BEGIN
                INSERT INTO articles_fts(articles_fts, rowid, id, title, content)
                VALUES ('delete', old.rowid, old.id, old.title, old.content);
            END;
            ",
        )?;
        Ok(())
    }

    fn fingerprint(&self) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![FINGERPRINT_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_fingerprint(&self, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![FINGERPRINT_KEY, value],
        )?;
        Ok(())
    }

    /// Rebuild the index if the snapshot's text changed since the last
    /// rebuild. Returns true if it reindexed.
    pub fn sync(&mut self, snapshot: &Snapshot) -> Result<bool> {
        let fingerprint = snapshot_fingerprint(snapshot)?;
        if self.fingerprint()?.as_deref() == Some(fingerprint.as_str()) {
            return Ok(false);
        }

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM prompts", [])?;
        tx.execute("DELETE FROM articles", [])?;
        for prompt in &snapshot.prompts {
            index_prompt(&tx, prompt)?;
        }
        for article in &snapshot.articles {
            index_article(&tx, article)?;
        }
        tx.commit()?;

        self.set_fingerprint(&fingerprint)?;
        tracing::debug!(
            prompts = snapshot.prompts.len(),
            articles = snapshot.articles.len(),
            "Rebuilt search index"
        );
        Ok(true)
    }

    pub fn search_prompts(&self, query: &str) -> Result<Vec<TextMatch>> {
        self.search(
            "SELECT p.id, p.title,
                    highlight(prompts_fts, 1, '**', '**'),
                    snippet(prompts_fts, -1, '**', '**', '...', 12)
             FROM prompts_fts
             JOIN prompts p ON p.rowid = prompts_fts.rowid
             WHERE prompts_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
            query,
        )
    }

    pub fn search_articles(&self, query: &str) -> Result<Vec<TextMatch>> {
        self.search(
            "SELECT a.id, a.title,
                    highlight(articles_fts, 1, '**', '**'),
                    snippet(articles_fts, 2, '**', '**', '...', 12)
             FROM articles_fts
             JOIN articles a ON a.rowid = articles_fts.rowid
             WHERE articles_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
            query,
        )
    }

    fn search(&self, sql: &str, query: &str) -> Result<Vec<TextMatch>> {
        let Some(expr) = match_expression(query) else {
            return Ok(Vec::new());
        };

        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![expr, MAX_RESULTS as i64], |row| {
            Ok(TextMatch {
                id: row.get(0)?,
                title: row.get(1)?,
                title_highlight: row.get(2)?,
                snippet: row.get(3)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

fn index_prompt(conn: &Connection, prompt: &Prompt) -> Result<()> {
    conn.execute(
        "INSERT INTO prompts (id, scenario_id, title, content, optimized_content, tags)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            prompt.id,
            prompt.scenario_id,
            prompt.title,
            prompt.content,
            prompt.optimized_content,
            prompt.tags.join(" "),
        ],
    )?;
    Ok(())
}

fn index_article(conn: &Connection, article: &Article) -> Result<()> {
    conn.execute(
        "INSERT INTO articles (id, title, content) VALUES (?1, ?2, ?3)",
        params![article.id, article.title, article.content],
    )?;
    Ok(())
}

/// Hash of everything the index holds, used to skip redundant rebuilds.
fn snapshot_fingerprint(snapshot: &Snapshot) -> Result<String> {
    let mut hasher = DefaultHasher::new();
    serde_json::to_string(&snapshot.prompts)?.hash(&mut hasher);
    serde_json::to_string(&snapshot.articles)?.hash(&mut hasher);
    Ok(format!("{:016x}", hasher.finish()))
}

/// Quote each term so user input is never parsed as FTS5 syntax. Terms are
/// ANDed; the last one also matches as a prefix.
fn match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .filter(|t| t.chars().any(char::is_alphanumeric))
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        return None;
    }
    Some(format!("{}*", terms.join(" ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn prompt(title: &str, content: &str, tags: &[&str]) -> Prompt {
        let mut p = Prompt::new("s1".to_string(), title.to_string());
        p.content = content.to_string();
        p.tags = tags.iter().map(|t| t.to_string()).collect();
        p
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            prompts: vec![
                prompt("Blog intro", "Write an engaging introduction", &["seo"]),
                prompt("Tweet", "Summarize in 280 characters", &["social"]),
            ],
            articles: vec![Article::new(
                "Prompt patterns".to_string(),
                "Chain of thought works well".to_string(),
            )],
            ..Snapshot::default()
        }
    }

    #[test]
    fn test_open_creates_db() {
        let tmp = TempDir::new().unwrap();
        SearchCache::open(tmp.path()).unwrap();
        assert!(tmp.path().join("search.db").exists());
    }

    #[test]
    fn test_sync_is_fingerprint_gated() {
        let tmp = TempDir::new().unwrap();
        let mut cache = SearchCache::open(tmp.path()).unwrap();
        let mut data = snapshot();

        assert!(cache.sync(&data).unwrap());
        assert!(!cache.sync(&data).unwrap());

        data.prompts[0].content = "changed".to_string();
        assert!(cache.sync(&data).unwrap());
    }

    #[test]
    fn test_search_prompts_and_articles() {
        let tmp = TempDir::new().unwrap();
        let mut cache = SearchCache::open(tmp.path()).unwrap();
        cache.sync(&snapshot()).unwrap();

        let hits = cache.search_prompts("introduction").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Blog intro");
        assert!(hits[0].snippet.as_deref().unwrap_or("").contains("**introduction**"));

        let hits = cache.search_prompts("social").unwrap();
        assert_eq!(hits[0].title, "Tweet");

        let hits = cache.search_articles("chain").unwrap();
        assert_eq!(hits.len(), 1);

        assert!(cache.search_prompts("postgres").unwrap().is_empty());
    }

    #[test]
    fn test_rebuild_drops_removed_records() {
        let tmp = TempDir::new().unwrap();
        let mut cache = SearchCache::open(tmp.path()).unwrap();
        let mut data = snapshot();
        cache.sync(&data).unwrap();

        data.prompts.remove(1);
        cache.sync(&data).unwrap();
        assert!(cache.search_prompts("Summarize").unwrap().is_empty());
    }

    #[test]
    fn test_fts_syntax_in_query_is_literal() {
        let tmp = TempDir::new().unwrap();
        let mut cache = SearchCache::open(tmp.path()).unwrap();
        cache.sync(&snapshot()).unwrap();

        assert!(cache.search_prompts("intro AND \"OR (").is_ok());
        assert!(cache.search_prompts("   ").unwrap().is_empty());
    }

    #[test]
    fn test_match_expression() {
        assert_eq!(match_expression("blog post").as_deref(), Some("\"blog\" \"post\"*"));
        assert_eq!(match_expression(""), None);
        assert_eq!(match_expression("( -"), None);
    }
}
