use std::sync::{Arc, RwLock};

use crate::entity::{Article, Prompt, Record, Role, Scenario, Snapshot};
use crate::error::{PromptloomError, Result};

use super::auth::Session;
use super::rows::TableRecord;
use super::RemoteBackend;

/// Maps entities to rows and issues table operations on behalf of the
/// signed-in user.
pub struct RemoteMirror {
    backend: Option<Arc<dyn RemoteBackend>>,
    session: RwLock<Option<Session>>,
}

impl RemoteMirror {
    pub fn new(backend: Arc<dyn RemoteBackend>, session: Option<Session>) -> Self {
        Self {
            backend: Some(backend),
            session: RwLock::new(session),
        }
    }

    /// A mirror with no backend. Every call fails with `NotConfigured`
    /// once a session check has passed.
    pub fn unconfigured(session: Option<Session>) -> Self {
        Self {
            backend: None,
            session: RwLock::new(session),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    pub fn session(&self) -> Option<Session> {
        match self.session.read() {
            Ok(slot) => slot.clone(),
            Err(e) => e.into_inner().clone(),
        }
    }

    pub fn set_session(&self, session: Option<Session>) {
        match self.session.write() {
            Ok(mut slot) => *slot = session,
            Err(e) => *e.into_inner() = session,
        }
    }

    /// True when pushes would actually reach a backend.
    pub fn can_push(&self) -> bool {
        self.is_configured() && self.session().is_some()
    }

    fn ready(&self) -> Result<(&dyn RemoteBackend, Session)> {
        let session = self
            .session()
            .ok_or_else(|| PromptloomError::Auth("sign in to sync with the cloud".to_string()))?;
        let backend = self.backend.as_deref().ok_or(PromptloomError::NotConfigured)?;
        Ok((backend, session))
    }

    pub async fn upsert<T: TableRecord>(&self, record: &T) -> Result<()> {
        self.upsert_many(std::slice::from_ref(record)).await
    }

    async fn upsert_many<T: TableRecord>(&self, records: &[T]) -> Result<()> {
        let (backend, session) = self.ready()?;
        let rows = records
            .iter()
            .map(|record| serde_json::to_value(record.to_row(&session.user.id)))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        backend
            .upsert_rows(&session, T::COLLECTION.key(), rows)
            .await
    }

    pub async fn delete<T: TableRecord>(&self, id: &str) -> Result<()> {
        let (backend, session) = self.ready()?;
        backend.delete_row(&session, T::COLLECTION.key(), id).await
    }

    /// Every row of `T`'s table. A table that is not provisioned reads as
    /// empty.
    pub async fn fetch<T: TableRecord>(&self) -> Result<Vec<T>> {
        let (backend, session) = self.ready()?;
        let table = T::COLLECTION.key();

        let Some(rows) = backend.fetch_all(&session, table).await? else {
            tracing::warn!("Remote table {} missing; treating as empty", table);
            return Ok(Vec::new());
        };

        rows.into_iter()
            .map(|row| {
                serde_json::from_value::<T::Row>(row)
                    .map(T::from_row)
                    .map_err(|e| PromptloomError::Remote(format!("Malformed {} row: {}", table, e)))
            })
            .collect()
    }

    pub async fn upsert_role(&self, role: &Role) -> Result<()> {
        self.upsert(role).await
    }

    pub async fn delete_role(&self, id: &str) -> Result<()> {
        self.delete::<Role>(id).await
    }

    pub async fn upsert_scenario(&self, scenario: &Scenario) -> Result<()> {
        self.upsert(scenario).await
    }

    pub async fn delete_scenario(&self, id: &str) -> Result<()> {
        self.delete::<Scenario>(id).await
    }

    pub async fn upsert_prompt(&self, prompt: &Prompt) -> Result<()> {
        self.upsert(prompt).await
    }

    pub async fn delete_prompt(&self, id: &str) -> Result<()> {
        self.delete::<Prompt>(id).await
    }

    pub async fn upsert_article(&self, article: &Article) -> Result<()> {
        self.upsert(article).await
    }

    pub async fn delete_article(&self, id: &str) -> Result<()> {
        self.delete::<Article>(id).await
    }

    /// Fetch all four tables concurrently.
    pub async fn download_snapshot(&self) -> Result<Snapshot> {
        self.ready()?;
        let (roles, scenarios, prompts, articles) = tokio::try_join!(
            self.fetch::<Role>(),
            self.fetch::<Scenario>(),
            self.fetch::<Prompt>(),
            self.fetch::<Article>(),
        )?;

        tracing::info!(
            roles = roles.len(),
            scenarios = scenarios.len(),
            prompts = prompts.len(),
            articles = articles.len(),
            "Downloaded cloud snapshot"
        );

        Ok(Snapshot {
            roles,
            scenarios,
            prompts,
            articles,
        })
    }

    /// Upsert every non-empty collection, parents first.
    pub async fn upload_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.ready()?;
        self.upload_collection(&snapshot.roles).await?;
        self.upload_collection(&snapshot.scenarios).await?;
        self.upload_collection(&snapshot.prompts).await?;
        self.upload_collection(&snapshot.articles).await?;

        tracing::info!(summary = %snapshot.summary(), "Uploaded local snapshot");
        Ok(())
    }

    async fn upload_collection<T: TableRecord>(&self, records: &[T]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.upsert_many(records).await.map_err(|e| match e {
            PromptloomError::Remote(message) => PromptloomError::Remote(format!(
                "{} sync error: {}",
                <T as Record>::COLLECTION.key(),
                message
            )),
            other => other,
        })
    }
}
