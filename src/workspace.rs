//! The workspace session: local store, settings, edit buffers and sync wired
//! together. Every mutation lands in the local store first and is then
//! pushed to the cloud in the background.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::config::Settings;
use crate::entity::{
    now_millis, Article, Prompt, Role, Scenario, SnapshotSummary, DEFAULT_PROMPT_TITLE,
};
use crate::error::{PromptloomError, Result};
use crate::gateway::{Optimizer, PromptContext, ScenarioIdea};
use crate::remote::{get_session, AuthBackend, Backends, RemoteMirror, Session, SignUpOutcome};
use crate::storage::{BufferStore, EntityStore, SessionStore};
use crate::sync::{Choice, PushOp, SyncOrchestrator, SyncOutcome};
use crate::versioning::{self, EditBuffer};

/// Field overrides applied to a prompt's edit buffer. `None` leaves the
/// field as it is.
#[derive(Debug, Clone, Default)]
pub struct BufferEdit {
    pub title: Option<String>,
    pub content: Option<String>,
    pub optimized_content: Option<String>,
}

impl BufferEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.optimized_content.is_none()
    }

    fn apply(self, buffer: &mut EditBuffer) {
        if let Some(title) = self.title {
            buffer.title = title;
        }
        if let Some(content) = self.content {
            buffer.content = content;
        }
        if let Some(optimized) = self.optimized_content {
            buffer.optimized_content = optimized;
        }
    }
}

pub struct Workspace {
    store: EntityStore,
    buffers: BufferStore,
    settings: Settings,
    sessions: SessionStore,
    auth: Option<Arc<dyn AuthBackend>>,
    sync: SyncOrchestrator,
}

impl Workspace {
    /// Create `.promptloom/` under `root` with empty collections and default
    /// settings.
    pub fn init(root: &Path) -> Result<EntityStore> {
        let store = EntityStore::init(root)?;
        Settings::load_stored(store.dir()).save(store.dir())?;
        tracing::info!("Initialized workspace at {}", store.dir().display());
        Ok(store)
    }

    /// Open the workspace under `root` and connect it to the configured
    /// backend, if any.
    pub async fn open(root: &Path) -> Result<Self> {
        let store = EntityStore::open(root)?;
        let settings = Settings::load(store.dir());
        let backends = Backends::http(&settings.backend);
        Ok(Self::connect(store, settings, backends).await)
    }

    /// Assemble a workspace over explicit backends. A persisted session is
    /// restored (and refreshed if it expired).
    pub async fn connect(store: EntityStore, settings: Settings, backends: Option<Backends>) -> Self {
        let sessions = SessionStore::new(store.dir());
        let buffers = BufferStore::open(store.dir());
        let auth = backends.as_ref().map(|b| b.auth.clone());
        let session = get_session(&sessions, auth.as_deref()).await;

        let mirror = match backends {
            Some(backends) => RemoteMirror::new(backends.data, session),
            None => RemoteMirror::unconfigured(session),
        };

        Self {
            store,
            buffers,
            settings,
            sessions,
            auth,
            sync: SyncOrchestrator::new(Arc::new(mirror)),
        }
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn sync(&self) -> &SyncOrchestrator {
        &self.sync
    }

    pub fn session(&self) -> Option<Session> {
        self.sync.mirror().session()
    }

    /// Update one stored setting. Environment-provided values are never
    /// written to disk.
    pub fn set_setting(&mut self, key: &str, value: &str) -> Result<()> {
        let mut stored = Settings::load_stored(self.store.dir());
        stored.set(key, value)?;
        stored.save(self.store.dir())?;
        self.settings = stored.with_env(|k| std::env::var(k).ok());
        Ok(())
    }

    fn push(&self, ops: Vec<PushOp>) {
        let _ = self.sync.push(ops);
    }

    // Roles

    pub fn create_role(
        &mut self,
        name: &str,
        description: &str,
        icon: Option<String>,
        color: Option<String>,
    ) -> Result<Role> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PromptloomError::InvalidInput("role name is empty".to_string()));
        }

        let mut role = Role::new(name.to_string(), description.to_string());
        if let Some(icon) = icon.filter(|i| !i.is_empty()) {
            role.icon = icon;
        }
        if let Some(color) = color.filter(|c| !c.is_empty()) {
            role.color = color;
        }

        self.store.upsert_local(role.clone())?;
        self.push(vec![PushOp::UpsertRole(role.clone())]);
        Ok(role)
    }

    /// Delete a role with its scenarios and their prompts. The cloud removes
    /// dependents through its own referential rules.
    pub fn delete_role(&mut self, id: &str) -> Result<Role> {
        let id = self.store.resolve::<Role>(id)?.id.clone();
        let scenario_ids: HashSet<String> = self
            .store
            .scenarios_for_role(&id)
            .into_iter()
            .map(|s| s.id.clone())
            .collect();

        let role = self.store.remove_local::<Role>(&id)?;
        let swept = self
            .store
            .retain_prompts(|p| !scenario_ids.contains(&p.scenario_id))?;
        self.sweep_buffers()?;

        tracing::debug!(
            role = %id,
            scenarios = scenario_ids.len(),
            prompts = swept,
            "Deleted role"
        );
        self.push(vec![PushOp::DeleteRole(id)]);
        Ok(role)
    }

    // Scenarios

    pub fn create_scenario(&mut self, role_id: &str, title: &str, goal: &str) -> Result<Scenario> {
        let title = title.trim();
        if title.is_empty() {
            return Err(PromptloomError::InvalidInput("scenario title is empty".to_string()));
        }
        let role_id = self.store.resolve::<Role>(role_id)?.id.clone();

        let scenario = Scenario::new(role_id, title.to_string(), goal.to_string());
        self.store.upsert_local(scenario.clone())?;
        self.push(vec![PushOp::UpsertScenario(scenario.clone())]);
        Ok(scenario)
    }

    pub fn delete_scenario(&mut self, id: &str) -> Result<Scenario> {
        let id = self.store.resolve::<Scenario>(id)?.id.clone();
        let scenario = self.store.remove_local::<Scenario>(&id)?;
        self.sweep_buffers()?;
        self.push(vec![PushOp::DeleteScenario(id)]);
        Ok(scenario)
    }

    /// Ask the configured provider for scenario ideas for a role.
    pub async fn suggest_scenarios(&self, role_id: &str, optimizer: &dyn Optimizer) -> Result<Vec<ScenarioIdea>> {
        let role = self.store.resolve::<Role>(role_id)?;
        Ok(optimizer.suggest_scenarios(role).await)
    }

    // Prompts

    pub fn create_prompt(&mut self, scenario_id: &str, title: Option<String>, tags: Vec<String>) -> Result<Prompt> {
        let scenario_id = self.store.resolve::<Scenario>(scenario_id)?.id.clone();
        let title = title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROMPT_TITLE.to_string());

        let mut prompt = Prompt::new(scenario_id, title);
        let mut seen = HashSet::new();
        prompt.tags = tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty() && seen.insert(t.clone()))
            .collect();

        self.store.upsert_local(prompt.clone())?;
        self.push(vec![PushOp::UpsertPrompt(prompt.clone())]);
        Ok(prompt)
    }

    /// The prompt's pending edits, or its current state if it has none.
    pub fn buffer(&self, prompt_id: &str) -> Result<EditBuffer> {
        let prompt = self.store.resolve::<Prompt>(prompt_id)?;
        Ok(self
            .buffers
            .get(&prompt.id)
            .cloned()
            .unwrap_or_else(|| EditBuffer::from_prompt(prompt)))
    }

    pub fn has_pending_edits(&self, prompt_id: &str) -> bool {
        self.store
            .resolve::<Prompt>(prompt_id)
            .is_ok_and(|p| self.buffers.get(&p.id).is_some())
    }

    /// Write edits into the prompt's buffer without saving a version.
    pub fn edit_prompt(&mut self, prompt_id: &str, edit: BufferEdit) -> Result<EditBuffer> {
        let id = self.store.resolve::<Prompt>(prompt_id)?.id.clone();
        let mut buffer = self.buffer(&id)?;
        edit.apply(&mut buffer);
        self.buffers.put(&id, buffer.clone())?;
        Ok(buffer)
    }

    /// Copy history entry `version` into the prompt's buffer. The stored
    /// prompt is untouched until the next save.
    pub fn restore_version(&mut self, prompt_id: &str, version: u32) -> Result<EditBuffer> {
        let prompt = self.store.resolve::<Prompt>(prompt_id)?;
        let entry = prompt.history_entry(version).ok_or_else(|| {
            PromptloomError::not_found("Version", format!("{} of prompt {}", version, prompt.id))
        })?;

        let id = prompt.id.clone();
        let mut buffer = self
            .buffers
            .get(&id)
            .cloned()
            .unwrap_or_else(|| EditBuffer::from_prompt(prompt));
        buffer.restore(entry);
        self.buffers.put(&id, buffer.clone())?;
        Ok(buffer)
    }

    /// Rewrite the buffered draft through `optimizer` and keep the result in
    /// the buffer's optimized content.
    pub async fn optimize_prompt(&mut self, prompt_id: &str, optimizer: &dyn Optimizer) -> Result<EditBuffer> {
        let prompt = self.store.resolve::<Prompt>(prompt_id)?;
        let id = prompt.id.clone();
        let scenario = self.store.require::<Scenario>(&prompt.scenario_id)?;
        let role = self.store.require::<Role>(&scenario.role_id)?;
        let ctx = PromptContext::new(role, scenario);

        let mut buffer = self.buffer(&id)?;
        if buffer.content.trim().is_empty() {
            return Err(PromptloomError::InvalidInput(
                "nothing to optimize: the draft is empty".to_string(),
            ));
        }

        tracing::debug!(prompt = %id, provider = optimizer.name(), "Optimizing draft");
        buffer.optimized_content = optimizer.optimize(&buffer.content, &ctx).await?;
        self.buffers.put(&id, buffer.clone())?;
        Ok(buffer)
    }

    /// Commit the buffer (with `edit` applied on top) as the next version.
    pub fn save_prompt(&mut self, prompt_id: &str, edit: BufferEdit) -> Result<Prompt> {
        let id = self.store.resolve::<Prompt>(prompt_id)?.id.clone();
        let mut buffer = self.buffer(&id)?;
        edit.apply(&mut buffer);

        let saved = versioning::save(&mut self.store, &id, &buffer)?;
        self.buffers.remove(&id)?;

        let mut ops = Vec::with_capacity(3);
        if let Some(scenario) = self.store.get::<Scenario>(&saved.scenario_id) {
            if let Some(role) = self.store.get::<Role>(&scenario.role_id) {
                ops.push(PushOp::UpsertRole(role.clone()));
            }
            ops.push(PushOp::UpsertScenario(scenario.clone()));
        }
        ops.push(PushOp::UpsertPrompt(saved.clone()));
        self.push(ops);

        Ok(saved)
    }

    pub fn discard_edits(&mut self, prompt_id: &str) -> Result<bool> {
        let id = self.store.resolve::<Prompt>(prompt_id)?.id.clone();
        Ok(self.buffers.remove(&id)?.is_some())
    }

    pub fn delete_prompt(&mut self, id: &str) -> Result<Prompt> {
        let id = self.store.resolve::<Prompt>(id)?.id.clone();
        let prompt = self.store.remove_local::<Prompt>(&id)?;
        self.buffers.remove(&id)?;
        self.push(vec![PushOp::DeletePrompt(id)]);
        Ok(prompt)
    }

    /// Drop buffers whose prompt is gone.
    fn sweep_buffers(&mut self) -> Result<()> {
        let live: HashSet<&str> = self.store.snapshot().prompts.iter().map(|p| p.id.as_str()).collect();
        self.buffers.retain(|id| live.contains(id))
    }

    // Articles

    pub fn create_article(&mut self, title: &str, content: &str) -> Result<Article> {
        let title = title.trim();
        if title.is_empty() {
            return Err(PromptloomError::InvalidInput("article title is empty".to_string()));
        }
        let article = Article::new(title.to_string(), content.to_string());
        self.store.upsert_local(article.clone())?;
        self.push(vec![PushOp::UpsertArticle(article.clone())]);
        Ok(article)
    }

    pub fn update_article(&mut self, id: &str, title: Option<String>, content: Option<String>) -> Result<Article> {
        let mut article = self.store.resolve::<Article>(id)?.clone();
        if let Some(title) = title {
            article.title = title;
        }
        if let Some(content) = content {
            article.content = content;
        }
        article.updated_at = now_millis();

        self.store.upsert_local(article.clone())?;
        self.push(vec![PushOp::UpsertArticle(article.clone())]);
        Ok(article)
    }

    pub fn delete_article(&mut self, id: &str) -> Result<Article> {
        let id = self.store.resolve::<Article>(id)?.id.clone();
        let article = self.store.remove_local::<Article>(&id)?;
        self.push(vec![PushOp::DeleteArticle(id)]);
        Ok(article)
    }

    // Account and sync

    fn auth(&self) -> Result<&dyn AuthBackend> {
        self.auth.as_deref().ok_or(PromptloomError::NotConfigured)
    }

    fn start_session(&self, session: Session) -> Result<()> {
        self.sessions.save(&session)?;
        self.sync.mirror().set_session(Some(session));
        Ok(())
    }

    /// Register an account. When the backend issues a session right away it
    /// is stored and the cloud snapshot is pulled.
    ///
    /// The pull result is returned separately: a failed pull leaves the
    /// account signed in and is reported through the status indicator.
    pub async fn sign_up(
        &mut self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<(SignUpOutcome, Option<Result<SyncOutcome>>)> {
        let outcome = self.auth()?.sign_up(email, password, username).await?;
        let pulled = match &outcome.session {
            Some(session) => {
                self.start_session(session.clone())?;
                Some(self.pull().await)
            }
            None => None,
        };
        Ok((outcome, pulled))
    }

    /// Sign in and pull the cloud snapshot. Only a rejected sign-in is an
    /// error; the pull result rides alongside the session.
    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<(Session, Result<SyncOutcome>)> {
        let session = self.auth()?.sign_in(email, password).await?;
        self.start_session(session.clone())?;
        tracing::info!("Signed in as {}", session.user.email);

        let pulled = self.pull().await;
        if let Err(e) = &pulled {
            tracing::warn!("Login pull failed: {}", e);
        }
        Ok((session, pulled))
    }

    /// End the session and drop all local records and edit buffers.
    pub async fn sign_out(&mut self) -> Result<()> {
        self.sync.flush().await;
        if let (Some(session), Ok(auth)) = (self.session(), self.auth()) {
            if let Err(e) = auth.sign_out(&session).await {
                tracing::warn!("Remote sign-out failed: {}", e);
            }
        }

        self.sessions.clear()?;
        self.sync.mirror().set_session(None);
        self.store.clear()?;
        self.buffers.retain(|_| false)?;
        Ok(())
    }

    /// The login-time pull: a non-empty cloud replaces local data.
    pub async fn pull(&mut self) -> Result<SyncOutcome> {
        self.sync.pull_on_login(&mut self.store).await
    }

    pub async fn manual_sync<F>(&mut self, choose: F) -> Result<SyncOutcome>
    where
        F: FnOnce(&SnapshotSummary) -> Choice,
    {
        self.sync.flush().await;
        self.sync.manual_sync(&mut self.store, choose).await
    }

    pub async fn restore_from_cloud<F>(&mut self, confirm: F) -> Result<SyncOutcome>
    where
        F: FnOnce(&SnapshotSummary) -> bool,
    {
        self.sync.flush().await;
        let outcome = self.sync.restore_from_cloud(&mut self.store, confirm).await?;
        self.sweep_buffers()?;
        Ok(outcome)
    }
}
