use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::entity::{Article, Prompt, Role, Scenario, SnapshotSummary};
use crate::error::Result;
use crate::remote::RemoteMirror;
use crate::storage::EntityStore;

use super::reconcile::{self, Choice, SyncDecision};
use super::status::StatusIndicator;

/// One scoped remote write that follows a local mutation.
#[derive(Debug, Clone)]
pub enum PushOp {
    UpsertRole(Role),
    DeleteRole(String),
    UpsertScenario(Scenario),
    DeleteScenario(String),
    UpsertPrompt(Prompt),
    DeletePrompt(String),
    UpsertArticle(Article),
    DeleteArticle(String),
}

impl PushOp {
    pub async fn apply(&self, mirror: &RemoteMirror) -> Result<()> {
        match self {
            PushOp::UpsertRole(role) => mirror.upsert_role(role).await,
            PushOp::DeleteRole(id) => mirror.delete_role(id).await,
            PushOp::UpsertScenario(scenario) => mirror.upsert_scenario(scenario).await,
            PushOp::DeleteScenario(id) => mirror.delete_scenario(id).await,
            PushOp::UpsertPrompt(prompt) => mirror.upsert_prompt(prompt).await,
            PushOp::DeletePrompt(id) => mirror.delete_prompt(id).await,
            PushOp::UpsertArticle(article) => mirror.upsert_article(article).await,
            PushOp::DeleteArticle(id) => mirror.delete_article(id).await,
        }
    }
}

impl fmt::Display for PushOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushOp::UpsertRole(r) => write!(f, "upsert role {}", r.id),
            PushOp::DeleteRole(id) => write!(f, "delete role {}", id),
            PushOp::UpsertScenario(s) => write!(f, "upsert scenario {}", s.id),
            PushOp::DeleteScenario(id) => write!(f, "delete scenario {}", id),
            PushOp::UpsertPrompt(p) => write!(f, "upsert prompt {}", p.id),
            PushOp::DeletePrompt(id) => write!(f, "delete prompt {}", id),
            PushOp::UpsertArticle(a) => write!(f, "upsert article {}", a.id),
            PushOp::DeleteArticle(id) => write!(f, "delete article {}", id),
        }
    }
}

/// Completion of a detached push. Dropping it does not cancel the push.
pub struct PushHandle {
    rx: oneshot::Receiver<std::result::Result<(), String>>,
}

impl PushHandle {
    /// Wait for the push to finish. The error carries the backend message.
    pub async fn wait(self) -> std::result::Result<(), String> {
        self.rx
            .await
            .unwrap_or_else(|_| Err("push task ended before reporting".to_string()))
    }
}

/// What a pull or manual sync did to the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Downloaded(SnapshotSummary),
    Uploaded(SnapshotSummary),
    Unchanged,
    Cancelled,
}

/// Decides when the mirror is called and reconciles local and remote state.
pub struct SyncOrchestrator {
    mirror: Arc<RemoteMirror>,
    status: StatusIndicator,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncOrchestrator {
    pub fn new(mirror: Arc<RemoteMirror>) -> Self {
        Self {
            mirror,
            status: StatusIndicator::new(),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn mirror(&self) -> &Arc<RemoteMirror> {
        &self.mirror
    }

    pub fn status(&self) -> &StatusIndicator {
        &self.status
    }

    /// Fire `ops` in order on a background task.
    ///
    /// Returns `None` without doing anything when signed out or when no
    /// backend is configured. A failure is logged and shown through the
    /// status indicator; it never reaches the caller's local mutation.
    pub fn push(&self, ops: Vec<PushOp>) -> Option<PushHandle> {
        if ops.is_empty() {
            return None;
        }
        if !self.mirror.can_push() {
            tracing::debug!("Skipping push of {} ops: local-only mode", ops.len());
            return None;
        }

        let mirror = self.mirror.clone();
        let status = self.status.clone();
        let (tx, rx) = oneshot::channel();

        status.loading("Syncing");
        let handle = tokio::spawn(async move {
            let mut result = Ok(());
            for op in &ops {
                tracing::debug!("Pushing: {}", op);
                if let Err(e) = op.apply(&mirror).await {
                    tracing::warn!("Push failed ({}): {}", op, e);
                    result = Err(e.to_string());
                    break;
                }
            }

            match &result {
                Ok(()) => status.succeed("Synced"),
                Err(message) => status.fail(message.clone()),
            }
            let _ = tx.send(result);
        });

        self.track(handle);
        Some(PushHandle { rx })
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Wait for every outstanding push.
    pub async fn flush(&self) {
        let handles: Vec<_> = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("Push task panicked: {}", e);
            }
        }
    }

    /// Pull after sign-in. A non-empty cloud replaces all local collections;
    /// an empty one leaves them untouched.
    pub async fn pull_on_login(&self, store: &mut EntityStore) -> Result<SyncOutcome> {
        self.status.loading("Pulling from cloud");
        let remote = self.report(self.mirror.download_snapshot().await)?;

        match reconcile::on_login(&remote) {
            SyncDecision::ReplaceLocal => {
                let summary = remote.summary();
                self.report(store.replace_snapshot(remote))?;
                tracing::info!(%summary, "Replaced local data with cloud snapshot");
                self.status.succeed("Data synced from cloud");
                Ok(SyncOutcome::Downloaded(summary))
            }
            _ => {
                tracing::info!("Cloud snapshot empty; keeping local data");
                self.status.succeed("Cloud is empty; local data kept");
                Ok(SyncOutcome::Unchanged)
            }
        }
    }

    /// Explicit "save & sync". When the cloud already holds data, `choose`
    /// picks which side wins.
    pub async fn manual_sync<F>(&self, store: &mut EntityStore, choose: F) -> Result<SyncOutcome>
    where
        F: FnOnce(&SnapshotSummary) -> Choice,
    {
        self.status.loading("Checking cloud data");
        let remote = self.report(self.mirror.download_snapshot().await)?;

        let accept_remote = match reconcile::on_manual_sync(&remote) {
            SyncDecision::ManualChoice { remote_summary } => {
                choose(&remote_summary) == Choice::AcceptRemote
            }
            _ => false,
        };

        if accept_remote {
            let summary = remote.summary();
            self.report(store.replace_snapshot(remote))?;
            self.status.succeed("Local data replaced from cloud");
            return Ok(SyncOutcome::Downloaded(summary));
        }

        self.status.loading("Uploading local data");
        self.report(self.mirror.upload_snapshot(store.snapshot()).await)?;
        self.status.succeed("Uploaded to cloud");
        Ok(SyncOutcome::Uploaded(store.snapshot().summary()))
    }

    /// Pull the cloud snapshot and, if `confirm` agrees, replace all local
    /// collections with it.
    pub async fn restore_from_cloud<F>(&self, store: &mut EntityStore, confirm: F) -> Result<SyncOutcome>
    where
        F: FnOnce(&SnapshotSummary) -> bool,
    {
        self.status.loading("Pulling from cloud");
        let remote = self.report(self.mirror.download_snapshot().await)?;
        let summary = remote.summary();

        if !confirm(&summary) {
            self.status.clear();
            return Ok(SyncOutcome::Cancelled);
        }

        self.report(store.replace_snapshot(remote))?;
        self.status.succeed("Restored from cloud");
        Ok(SyncOutcome::Downloaded(summary))
    }

    fn report<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            tracing::error!("Sync failed: {}", e);
            self.status.fail(e.to_string());
        }
        result
    }
}
