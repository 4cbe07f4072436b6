use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// How long a success message stays up before the indicator goes idle.
pub const SUCCESS_DISPLAY: Duration = Duration::from_secs(2);
/// How long an error message stays up.
pub const ERROR_DISPLAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Idle,
    Loading(String),
    Success(String),
    Error(String),
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Idle => write!(f, "idle"),
            SyncStatus::Loading(msg) => write!(f, "syncing: {}", msg),
            SyncStatus::Success(msg) => write!(f, "ok: {}", msg),
            SyncStatus::Error(msg) => write!(f, "error: {}", msg),
        }
    }
}

/// Single-slot sync indicator. A newer status overwrites the older one and
/// cancels its pending revert to idle.
#[derive(Clone)]
pub struct StatusIndicator {
    tx: Arc<watch::Sender<SyncStatus>>,
    generation: Arc<AtomicU64>,
}

impl Default for StatusIndicator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusIndicator {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SyncStatus::Idle);
        Self {
            tx: Arc::new(tx),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> SyncStatus {
        self.tx.borrow().clone()
    }

    pub fn loading(&self, message: impl Into<String>) {
        self.publish(SyncStatus::Loading(message.into()));
    }

    pub fn succeed(&self, message: impl Into<String>) {
        let generation = self.publish(SyncStatus::Success(message.into()));
        self.revert_after(SUCCESS_DISPLAY, generation);
    }

    pub fn fail(&self, message: impl Into<String>) {
        let generation = self.publish(SyncStatus::Error(message.into()));
        self.revert_after(ERROR_DISPLAY, generation);
    }

    pub fn clear(&self) {
        self.publish(SyncStatus::Idle);
    }

    fn publish(&self, status: SyncStatus) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.tx.send_replace(status);
        generation
    }

    fn revert_after(&self, delay: Duration, generation: u64) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let tx = self.tx.clone();
        let current = self.generation.clone();
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if current.load(Ordering::SeqCst) == generation {
                tx.send_replace(SyncStatus::Idle);
            }
        });
    }
}
