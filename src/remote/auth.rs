use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PromptloomError, Result};
use crate::storage::SessionStore;

/// The signed-in account as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl AuthUser {
    /// Username if set, otherwise the local part of the email.
    pub fn display_name(&self) -> &str {
        match self.username.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => self.email.split('@').next().unwrap_or("User"),
        }
    }
}

/// An issued session. Every remote mirror call needs one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry as seconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl Session {
    pub fn is_expired(&self, now_secs: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now_secs)
    }
}

/// Result of registration. `session` is `None` while email confirmation is
/// pending.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user: AuthUser,
    pub session: Option<Session>,
}

/// Email/password session issuance.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str, username: &str) -> Result<SignUpOutcome>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    async fn sign_out(&self, session: &Session) -> Result<()>;

    /// Exchange the session's refresh token for a fresh session.
    async fn refresh(&self, session: &Session) -> Result<Session>;
}

/// Return the persisted session, refreshing it first if it has expired.
///
/// A session the backend refuses to refresh is cleared. Any other refresh
/// failure returns `None` for this run and keeps the stored session.
pub async fn get_session(sessions: &SessionStore, auth: Option<&dyn AuthBackend>) -> Option<Session> {
    let session = sessions.load()?;
    let now = chrono::Utc::now().timestamp();

    if !session.is_expired(now) {
        return Some(session);
    }

    let refreshed = match (auth, session.refresh_token.as_deref()) {
        (Some(auth), Some(_)) => auth.refresh(&session).await,
        _ => {
            tracing::info!("Session expired and cannot be refreshed; signing out");
            let _ = sessions.clear();
            return None;
        }
    };

    match refreshed {
        Ok(fresh) => {
            if let Err(e) = sessions.save(&fresh) {
                tracing::warn!("Failed to persist refreshed session: {}", e);
            }
            Some(fresh)
        }
        Err(PromptloomError::Remote(message)) => {
            tracing::warn!("Session refresh rejected: {}; signing out", message);
            let _ = sessions.clear();
            None
        }
        Err(e) => {
            // Transport failure: keep the session so the next run can retry.
            tracing::warn!("Session refresh failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryBackend;
    use tempfile::TempDir;

    /// Auth backend whose refresh never reaches the server.
    struct Unreachable;

    #[async_trait]
    impl AuthBackend for Unreachable {
        async fn sign_up(&self, _: &str, _: &str, _: &str) -> Result<SignUpOutcome> {
            unreachable!()
        }
        async fn sign_in(&self, _: &str, _: &str) -> Result<Session> {
            unreachable!()
        }
        async fn sign_out(&self, _: &Session) -> Result<()> {
            Ok(())
        }
        async fn refresh(&self, _: &Session) -> Result<Session> {
            Err(PromptloomError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )))
        }
    }

    fn expired(refresh_token: &str) -> Session {
        Session {
            access_token: "stale".to_string(),
            refresh_token: Some(refresh_token.to_string()),
            expires_at: Some(0),
            user: user(None),
        }
    }

    #[tokio::test]
    async fn test_unreachable_refresh_keeps_session() {
        let tmp = TempDir::new().unwrap();
        let sessions = SessionStore::new(tmp.path());
        sessions.save(&expired("r1")).unwrap();

        let auth: &dyn AuthBackend = &Unreachable;
        assert!(get_session(&sessions, Some(auth)).await.is_none());
        assert_eq!(sessions.load(), Some(expired("r1")));
    }

    #[tokio::test]
    async fn test_rejected_refresh_clears_session() {
        let tmp = TempDir::new().unwrap();
        let sessions = SessionStore::new(tmp.path());
        sessions.save(&expired("revoked")).unwrap();

        let backend = MemoryBackend::new();
        let auth: &dyn AuthBackend = &backend;
        assert!(get_session(&sessions, Some(auth)).await.is_none());
        assert!(sessions.load().is_none());
    }

    fn user(username: Option<&str>) -> AuthUser {
        AuthUser {
            id: "u1".to_string(),
            email: "ada@example.com".to_string(),
            username: username.map(String::from),
        }
    }

    #[test]
    fn test_display_name() {
        assert_eq!(user(Some("ada")).display_name(), "ada");
        assert_eq!(user(None).display_name(), "ada");
        assert_eq!(user(Some("")).display_name(), "ada");
    }

    #[test]
    fn test_session_expiry() {
        let mut session = Session {
            access_token: "t".to_string(),
            refresh_token: None,
            expires_at: None,
            user: user(None),
        };
        assert!(!session.is_expired(i64::MAX));

        session.expires_at = Some(100);
        assert!(session.is_expired(100));
        assert!(!session.is_expired(99));
    }
}
