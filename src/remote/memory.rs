use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::auth::{AuthBackend, AuthUser, Session, SignUpOutcome};
use super::{RemoteBackend, Row};
use crate::entity::new_id;
use crate::error::{PromptloomError, Result};

const SESSION_TTL_SECS: i64 = 3600;

struct Account {
    user: AuthUser,
    password: String,
    confirmed: bool,
}

#[derive(Default)]
struct State {
    /// table -> id -> row (rows carry `user_id`)
    tables: HashMap<String, BTreeMap<String, Row>>,
    missing_tables: HashSet<String>,
    accounts: HashMap<String, Account>,
    access_tokens: HashMap<String, String>,
    refresh_tokens: HashMap<String, String>,
    failure: Option<String>,
    confirm_email: bool,
}

/// In-process stand-in for the hosted backend.
///
/// Rows are scoped by their `user_id` column the way row-level security
/// scopes them on the real backend.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// New sign-ups stay unconfirmed and receive no session.
    pub fn requiring_email_confirmation() -> Self {
        let backend = Self::default();
        backend.lock().confirm_email = true;
        backend
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked mid-call.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make `table` behave as not provisioned.
    pub fn drop_table(&self, table: &str) {
        let mut state = self.lock();
        state.tables.remove(table);
        state.missing_tables.insert(table.to_string());
    }

    /// Reject every subsequent data call with `message`, or stop rejecting.
    pub fn fail_with(&self, message: Option<&str>) {
        self.lock().failure = message.map(String::from);
    }

    /// Every stored row of `table`, regardless of owner, ordered by id.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock()
            .tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Store a row directly, bypassing session checks.
    pub fn insert_row(&self, table: &str, row: Row) {
        let Some(id) = row.get("id").and_then(|v| v.as_str()).map(String::from) else {
            return;
        };
        self.lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(id, row);
    }

    fn issue_session(state: &mut State, user: &AuthUser) -> Session {
        let access_token = new_id();
        let refresh_token = new_id();
        state
            .access_tokens
            .insert(access_token.clone(), user.id.clone());
        state
            .refresh_tokens
            .insert(refresh_token.clone(), user.id.clone());
        Session {
            access_token,
            refresh_token: Some(refresh_token),
            expires_at: Some(chrono::Utc::now().timestamp() + SESSION_TTL_SECS),
            user: user.clone(),
        }
    }

    fn authorize(state: &State, session: &Session) -> Result<String> {
        if let Some(message) = &state.failure {
            return Err(PromptloomError::Remote(message.clone()));
        }
        state
            .access_tokens
            .get(&session.access_token)
            .cloned()
            .ok_or_else(|| PromptloomError::Remote("Invalid JWT".to_string()))
    }

    fn check_table(state: &State, table: &str) -> Result<()> {
        if state.missing_tables.contains(table) {
            return Err(PromptloomError::Remote(format!(
                "relation \"public.{}\" does not exist",
                table
            )));
        }
        Ok(())
    }

    fn owner(row: &Row) -> Option<&str> {
        row.get("user_id").and_then(|v| v.as_str())
    }

    /// Remove a row and, like the backend's foreign keys, its children:
    /// roles own scenarios and scenarios own prompts.
    fn remove_cascading(state: &mut State, table: &str, id: &str) {
        if let Some(rows) = state.tables.get_mut(table) {
            rows.remove(id);
        }

        let (child_table, parent_column) = match table {
            "roles" => ("scenarios", "role_id"),
            "scenarios" => ("prompts", "scenario_id"),
            _ => return,
        };
        let children: Vec<String> = state
            .tables
            .get(child_table)
            .map(|rows| {
                rows.iter()
                    .filter(|(_, row)| row.get(parent_column).and_then(|v| v.as_str()) == Some(id))
                    .map(|(child_id, _)| child_id.clone())
                    .collect()
            })
            .unwrap_or_default();
        for child in children {
            Self::remove_cascading(state, child_table, &child);
        }
    }
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
    async fn upsert_rows(&self, session: &Session, table: &str, rows: Vec<Row>) -> Result<()> {
        let mut state = self.lock();
        let user_id = Self::authorize(&state, session)?;
        Self::check_table(&state, table)?;

        let rls_violation = || {
            PromptloomError::Remote(format!(
                "new row violates row-level security policy for table \"{}\"",
                table
            ))
        };

        let stored = state.tables.entry(table.to_string()).or_default();
        let mut accepted = Vec::with_capacity(rows.len());
        for mut row in rows {
            let id = row
                .get("id")
                .and_then(|v| v.as_str())
                .map(String::from)
                .ok_or_else(|| {
                    PromptloomError::Remote("null value in column \"id\"".to_string())
                })?;

            match Self::owner(&row) {
                Some(owner) if owner != user_id => return Err(rls_violation()),
                Some(_) => {}
                None => {
                    if let Some(object) = row.as_object_mut() {
                        object.insert("user_id".to_string(), user_id.clone().into());
                    }
                }
            }

            if let Some(existing) = stored.get(&id) {
                if Self::owner(existing) != Some(user_id.as_str()) {
                    return Err(rls_violation());
                }
            }
            accepted.push((id, row));
        }

        stored.extend(accepted);
        Ok(())
    }

    async fn delete_row(&self, session: &Session, table: &str, id: &str) -> Result<()> {
        let mut state = self.lock();
        let user_id = Self::authorize(&state, session)?;
        Self::check_table(&state, table)?;

        let owned = state
            .tables
            .get(table)
            .and_then(|rows| rows.get(id))
            .is_some_and(|row| Self::owner(row) == Some(user_id.as_str()));
        if owned {
            Self::remove_cascading(&mut state, table, id);
        }
        Ok(())
    }

    async fn fetch_all(&self, session: &Session, table: &str) -> Result<Option<Vec<Row>>> {
        let state = self.lock();
        let user_id = Self::authorize(&state, session)?;
        if state.missing_tables.contains(table) {
            return Ok(None);
        }

        let rows = state
            .tables
            .get(table)
            .map(|rows| {
                rows.values()
                    .filter(|row| Self::owner(row) == Some(user_id.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(Some(rows))
    }
}

#[async_trait]
impl AuthBackend for MemoryBackend {
    async fn sign_up(&self, email: &str, password: &str, username: &str) -> Result<SignUpOutcome> {
        let mut state = self.lock();
        if state.accounts.contains_key(email) {
            return Err(PromptloomError::Remote("User already registered".to_string()));
        }

        let user = AuthUser {
            id: new_id(),
            email: email.to_string(),
            username: Some(username.to_string()).filter(|u| !u.is_empty()),
        };
        let confirmed = !state.confirm_email;
        state.accounts.insert(
            email.to_string(),
            Account {
                user: user.clone(),
                password: password.to_string(),
                confirmed,
            },
        );

        let session = confirmed.then(|| Self::issue_session(&mut state, &user));
        Ok(SignUpOutcome { user, session })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let mut state = self.lock();
        let user = match state.accounts.get(email) {
            Some(account) if account.password == password => {
                if !account.confirmed {
                    return Err(PromptloomError::Remote("Email not confirmed".to_string()));
                }
                account.user.clone()
            }
            _ => {
                return Err(PromptloomError::Remote(
                    "Invalid login credentials".to_string(),
                ))
            }
        };
        Ok(Self::issue_session(&mut state, &user))
    }

    async fn sign_out(&self, session: &Session) -> Result<()> {
        let mut state = self.lock();
        state.access_tokens.remove(&session.access_token);
        if let Some(refresh) = &session.refresh_token {
            state.refresh_tokens.remove(refresh);
        }
        Ok(())
    }

    async fn refresh(&self, session: &Session) -> Result<Session> {
        let mut state = self.lock();
        let user_id = session
            .refresh_token
            .as_ref()
            .and_then(|token| state.refresh_tokens.remove(token))
            .ok_or_else(|| PromptloomError::Remote("Invalid Refresh Token".to_string()))?;

        let user = state
            .accounts
            .values()
            .find(|account| account.user.id == user_id)
            .map(|account| account.user.clone())
            .ok_or_else(|| PromptloomError::Remote("User not found".to_string()))?;

        state.access_tokens.remove(&session.access_token);
        Ok(Self::issue_session(&mut state, &user))
    }
}
