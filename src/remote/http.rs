use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::auth::{AuthBackend, AuthUser, Session, SignUpOutcome};
use super::{RemoteBackend, Row};
use crate::error::{PromptloomError, Result};

/// PostgREST error codes meaning the table does not exist.
const MISSING_TABLE_CODES: [&str; 2] = ["42P01", "PGRST205"];

/// Error payloads from the REST and auth endpoints.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl ErrorBody {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn message(&self) -> Option<&str> {
        self.message
            .as_deref()
            .or(self.msg.as_deref())
            .or(self.error_description.as_deref())
    }

    fn code(&self) -> Option<String> {
        match self.code.as_ref()? {
            serde_json::Value::String(code) => Some(code.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    data: SignUpMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct SignUpMetadata<'a> {
    username: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<UserMetadata>,
}

impl From<UserResponse> for AuthUser {
    fn from(user: UserResponse) -> Self {
        AuthUser {
            id: user.id,
            email: user.email.unwrap_or_default(),
            username: user.user_metadata.and_then(|m| m.username),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: UserResponse,
}

impl From<TokenResponse> for Session {
    fn from(token: TokenResponse) -> Self {
        let expires_at = token.expires_at.or_else(|| {
            token
                .expires_in
                .map(|secs| chrono::Utc::now().timestamp() + secs)
        });
        Session {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            user: token.user.into(),
        }
    }
}

/// Signup answers with a session when confirmation is off, or with the bare
/// user while confirmation is pending.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(UserResponse),
}

/// REST (`/rest/v1`) and auth (`/auth/v1`) client for the hosted backend.
pub struct HttpBackend {
    base_url: String,
    anon_key: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn rest(&self, method: reqwest::Method, table: &str, session: &Session) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.table_url(table))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
    }

    /// Turn a non-success response into a `Remote` error carrying the
    /// backend's own message.
    async fn reject(response: Response, context: &str) -> PromptloomError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::error!("{} failed: HTTP {} - {}", context, status, body);

        let message = ErrorBody::parse(&body)
            .message()
            .map(String::from)
            .unwrap_or_else(|| format!("{} failed: HTTP {}", context, status));
        PromptloomError::Remote(message)
    }

    async fn token(&self, grant_type: &str, body: &impl Serialize) -> Result<Session> {
        let response = self
            .client
            .post(self.auth_url("token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.anon_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::reject(response, "Sign in").await);
        }

        let token = response.json::<TokenResponse>().await.map_err(|e| {
            tracing::error!("Failed to parse token response: {}", e);
            PromptloomError::Remote(format!("Failed to parse token response: {}", e))
        })?;
        Ok(token.into())
    }
}

#[async_trait]
impl RemoteBackend for HttpBackend {
    async fn upsert_rows(&self, session: &Session, table: &str, rows: Vec<Row>) -> Result<()> {
        tracing::debug!(table, rows = rows.len(), "Upserting rows");

        let response = self
            .rest(reqwest::Method::POST, table, session)
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&rows)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::reject(response, &format!("Upsert into {}", table)).await);
        }
        Ok(())
    }

    async fn delete_row(&self, session: &Session, table: &str, id: &str) -> Result<()> {
        tracing::debug!(table, id, "Deleting row");

        let response = self
            .rest(reqwest::Method::DELETE, table, session)
            .query(&[("id", format!("eq.{}", id))])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::reject(response, &format!("Delete from {}", table)).await);
        }
        Ok(())
    }

    async fn fetch_all(&self, session: &Session, table: &str) -> Result<Option<Vec<Row>>> {
        tracing::debug!(table, "Fetching rows");

        let response = self
            .rest(reqwest::Method::GET, table, session)
            .query(&[("select", "*")])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let rows = response.json::<Vec<Row>>().await.map_err(|e| {
                PromptloomError::Remote(format!("Failed to parse {} rows: {}", table, e))
            })?;
            return Ok(Some(rows));
        }

        let body = response.text().await.unwrap_or_default();
        let error = ErrorBody::parse(&body);
        let missing_code = error
            .code()
            .is_some_and(|code| MISSING_TABLE_CODES.contains(&code.as_str()));

        if status == StatusCode::NOT_FOUND || missing_code {
            tracing::warn!("Table {} is not provisioned on the backend", table);
            return Ok(None);
        }

        tracing::error!("Fetch from {} failed: HTTP {} - {}", table, status, body);
        Err(PromptloomError::Remote(
            error
                .message()
                .map(String::from)
                .unwrap_or_else(|| format!("Fetch from {} failed: HTTP {}", table, status)),
        ))
    }
}

#[async_trait]
impl AuthBackend for HttpBackend {
    async fn sign_up(&self, email: &str, password: &str, username: &str) -> Result<SignUpOutcome> {
        tracing::debug!("Signing up {}", email);

        let response = self
            .client
            .post(self.auth_url("signup"))
            .header("apikey", &self.anon_key)
            .json(&SignUpRequest {
                email,
                password,
                data: SignUpMetadata { username },
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::reject(response, "Sign up").await);
        }

        let parsed = response.json::<SignUpResponse>().await.map_err(|e| {
            PromptloomError::Remote(format!("Failed to parse sign-up response: {}", e))
        })?;

        Ok(match parsed {
            SignUpResponse::Session(token) => {
                let session: Session = token.into();
                SignUpOutcome {
                    user: session.user.clone(),
                    session: Some(session),
                }
            }
            SignUpResponse::User(user) => SignUpOutcome {
                user: user.into(),
                session: None,
            },
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        tracing::debug!("Signing in {}", email);
        self.token("password", &Credentials { email, password }).await
    }

    async fn sign_out(&self, session: &Session) -> Result<()> {
        let response = self
            .client
            .post(self.auth_url("logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::reject(response, "Sign out").await);
        }
        Ok(())
    }

    async fn refresh(&self, session: &Session) -> Result<Session> {
        let refresh_token = session
            .refresh_token
            .as_deref()
            .ok_or_else(|| PromptloomError::Auth("session has no refresh token".to_string()))?;

        tracing::debug!("Refreshing session for {}", session.user.id);
        self.token("refresh_token", &RefreshRequest { refresh_token })
            .await
    }
}
