//! End-to-end tests against an axum fake of the hosted backend and of the
//! two model providers, served on a loopback port.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

use promptloom::config::{BackendSettings, GeminiSettings, Settings, SiliconFlowSettings};
use promptloom::entity::{Role, Scenario};
use promptloom::gateway::{GeminiOptimizer, OpenAiCompatOptimizer, Optimizer, PromptContext};
use promptloom::remote::{AuthBackend, Backends, HttpBackend, RemoteBackend, RemoteMirror};
use promptloom::sync::{Choice, SyncOutcome};
use promptloom::{PromptloomError, Workspace};

const ANON_KEY: &str = "anon-key";
const EMAIL: &str = "ada@example.com";
const PASSWORD: &str = "hunter2";
const USER_ID: &str = "user-ada";
const TOKEN: &str = "token-ada";

#[derive(Default)]
struct FakeState {
    /// table -> id -> row
    tables: HashMap<String, BTreeMap<String, Value>>,
    provisioned: HashSet<String>,
    signed_out: bool,
    gemini_keys: Vec<String>,
}

#[derive(Clone, Default)]
struct Fake {
    state: Arc<Mutex<FakeState>>,
}

impl Fake {
    fn new() -> Self {
        let fake = Fake::default();
        {
            let mut state = fake.state.lock().unwrap();
            for table in ["roles", "scenarios", "prompts", "articles"] {
                state.provisioned.insert(table.to_string());
            }
        }
        fake
    }

    fn drop_table(&self, table: &str) {
        self.state.lock().unwrap().provisioned.remove(table);
    }

    fn rows(&self, table: &str) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn seed(&self, table: &str, row: Value) {
        let id = row["id"].as_str().unwrap().to_string();
        self.state
            .lock()
            .unwrap()
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(id, row);
    }
}

fn error(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn authorized(headers: &HeaderMap) -> bool {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let bearer = format!("Bearer {}", TOKEN);
    header("apikey") == Some(ANON_KEY) && header("authorization") == Some(bearer.as_str())
}

fn token_body() -> Value {
    json!({
        "access_token": TOKEN,
        "refresh_token": "refresh-ada",
        "expires_in": 3600,
        "user": {"id": USER_ID, "email": EMAIL, "user_metadata": {"username": "ada"}}
    })
}

async fn upsert(
    State(fake): State<Fake>,
    Path(table): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(rows): Json<Vec<Value>>,
) -> Response {
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, json!({"message": "Invalid JWT"}));
    }
    if query.get("on_conflict").map(String::as_str) != Some("id") {
        return error(StatusCode::BAD_REQUEST, json!({"message": "missing on_conflict"}));
    }
    let mut state = fake.state.lock().unwrap();
    if !state.provisioned.contains(&table) {
        return error(
            StatusCode::NOT_FOUND,
            json!({"code": "42P01", "message": format!("relation \"public.{}\" does not exist", table)}),
        );
    }
    for row in rows {
        if row["user_id"] != USER_ID {
            return error(
                StatusCode::FORBIDDEN,
                json!({"message": format!("new row violates row-level security policy for table \"{}\"", table)}),
            );
        }
        let id = row["id"].as_str().unwrap_or_default().to_string();
        state.tables.entry(table.clone()).or_default().insert(id, row);
    }
    StatusCode::CREATED.into_response()
}

async fn fetch(State(fake): State<Fake>, Path(table): Path<String>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, json!({"message": "Invalid JWT"}));
    }
    let state = fake.state.lock().unwrap();
    if !state.provisioned.contains(&table) {
        return error(
            StatusCode::NOT_FOUND,
            json!({"code": "PGRST205", "message": format!("Could not find the table 'public.{}'", table)}),
        );
    }
    let rows: Vec<Value> = state
        .tables
        .get(&table)
        .map(|rows| rows.values().cloned().collect())
        .unwrap_or_default();
    Json(rows).into_response()
}

async fn delete(
    State(fake): State<Fake>,
    Path(table): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, json!({"message": "Invalid JWT"}));
    }
    let Some(id) = query.get("id").and_then(|v| v.strip_prefix("eq.")) else {
        return error(StatusCode::BAD_REQUEST, json!({"message": "missing id filter"}));
    };
    let mut state = fake.state.lock().unwrap();
    if let Some(rows) = state.tables.get_mut(&table) {
        rows.remove(id);
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn signup(Json(body): Json<Value>) -> Response {
    if body["email"] == EMAIL {
        return error(StatusCode::UNPROCESSABLE_ENTITY, json!({"msg": "User already registered"}));
    }
    // Any other address is left waiting for email confirmation.
    Json(json!({
        "id": "user-new",
        "email": body["email"],
        "user_metadata": {"username": body["data"]["username"]}
    }))
    .into_response()
}

async fn token(Query(query): Query<HashMap<String, String>>, Json(body): Json<Value>) -> Response {
    match query.get("grant_type").map(String::as_str) {
        Some("password") if body["email"] == EMAIL && body["password"] == PASSWORD => {
            Json(token_body()).into_response()
        }
        Some("refresh_token") if body["refresh_token"] == "refresh-ada" => {
            Json(token_body()).into_response()
        }
        _ => error(
            StatusCode::BAD_REQUEST,
            json!({"error": "invalid_grant", "error_description": "Invalid login credentials"}),
        ),
    }
}

async fn logout(State(fake): State<Fake>, headers: HeaderMap) -> StatusCode {
    let bearer = format!("Bearer {}", TOKEN);
    if headers.get("authorization").and_then(|v| v.to_str().ok()) == Some(bearer.as_str()) {
        fake.state.lock().unwrap().signed_out = true;
    }
    StatusCode::NO_CONTENT
}

async fn gemini(
    State(fake): State<Fake>,
    Path(call): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if call != "gemini-2.5-flash:generateContent" {
        return error(StatusCode::NOT_FOUND, json!({"error": {"message": "model not found"}}));
    }
    let key = headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    fake.state.lock().unwrap().gemini_keys.push(key);

    let system = body["systemInstruction"]["parts"][0]["text"].as_str().unwrap_or_default();
    if !system.contains("Prompt Engineer") {
        return error(StatusCode::BAD_REQUEST, json!({"error": {"message": "no system"}}));
    }
    Json(json!({
        "candidates": [{"content": {"parts": [{"text": "You are an editor. "}, {"text": "Write the intro."}]}}]
    }))
    .into_response()
}

async fn chat(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer sf-key") {
        return error(StatusCode::UNAUTHORIZED, json!({"error": {"message": "Invalid token"}}));
    }
    if body["model"] == "missing/model" {
        return error(StatusCode::BAD_REQUEST, json!({"error": {"message": "Model does not exist"}}));
    }
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["role"], "user");
    Json(json!({"choices": [{"message": {"role": "assistant", "content": "Optimized prompt"}}]}))
        .into_response()
}

async fn serve(fake: Fake) -> String {
    let app = Router::new()
        .route("/rest/v1/{table}", get(fetch).post(upsert).delete(delete))
        .route("/auth/v1/signup", post(signup))
        .route("/auth/v1/token", post(token))
        .route("/auth/v1/logout", post(logout))
        .route("/v1beta/models/{call}", post(gemini))
        .route("/v1/chat/completions", post(chat))
        .with_state(fake);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn backend_settings(url: &str) -> Settings {
    Settings {
        backend: BackendSettings {
            url: url.to_string(),
            anon_key: ANON_KEY.to_string(),
        },
        ..Settings::default()
    }
}

async fn workspace(tmp: &TempDir, url: &str) -> Workspace {
    let store = match promptloom::storage::EntityStore::open(tmp.path()) {
        Ok(store) => store,
        Err(_) => Workspace::init(tmp.path()).unwrap(),
    };
    let settings = backend_settings(url);
    let backends = Backends::http(&settings.backend);
    Workspace::connect(store, settings, backends).await
}

#[tokio::test]
async fn test_sign_in_rejects_bad_password() {
    let url = serve(Fake::new()).await;
    let backend = HttpBackend::new(&url, ANON_KEY);

    let err = backend.sign_in(EMAIL, "wrong").await.unwrap_err();
    assert!(matches!(err, PromptloomError::Remote(m) if m == "Invalid login credentials"));
}

#[tokio::test]
async fn test_sign_up_pending_confirmation_has_no_session() {
    let url = serve(Fake::new()).await;
    let backend = HttpBackend::new(&url, ANON_KEY);

    let outcome = backend.sign_up("new@example.com", "pw", "newbie").await.unwrap();
    assert!(outcome.session.is_none());
    assert_eq!(outcome.user.display_name(), "newbie");

    let err = backend.sign_up(EMAIL, "pw", "ada").await.unwrap_err();
    assert_eq!(err.to_string(), "User already registered");
}

#[tokio::test]
async fn test_rest_calls_and_missing_table() {
    let fake = Fake::new();
    let url = serve(fake.clone()).await;
    let backend = HttpBackend::new(&url, ANON_KEY);
    let session = backend.sign_in(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(session.user.id, USER_ID);
    assert!(session.expires_at.is_some());

    let row = json!({"id": "r1", "name": "Editor", "user_id": USER_ID});
    backend.upsert_rows(&session, "roles", vec![row]).await.unwrap();
    let rows = backend.fetch_all(&session, "roles").await.unwrap().unwrap();
    assert_eq!(rows.len(), 1);

    backend.delete_row(&session, "roles", "r1").await.unwrap();
    assert!(fake.rows("roles").is_empty());

    fake.drop_table("articles");
    assert!(backend.fetch_all(&session, "articles").await.unwrap().is_none());

    let foreign = json!({"id": "r2", "name": "Spy", "user_id": "someone-else"});
    let err = backend.upsert_rows(&session, "roles", vec![foreign]).await.unwrap_err();
    assert!(err.to_string().contains("row-level security"));
}

#[tokio::test]
async fn test_workspace_pushes_mutations() {
    let fake = Fake::new();
    let url = serve(fake.clone()).await;
    let tmp = TempDir::new().unwrap();
    let mut ws = workspace(&tmp, &url).await;

    let (_, outcome) = ws.sign_in(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(outcome.unwrap(), SyncOutcome::Unchanged);

    let role = ws.create_role("Editor", "Edits copy", None, None).unwrap();
    let scenario = ws.create_scenario(&role.id, "Blog", "Weekly posts").unwrap();
    let prompt = ws.create_prompt(&scenario.id, None, vec!["seo".to_string()]).unwrap();
    ws.sync().flush().await;

    let roles = fake.rows("roles");
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0]["user_id"], USER_ID);
    assert_eq!(roles[0]["name"], "Editor");
    let prompts = fake.rows("prompts");
    assert_eq!(prompts[0]["scenario_id"], scenario.id.as_str());
    assert_eq!(prompts[0]["version"], 1);

    let edit = promptloom::workspace::BufferEdit {
        content: Some("Write an intro".to_string()),
        ..Default::default()
    };
    ws.save_prompt(&prompt.id, edit).unwrap();
    ws.sync().flush().await;
    assert_eq!(fake.rows("prompts")[0]["version"], 2);
    assert_eq!(fake.rows("prompts")[0]["content"], "Write an intro");

    ws.delete_prompt(&prompt.id).unwrap();
    ws.sync().flush().await;
    assert!(fake.rows("prompts").is_empty());
    assert_eq!(fake.rows("scenarios").len(), 1);
}

#[tokio::test]
async fn test_sign_in_pulls_non_empty_cloud() {
    let fake = Fake::new();
    fake.seed(
        "roles",
        json!({"id": "r1", "name": "Cloud role", "description": "", "icon": "🧑", "color": "teal", "created_at": 1, "user_id": USER_ID}),
    );
    fake.seed(
        "prompts",
        json!({"id": "p1", "scenario_id": "s1", "title": "T", "content": "c", "tags": null, "history": null, "created_at": 1, "updated_at": 2, "user_id": USER_ID}),
    );
    let url = serve(fake.clone()).await;
    let tmp = TempDir::new().unwrap();
    let mut ws = workspace(&tmp, &url).await;
    ws.create_role("Local only", "", None, None).unwrap();

    let (_, outcome) = ws.sign_in(EMAIL, PASSWORD).await.unwrap();
    assert!(matches!(outcome, Ok(SyncOutcome::Downloaded(s)) if s.roles == 1 && s.prompts == 1));

    let roles = ws.store().roles();
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].name, "Cloud role");
    let prompt = &ws.store().snapshot().prompts[0];
    assert!(prompt.tags.is_empty());
    assert!(prompt.history.is_empty());
    assert_eq!(prompt.version, 1);
}

#[tokio::test]
async fn test_session_survives_reopen_and_sign_out_clears() {
    let fake = Fake::new();
    let url = serve(fake.clone()).await;
    let tmp = TempDir::new().unwrap();

    {
        let mut ws = workspace(&tmp, &url).await;
        ws.sign_in(EMAIL, PASSWORD).await.unwrap();
        ws.create_role("Editor", "", None, None).unwrap();
        ws.sync().flush().await;
    }

    let mut ws = workspace(&tmp, &url).await;
    let session = ws.session().unwrap();
    assert_eq!(session.user.email, EMAIL);

    ws.sign_out().await.unwrap();
    assert!(ws.session().is_none());
    assert!(ws.store().roles().is_empty());
    assert!(fake.state.lock().unwrap().signed_out);

    let ws = workspace(&tmp, &url).await;
    assert!(ws.session().is_none());
    // The cloud copy is untouched by sign-out.
    assert_eq!(fake.rows("roles").len(), 1);
}

#[tokio::test]
async fn test_manual_sync_choices() {
    let fake = Fake::new();
    let url = serve(fake.clone()).await;
    let tmp = TempDir::new().unwrap();
    let mut ws = workspace(&tmp, &url).await;
    // Created while signed out, so nothing is pushed yet.
    ws.create_article("Style guide", "Short sentences").unwrap();
    ws.sign_in(EMAIL, PASSWORD).await.unwrap();

    // Empty cloud: local data seeds it without asking.
    let outcome = ws
        .manual_sync(|_| panic!("no choice expected for an empty cloud"))
        .await
        .unwrap();
    assert!(matches!(outcome, SyncOutcome::Uploaded(s) if s.articles == 1));
    assert_eq!(fake.rows("articles").len(), 1);

    // Cloud gains a record this workspace has not seen.
    fake.seed(
        "articles",
        json!({"id": "a-cloud", "title": "From elsewhere", "content": "", "created_at": 1, "updated_at": 1, "user_id": USER_ID}),
    );

    let outcome = ws.manual_sync(|_| Choice::AcceptRemote).await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Downloaded(s) if s.articles == 2));
    assert_eq!(ws.store().articles().len(), 2);

    ws.create_article("Local draft", "").unwrap();
    ws.sync().flush().await;
    let outcome = ws
        .manual_sync(|summary| {
            assert_eq!(summary.articles, 3);
            Choice::PushLocal
        })
        .await
        .unwrap();
    assert!(matches!(outcome, SyncOutcome::Uploaded(_)));
}

#[tokio::test]
async fn test_upload_reports_missing_table() {
    let fake = Fake::new();
    let url = serve(fake.clone()).await;
    let tmp = TempDir::new().unwrap();
    let mut ws = workspace(&tmp, &url).await;
    ws.sign_in(EMAIL, PASSWORD).await.unwrap();
    ws.create_article("Style guide", "").unwrap();
    ws.sync().flush().await;

    fake.drop_table("articles");
    let err = ws.manual_sync(|_| Choice::PushLocal).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "articles sync error: relation \"public.articles\" does not exist"
    );
}

#[tokio::test]
async fn test_restore_from_cloud() {
    let fake = Fake::new();
    let url = serve(fake.clone()).await;
    let tmp = TempDir::new().unwrap();
    let mut ws = workspace(&tmp, &url).await;
    ws.sign_in(EMAIL, PASSWORD).await.unwrap();
    ws.create_role("Editor", "", None, None).unwrap();
    ws.sync().flush().await;

    // Local-only change, then restore.
    let role_id = ws.store().roles()[0].id.clone();
    let mirror: &RemoteMirror = ws.sync().mirror();
    assert!(mirror.can_push());
    ws.create_role("Unsynced", "", None, None).unwrap();
    ws.sync().flush().await;
    fake.state.lock().unwrap().tables.get_mut("roles").unwrap().retain(|id, _| id == &role_id);

    let outcome = ws.restore_from_cloud(|_| false).await.unwrap();
    assert_eq!(outcome, SyncOutcome::Cancelled);
    assert_eq!(ws.store().roles().len(), 2);

    let outcome = ws.restore_from_cloud(|_| true).await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Downloaded(s) if s.roles == 1));
    assert_eq!(ws.store().roles()[0].id, role_id);
}

#[tokio::test]
async fn test_push_failure_keeps_local_change() {
    let fake = Fake::new();
    let url = serve(fake.clone()).await;
    let tmp = TempDir::new().unwrap();
    let mut ws = workspace(&tmp, &url).await;
    ws.sign_in(EMAIL, PASSWORD).await.unwrap();

    fake.drop_table("roles");
    ws.create_role("Editor", "", None, None).unwrap();
    ws.sync().flush().await;

    assert_eq!(ws.store().roles().len(), 1);
    assert!(matches!(
        ws.sync().status().current(),
        promptloom::sync::SyncStatus::Error(m) if m.contains("does not exist")
    ));
}

fn context() -> (Role, Scenario) {
    let role = Role::new("Editor".to_string(), "Edits blog copy".to_string());
    let scenario = Scenario::new(role.id.clone(), "Blog".to_string(), "Weekly posts".to_string());
    (role, scenario)
}

#[tokio::test]
async fn test_gemini_optimize() {
    let fake = Fake::new();
    let url = serve(fake.clone()).await;
    let optimizer = GeminiOptimizer::new(&GeminiSettings {
        api_key: "g-key".to_string(),
        model: String::new(),
    })
    .with_base_url(&url);

    let (role, scenario) = context();
    let text = optimizer
        .optimize("write intro", &PromptContext::new(&role, &scenario))
        .await
        .unwrap();
    assert_eq!(text, "You are an editor. Write the intro.");
    assert_eq!(fake.state.lock().unwrap().gemini_keys, vec!["g-key".to_string()]);

    let broken = GeminiOptimizer::new(&GeminiSettings {
        api_key: "g-key".to_string(),
        model: "nope".to_string(),
    })
    .with_base_url(&url);
    let err = broken
        .optimize("write intro", &PromptContext::new(&role, &scenario))
        .await
        .unwrap_err();
    assert!(matches!(err, PromptloomError::Provider(m) if m.contains("model not found")));
}

#[tokio::test]
async fn test_openai_compatible_optimize() {
    let url = serve(Fake::new()).await;
    let settings = |model: &str| SiliconFlowSettings {
        api_key: "sf-key".to_string(),
        model: model.to_string(),
        base_url: format!("{}/v1", url),
    };
    let (role, scenario) = context();
    let ctx = PromptContext::new(&role, &scenario);

    let text = OpenAiCompatOptimizer::new(&settings("Qwen/Qwen2.5-7B-Instruct"))
        .optimize("draft", &ctx)
        .await
        .unwrap();
    assert_eq!(text, "Optimized prompt");

    let err = OpenAiCompatOptimizer::new(&settings("missing/model"))
        .optimize("draft", &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, PromptloomError::Provider(m) if m == "API Error: Model does not exist"));
}

#[tokio::test]
async fn test_workspace_optimize_fills_buffer() {
    let url = serve(Fake::new()).await;
    let tmp = TempDir::new().unwrap();
    let mut ws = workspace(&tmp, &url).await;
    let role = ws.create_role("Editor", "", None, None).unwrap();
    let scenario = ws.create_scenario(&role.id, "Blog", "").unwrap();
    let prompt = ws.create_prompt(&scenario.id, None, Vec::new()).unwrap();
    ws.edit_prompt(
        &prompt.id,
        promptloom::workspace::BufferEdit {
            content: Some("draft".to_string()),
            ..Default::default()
        },
    )
    .unwrap();

    let optimizer = OpenAiCompatOptimizer::new(&SiliconFlowSettings {
        api_key: "sf-key".to_string(),
        model: String::new(),
        base_url: format!("{}/v1", url),
    });
    let buffer = ws.optimize_prompt(&prompt.id, &optimizer).await.unwrap();
    assert_eq!(buffer.optimized_content, "Optimized prompt");

    let saved = ws
        .save_prompt(&prompt.id, promptloom::workspace::BufferEdit::default())
        .unwrap();
    assert_eq!(saved.optimized_content.as_deref(), Some("Optimized prompt"));
    assert!(!ws.has_pending_edits(&prompt.id));
}
