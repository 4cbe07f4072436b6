use std::env;
use std::io::{self, Read, Write};

use chrono::DateTime;
use serde::Serialize;

use crate::entity::{Article, Prompt, Role, Scenario, Timestamp};
use crate::error::{PromptloomError, Result};
use crate::gateway::optimizer_for;
use crate::search::{search, SearchCache};
use crate::storage::{find_workspace_root, EntityStore};
use crate::sync::{Choice, SyncOutcome, SyncStatus};
use crate::versioning::EditBuffer;
use crate::workspace::{BufferEdit, Workspace};

use super::commands::PromptFields;

async fn open_workspace() -> Result<Workspace> {
    Workspace::open(&find_workspace_root()).await
}

/// Read-only commands skip the backend and session entirely.
fn open_store() -> Result<EntityStore> {
    EntityStore::open(&find_workspace_root())
}

/// Wait for background pushes and surface a failed one.
async fn finish(ws: &Workspace) {
    ws.sync().flush().await;
    if let SyncStatus::Error(msg) = ws.sync().status().current() {
        eprintln!("Warning: cloud sync failed: {}", msg);
    }
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn format_time(millis: Timestamp) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_stdin() -> Result<String> {
    let mut content = String::new();
    io::stdin().read_to_string(&mut content)?;
    Ok(content)
}

/// Ask a yes/no question on a terminal. Without a terminal the caller must
/// pass `flag` instead.
fn confirm(question: &str, flag: &str) -> Result<bool> {
    if !atty::is(atty::Stream::Stdin) {
        return Err(PromptloomError::InvalidInput(format!(
            "Use {} to confirm in non-interactive mode",
            flag
        )));
    }
    eprint!("{} [y/N] ", question);
    io::stderr().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

pub fn handle_init() -> Result<()> {
    let root = env::current_dir()?;
    let store = Workspace::init(&root)?;
    println!("Initialized promptloom workspace in {}", store.dir().display());
    Ok(())
}

// Roles

pub async fn handle_role_add(
    name: String,
    description: String,
    icon: Option<String>,
    color: Option<String>,
    json: bool,
) -> Result<()> {
    let mut ws = open_workspace().await?;
    let role = ws.create_role(&name, &description, icon, color)?;
    finish(&ws).await;

    if json {
        print_json(&role)
    } else {
        println!("Created role ({}) {} {}", short(&role.id), role.icon, role.name);
        Ok(())
    }
}

pub fn handle_role_list(json: bool) -> Result<()> {
    let store = open_store()?;
    let roles = store.roles();

    if json {
        return print_json(roles);
    }
    if roles.is_empty() {
        println!("No roles found.");
        return Ok(());
    }
    println!("Roles:\n");
    for role in roles {
        let scenarios = store.scenarios_for_role(&role.id).len();
        println!(
            "  ({}) {} {} [{} scenarios]",
            short(&role.id),
            role.icon,
            role.name,
            scenarios
        );
        if !role.description.is_empty() {
            println!("      {}", first_line(&role.description));
        }
    }
    Ok(())
}

pub async fn handle_role_delete(id: String, force: bool) -> Result<()> {
    let mut ws = open_workspace().await?;
    let role = ws.store().resolve::<Role>(&id)?.clone();

    if !force {
        let scenarios = ws.store().scenarios_for_role(&role.id);
        let prompts: usize = scenarios
            .iter()
            .map(|s| ws.store().prompts_for_scenario(&s.id).len())
            .sum();
        let question = format!(
            "Delete role ({}) {} with {} scenarios and {} prompts?",
            short(&role.id),
            role.name,
            scenarios.len(),
            prompts
        );
        if !confirm(&question, "--force")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    ws.delete_role(&role.id)?;
    finish(&ws).await;
    println!("Deleted role ({}) {}", short(&role.id), role.name);
    Ok(())
}

// Scenarios

pub async fn handle_scenario_add(role: String, title: String, goal: String, json: bool) -> Result<()> {
    let mut ws = open_workspace().await?;
    let scenario = ws.create_scenario(&role, &title, &goal)?;
    finish(&ws).await;

    if json {
        print_json(&scenario)
    } else {
        println!("Created scenario ({}) {}", short(&scenario.id), scenario.title);
        Ok(())
    }
}

pub fn handle_scenario_list(role: Option<String>, json: bool) -> Result<()> {
    let store = open_store()?;
    let scenarios: Vec<&Scenario> = match role {
        Some(role) => {
            let role_id = store.resolve::<Role>(&role)?.id.clone();
            store.scenarios_for_role(&role_id)
        }
        None => store.list::<Scenario>().iter().collect(),
    };

    if json {
        return print_json(&scenarios);
    }
    if scenarios.is_empty() {
        println!("No scenarios found.");
        return Ok(());
    }
    println!("Scenarios:\n");
    for scenario in scenarios {
        let role_name = store
            .get::<Role>(&scenario.role_id)
            .map(|r| r.name.as_str())
            .unwrap_or("?");
        println!(
            "  ({}) [{}] {} [{} prompts]",
            short(&scenario.id),
            role_name,
            scenario.title,
            store.prompts_for_scenario(&scenario.id).len()
        );
        if !scenario.goal.is_empty() {
            println!("      {}", first_line(&scenario.goal));
        }
    }
    Ok(())
}

pub async fn handle_scenario_delete(id: String, force: bool) -> Result<()> {
    let mut ws = open_workspace().await?;
    let scenario = ws.store().resolve::<Scenario>(&id)?.clone();

    if !force {
        let question = format!(
            "Delete scenario ({}) {} with {} prompts?",
            short(&scenario.id),
            scenario.title,
            ws.store().prompts_for_scenario(&scenario.id).len()
        );
        if !confirm(&question, "--force")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    ws.delete_scenario(&scenario.id)?;
    finish(&ws).await;
    println!("Deleted scenario ({}) {}", short(&scenario.id), scenario.title);
    Ok(())
}

pub async fn handle_scenario_suggest(role: String, create: bool, json: bool) -> Result<()> {
    let mut ws = open_workspace().await?;
    let optimizer = optimizer_for(ws.settings());
    let ideas = ws.suggest_scenarios(&role, optimizer.as_ref()).await?;

    if create {
        for idea in &ideas {
            ws.create_scenario(&role, &idea.title, &idea.goal)?;
        }
        finish(&ws).await;
    }

    if json {
        return print_json(&ideas);
    }
    if ideas.is_empty() {
        println!("No suggestions.");
        return Ok(());
    }
    let verb = if create { "Created" } else { "Suggested" };
    println!("{} scenarios:\n", verb);
    for idea in &ideas {
        println!("  {}", idea.title);
        if !idea.goal.is_empty() {
            println!("      {}", idea.goal);
        }
    }
    Ok(())
}

// Prompts

pub async fn handle_prompt_new(scenario: String, title: Option<String>, tags: Vec<String>, json: bool) -> Result<()> {
    let mut ws = open_workspace().await?;
    let prompt = ws.create_prompt(&scenario, title, tags)?;
    finish(&ws).await;

    if json {
        print_json(&prompt)
    } else {
        println!(
            "Created prompt ({}) v{} - {}",
            short(&prompt.id),
            prompt.version,
            prompt.title
        );
        Ok(())
    }
}

pub fn handle_prompt_list(scenario: Option<String>, json: bool) -> Result<()> {
    let store = open_store()?;
    let prompts: Vec<&Prompt> = match scenario {
        Some(scenario) => {
            let scenario_id = store.resolve::<Scenario>(&scenario)?.id.clone();
            store.prompts_for_scenario(&scenario_id)
        }
        None => store.list::<Prompt>().iter().collect(),
    };

    if json {
        return print_json(&prompts);
    }
    if prompts.is_empty() {
        println!("No prompts found.");
        return Ok(());
    }
    println!("Prompts:\n");
    for prompt in prompts {
        println!(
            "  ({}) v{} {} (updated {})",
            short(&prompt.id),
            prompt.version,
            prompt.title,
            format_time(prompt.updated_at)
        );
        if !prompt.tags.is_empty() {
            println!("      tags: {}", prompt.tags.join(", "));
        }
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PromptView<'a> {
    #[serde(flatten)]
    prompt: &'a Prompt,
    pending_edits: Option<EditBuffer>,
}

pub async fn handle_prompt_show(id: String, json: bool) -> Result<()> {
    let ws = open_workspace().await?;
    let prompt = ws.store().resolve::<Prompt>(&id)?;
    let pending = ws
        .has_pending_edits(&prompt.id)
        .then(|| ws.buffer(&prompt.id))
        .transpose()?;

    if json {
        return print_json(&PromptView {
            prompt,
            pending_edits: pending,
        });
    }

    println!("{} ({})", prompt.title, prompt.id);
    println!("version: {}", prompt.version);
    if !prompt.tags.is_empty() {
        println!("tags: {}", prompt.tags.join(", "));
    }
    println!("updated: {}", format_time(prompt.updated_at));
    println!("\n--- draft ---\n{}", prompt.content);
    if let Some(optimized) = &prompt.optimized_content {
        println!("\n--- optimized ---\n{}", optimized);
    }
    if let Some(buffer) = pending {
        println!("\n*** unsaved edits ***");
        if buffer.title != prompt.title {
            println!("title: {}", buffer.title);
        }
        println!("--- draft ---\n{}", buffer.content);
        if !buffer.optimized_content.is_empty() {
            println!("--- optimized ---\n{}", buffer.optimized_content);
        }
        println!("\nRun 'promptloom prompt save {}' to commit them.", short(&prompt.id));
    }
    Ok(())
}

fn buffer_edit(fields: PromptFields) -> Result<BufferEdit> {
    let content = if fields.stdin {
        Some(read_stdin()?)
    } else {
        fields.content
    };
    Ok(BufferEdit {
        title: fields.title,
        content,
        optimized_content: fields.optimized,
    })
}

pub async fn handle_prompt_edit(id: String, fields: PromptFields, discard: bool) -> Result<()> {
    let mut ws = open_workspace().await?;

    if discard {
        if ws.discard_edits(&id)? {
            println!("Discarded pending edits.");
        } else {
            println!("No pending edits.");
        }
        return Ok(());
    }

    let edit = buffer_edit(fields)?;
    if edit.is_empty() {
        return Err(PromptloomError::InvalidInput(
            "nothing to edit: pass --title, --content, --optimized or --stdin".to_string(),
        ));
    }
    let buffer = ws.edit_prompt(&id, edit)?;
    println!("Buffered edits for '{}' (unsaved).", buffer.title);
    Ok(())
}

pub async fn handle_prompt_save(id: String, fields: PromptFields, json: bool) -> Result<()> {
    let mut ws = open_workspace().await?;
    let edit = buffer_edit(fields)?;
    let prompt = ws.save_prompt(&id, edit)?;
    finish(&ws).await;

    if json {
        print_json(&prompt)
    } else {
        println!(
            "Saved prompt ({}) v{} - {}",
            short(&prompt.id),
            prompt.version,
            prompt.title
        );
        Ok(())
    }
}

pub fn handle_prompt_history(id: String, json: bool) -> Result<()> {
    let store = open_store()?;
    let prompt = store.resolve::<Prompt>(&id)?;

    if json {
        return print_json(&prompt.history);
    }
    println!("{} (current v{})\n", prompt.title, prompt.version);
    if prompt.history.is_empty() {
        println!("  No earlier versions.");
        return Ok(());
    }
    for entry in prompt.history.iter().rev() {
        let marker = if entry.optimized_content.is_some() { " [optimized]" } else { "" };
        println!(
            "  v{}  {}{}  {}",
            entry.version,
            format_time(entry.timestamp),
            marker,
            first_line(&entry.content)
        );
    }
    Ok(())
}

pub async fn handle_prompt_restore(id: String, version: u32) -> Result<()> {
    let mut ws = open_workspace().await?;
    ws.restore_version(&id, version)?;
    println!(
        "Restored v{} into the edit buffer. Run 'promptloom prompt save {}' to make it current.",
        version, id
    );
    Ok(())
}

pub async fn handle_prompt_optimize(id: String, save: bool) -> Result<()> {
    let mut ws = open_workspace().await?;
    let optimizer = optimizer_for(ws.settings());
    eprintln!("Optimizing with {}...", optimizer.name());
    let buffer = ws.optimize_prompt(&id, optimizer.as_ref()).await?;

    println!("{}", buffer.optimized_content);
    if save {
        let prompt = ws.save_prompt(&id, BufferEdit::default())?;
        finish(&ws).await;
        eprintln!("Saved prompt ({}) v{}", short(&prompt.id), prompt.version);
    }
    Ok(())
}

pub async fn handle_prompt_delete(id: String, force: bool) -> Result<()> {
    let mut ws = open_workspace().await?;
    let prompt = ws.store().resolve::<Prompt>(&id)?.clone();

    if !force {
        let question = format!("Delete prompt ({}) {}?", short(&prompt.id), prompt.title);
        if !confirm(&question, "--force")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    ws.delete_prompt(&prompt.id)?;
    finish(&ws).await;
    println!("Deleted prompt ({}) {}", short(&prompt.id), prompt.title);
    Ok(())
}

// Articles

pub async fn handle_article_add(title: String, content: String, stdin: bool, json: bool) -> Result<()> {
    let content = if stdin { read_stdin()? } else { content };
    let mut ws = open_workspace().await?;
    let article = ws.create_article(&title, &content)?;
    finish(&ws).await;

    if json {
        print_json(&article)
    } else {
        println!("Created article ({}) {}", short(&article.id), article.title);
        Ok(())
    }
}

pub fn handle_article_list(json: bool) -> Result<()> {
    let store = open_store()?;
    let articles = store.articles();

    if json {
        return print_json(articles);
    }
    if articles.is_empty() {
        println!("No articles found.");
        return Ok(());
    }
    println!("Articles:\n");
    for article in articles {
        println!(
            "  ({}) {} (updated {})",
            short(&article.id),
            article.title,
            format_time(article.updated_at)
        );
    }
    Ok(())
}

pub fn handle_article_show(id: String, json: bool) -> Result<()> {
    let store = open_store()?;
    let article = store.resolve::<Article>(&id)?;

    if json {
        return print_json(article);
    }
    println!("{} ({})", article.title, article.id);
    println!("updated: {}\n", format_time(article.updated_at));
    println!("{}", article.content);
    Ok(())
}

pub async fn handle_article_update(
    id: String,
    title: Option<String>,
    content: Option<String>,
    stdin: bool,
) -> Result<()> {
    let content = if stdin { Some(read_stdin()?) } else { content };
    if title.is_none() && content.is_none() {
        return Err(PromptloomError::InvalidInput(
            "nothing to update: pass --title, --content or --stdin".to_string(),
        ));
    }

    let mut ws = open_workspace().await?;
    let article = ws.update_article(&id, title, content)?;
    finish(&ws).await;
    println!("Updated article ({}) {}", short(&article.id), article.title);
    Ok(())
}

pub async fn handle_article_delete(id: String, force: bool) -> Result<()> {
    let mut ws = open_workspace().await?;
    let article = ws.store().resolve::<Article>(&id)?.clone();

    if !force {
        let question = format!("Delete article ({}) {}?", short(&article.id), article.title);
        if !confirm(&question, "--force")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    ws.delete_article(&article.id)?;
    finish(&ws).await;
    println!("Deleted article ({}) {}", short(&article.id), article.title);
    Ok(())
}

// Search

/// Render `**match**` markers as bold on a terminal, plain otherwise.
fn render_snippet(snippet: &str) -> String {
    if !atty::is(atty::Stream::Stdout) {
        return snippet.replace("**", "");
    }
    let mut out = String::new();
    for (i, part) in snippet.split("**").enumerate() {
        if i > 0 {
            out.push_str(if i % 2 == 1 { "\x1b[1m" } else { "\x1b[0m" });
        }
        out.push_str(part);
    }
    out
}

pub fn handle_search(query: String, json: bool) -> Result<()> {
    let store = open_store()?;
    let mut cache = SearchCache::open(store.dir())?;
    let hits = search(store.snapshot(), &mut cache, &query)?;

    if json {
        #[derive(Serialize)]
        struct SearchResultJson {
            kind: String,
            id: String,
            title: String,
            snippet: Option<String>,
        }

        let json_results: Vec<SearchResultJson> = hits
            .into_iter()
            .map(|h| SearchResultJson {
                kind: h.kind.to_string(),
                id: h.id,
                title: h.title,
                snippet: h.snippet,
            })
            .collect();
        return print_json(&json_results);
    }

    if hits.is_empty() {
        println!("No results found for '{}'.", query);
        return Ok(());
    }
    println!("Search results for '{}':\n", query);
    for hit in hits {
        println!("  ({}) [{}] {}", short(&hit.id), hit.kind, hit.title);
        if let Some(snippet) = hit.snippet {
            println!("      {}", render_snippet(&snippet));
        }
    }
    Ok(())
}

// Account and sync

fn read_password(password: Option<String>) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    if atty::is(atty::Stream::Stdin) {
        eprint!("Password: ");
        io::stderr().flush()?;
    }
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let password = input.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        return Err(PromptloomError::InvalidInput("password is empty".to_string()));
    }
    Ok(password)
}

fn describe(outcome: &SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Downloaded(summary) => format!("Downloaded {} from the cloud.", summary),
        SyncOutcome::Uploaded(summary) => format!("Uploaded {} to the cloud.", summary),
        SyncOutcome::Unchanged => "Cloud is empty; local data kept.".to_string(),
        SyncOutcome::Cancelled => "Cancelled.".to_string(),
    }
}

pub async fn handle_auth_signup(email: String, username: String, password: Option<String>) -> Result<()> {
    let password = read_password(password)?;
    let mut ws = open_workspace().await?;
    let (outcome, pulled) = ws.sign_up(&email, &password, &username).await?;

    match pulled {
        Some(pulled) => {
            println!("Signed up and signed in as {}.", outcome.user.display_name());
            report_pull(pulled);
        }
        None => println!(
            "Signed up as {}. Confirm your email, then run 'promptloom auth signin {}'.",
            outcome.user.display_name(),
            email
        ),
    }
    Ok(())
}

pub async fn handle_auth_signin(email: String, password: Option<String>) -> Result<()> {
    let password = read_password(password)?;
    let mut ws = open_workspace().await?;
    let (session, pulled) = ws.sign_in(&email, &password).await?;
    println!("Signed in as {}.", session.user.display_name());
    report_pull(pulled);
    Ok(())
}

/// The login pull is advisory: a failure is a warning, not an exit code.
fn report_pull(pulled: Result<SyncOutcome>) {
    match pulled {
        Ok(sync) => println!("{}", describe(&sync)),
        Err(e) => eprintln!("Warning: signed in, but pulling cloud data failed: {}", e),
    }
}

pub async fn handle_auth_signout(force: bool) -> Result<()> {
    let mut ws = open_workspace().await?;
    if ws.session().is_none() {
        println!("Not signed in.");
        return Ok(());
    }

    if !force && !confirm("Sign out and remove local data from this workspace?", "--force")? {
        println!("Cancelled.");
        return Ok(());
    }

    ws.sign_out().await?;
    println!("Signed out.");
    Ok(())
}

pub async fn handle_auth_status(json: bool) -> Result<()> {
    let ws = open_workspace().await?;
    let session = ws.session();

    if json {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct StatusJson {
            signed_in: bool,
            backend_configured: bool,
            user: Option<crate::remote::AuthUser>,
            expires_at: Option<i64>,
        }
        return print_json(&StatusJson {
            signed_in: session.is_some(),
            backend_configured: ws.sync().mirror().is_configured(),
            expires_at: session.as_ref().and_then(|s| s.expires_at),
            user: session.map(|s| s.user),
        });
    }

    if !ws.sync().mirror().is_configured() {
        println!("Cloud backend not configured. Set backend.url and backend.anonKey.");
    }
    match session {
        Some(session) => println!(
            "Signed in as {} <{}>",
            session.user.display_name(),
            session.user.email
        ),
        None => println!("Not signed in."),
    }
    Ok(())
}

pub async fn handle_pull() -> Result<()> {
    let mut ws = open_workspace().await?;
    let outcome = ws.pull().await?;
    println!("{}", describe(&outcome));
    Ok(())
}

fn ask_choice(summary: &crate::entity::SnapshotSummary) -> Choice {
    eprintln!("The cloud already holds {}.", summary);
    loop {
        eprint!("[r] replace local data with the cloud, [p] overwrite the cloud with local data: ");
        let _ = io::stderr().flush();
        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            // Closed input keeps the cloud copy.
            Ok(0) | Err(_) => return Choice::AcceptRemote,
            Ok(_) => match input.trim().to_lowercase().as_str() {
                "r" => return Choice::AcceptRemote,
                "p" => return Choice::PushLocal,
                _ => continue,
            },
        }
    }
}

pub async fn handle_sync(accept_remote: bool, push_local: bool) -> Result<()> {
    let interactive = atty::is(atty::Stream::Stdin);
    if !accept_remote && !push_local && !interactive {
        return Err(PromptloomError::InvalidInput(
            "Use --accept-remote or --push-local in non-interactive mode".to_string(),
        ));
    }

    let mut ws = open_workspace().await?;
    let outcome = ws
        .manual_sync(|summary| {
            if accept_remote {
                Choice::AcceptRemote
            } else if push_local {
                Choice::PushLocal
            } else {
                ask_choice(summary)
            }
        })
        .await?;
    println!("{}", describe(&outcome));
    Ok(())
}

pub async fn handle_restore(yes: bool) -> Result<()> {
    if !yes && !atty::is(atty::Stream::Stdin) {
        return Err(PromptloomError::InvalidInput(
            "Use --yes to confirm in non-interactive mode".to_string(),
        ));
    }

    let mut ws = open_workspace().await?;
    let outcome = ws
        .restore_from_cloud(|summary| {
            yes || confirm(
                &format!("Replace all local data with the cloud copy ({})?", summary),
                "--yes",
            )
            .unwrap_or(false)
        })
        .await?;
    println!("{}", describe(&outcome));
    Ok(())
}

pub fn handle_config_show() -> Result<()> {
    let store = open_store()?;
    let settings = crate::config::Settings::load(store.dir());
    print_json(&settings.masked())
}

pub async fn handle_config_set(key: String, value: String) -> Result<()> {
    let mut ws = open_workspace().await?;
    ws.set_setting(&key, &value)?;
    println!("Set {}.", key);
    Ok(())
}
