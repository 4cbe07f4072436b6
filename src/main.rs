use clap::Parser;
use promptloom::cli::{
    handle_article_add, handle_article_delete, handle_article_list, handle_article_show,
    handle_article_update, handle_auth_signin, handle_auth_signout, handle_auth_signup,
    handle_auth_status, handle_config_set, handle_config_show, handle_init, handle_prompt_delete,
    handle_prompt_edit, handle_prompt_history, handle_prompt_list, handle_prompt_new,
    handle_prompt_optimize, handle_prompt_restore, handle_prompt_save, handle_prompt_show,
    handle_pull, handle_restore, handle_role_add, handle_role_delete, handle_role_list,
    handle_scenario_add, handle_scenario_delete, handle_scenario_list, handle_scenario_suggest,
    handle_search, handle_sync, ArticleAction, AuthAction, Cli, Commands, ConfigAction,
    PromptAction, RoleAction, ScenarioAction,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // stdout carries command output (including --json); logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => handle_init(),
        Commands::Role(role) => match role.action {
            RoleAction::Add {
                name,
                description,
                icon,
                color,
                json,
            } => handle_role_add(name, description, icon, color, json).await,
            RoleAction::List { json } => handle_role_list(json),
            RoleAction::Delete { id, force } => handle_role_delete(id, force).await,
        },
        Commands::Scenario(scenario) => match scenario.action {
            ScenarioAction::Add {
                role,
                title,
                goal,
                json,
            } => handle_scenario_add(role, title, goal, json).await,
            ScenarioAction::List { role, json } => handle_scenario_list(role, json),
            ScenarioAction::Delete { id, force } => handle_scenario_delete(id, force).await,
            ScenarioAction::Suggest { role, create, json } => {
                handle_scenario_suggest(role, create, json).await
            }
        },
        Commands::Prompt(prompt) => match prompt.action {
            PromptAction::New {
                scenario,
                title,
                tags,
                json,
            } => handle_prompt_new(scenario, title, tags, json).await,
            PromptAction::List { scenario, json } => handle_prompt_list(scenario, json),
            PromptAction::Show { id, json } => handle_prompt_show(id, json).await,
            PromptAction::Edit {
                id,
                fields,
                discard,
            } => handle_prompt_edit(id, fields, discard).await,
            PromptAction::Save { id, fields, json } => handle_prompt_save(id, fields, json).await,
            PromptAction::History { id, json } => handle_prompt_history(id, json),
            PromptAction::Restore { id, version } => handle_prompt_restore(id, version).await,
            PromptAction::Optimize { id, save } => handle_prompt_optimize(id, save).await,
            PromptAction::Delete { id, force } => handle_prompt_delete(id, force).await,
        },
        Commands::Article(article) => match article.action {
            ArticleAction::Add {
                title,
                content,
                stdin,
                json,
            } => handle_article_add(title, content, stdin, json).await,
            ArticleAction::List { json } => handle_article_list(json),
            ArticleAction::Show { id, json } => handle_article_show(id, json),
            ArticleAction::Update {
                id,
                title,
                content,
                stdin,
            } => handle_article_update(id, title, content, stdin).await,
            ArticleAction::Delete { id, force } => handle_article_delete(id, force).await,
        },
        Commands::Search { query, json } => handle_search(query, json),
        Commands::Auth(auth) => match auth.action {
            AuthAction::Signup {
                email,
                username,
                password,
            } => handle_auth_signup(email, username, password).await,
            AuthAction::Signin { email, password } => handle_auth_signin(email, password).await,
            AuthAction::Signout { force } => handle_auth_signout(force).await,
            AuthAction::Status { json } => handle_auth_status(json).await,
        },
        Commands::Pull => handle_pull().await,
        Commands::Sync {
            accept_remote,
            push_local,
        } => handle_sync(accept_remote, push_local).await,
        Commands::Restore { yes } => handle_restore(yes).await,
        Commands::Config(config) => match config.action {
            ConfigAction::Show => handle_config_show(),
            ConfigAction::Set { key, value } => handle_config_set(key, value).await,
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
