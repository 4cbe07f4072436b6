mod commands;
mod handlers;

pub use commands::{
    ArticleAction, ArticleCommand, AuthAction, AuthCommand, Cli, Commands, ConfigAction,
    ConfigCommand, PromptAction, PromptCommand, PromptFields, RoleAction, RoleCommand,
    ScenarioAction, ScenarioCommand,
};
pub use handlers::{
    handle_article_add, handle_article_delete, handle_article_list, handle_article_show,
    handle_article_update, handle_auth_signin, handle_auth_signout, handle_auth_signup,
    handle_auth_status, handle_config_set, handle_config_show, handle_init, handle_prompt_delete,
    handle_prompt_edit, handle_prompt_history, handle_prompt_list, handle_prompt_new,
    handle_prompt_optimize, handle_prompt_restore, handle_prompt_save, handle_prompt_show,
    handle_pull, handle_restore, handle_role_add, handle_role_delete, handle_role_list,
    handle_scenario_add, handle_scenario_delete, handle_scenario_list, handle_scenario_suggest,
    handle_search, handle_sync,
};
