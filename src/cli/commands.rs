use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "promptloom")]
#[command(version, about = "A local-first prompt engineering workspace with cloud sync")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new promptloom workspace in the current directory
    Init,

    /// Manage roles
    Role(RoleCommand),

    /// Manage scenarios
    Scenario(ScenarioCommand),

    /// Manage prompts and their versions
    Prompt(PromptCommand),

    /// Manage articles
    Article(ArticleCommand),

    /// Search prompts, articles, roles and scenarios
    Search {
        /// Query text; supports type:, tag:, scenario:, role:, created:> and created:< filters
        query: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Sign up, sign in and out
    Auth(AuthCommand),

    /// Pull the cloud snapshot, replacing local data when the cloud has any
    Pull,

    /// Reconcile local data with the cloud
    Sync {
        /// Replace local data with the cloud snapshot without asking
        #[arg(long, conflicts_with = "push_local")]
        accept_remote: bool,

        /// Overwrite the cloud with local data without asking
        #[arg(long, conflicts_with = "accept_remote")]
        push_local: bool,
    },

    /// Replace local data with the cloud snapshot
    Restore {
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Show or change settings
    Config(ConfigCommand),
}

#[derive(Args, Debug)]
pub struct RoleCommand {
    #[command(subcommand)]
    pub action: RoleAction,
}

#[derive(Subcommand, Debug)]
pub enum RoleAction {
    /// Add a new role
    Add {
        /// Role name
        name: String,

        /// What the role does
        #[arg(long, short = 'd', default_value = "")]
        description: String,

        /// Display icon, usually an emoji
        #[arg(long)]
        icon: Option<String>,

        /// Display color token
        #[arg(long)]
        color: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List roles
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a role with its scenarios and prompts
    Delete {
        /// Role id or unique id prefix
        id: String,

        /// Skip the confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },
}

#[derive(Args, Debug)]
pub struct ScenarioCommand {
    #[command(subcommand)]
    pub action: ScenarioAction,
}

#[derive(Subcommand, Debug)]
pub enum ScenarioAction {
    /// Add a scenario under a role
    Add {
        /// Owning role id or prefix
        role: String,

        /// Scenario title
        title: String,

        /// What the scenario is for
        #[arg(long, short = 'g', default_value = "")]
        goal: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List scenarios, optionally for one role
    List {
        /// Only scenarios of this role
        #[arg(long)]
        role: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a scenario and its prompts
    Delete {
        /// Scenario id or unique id prefix
        id: String,

        /// Skip the confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Ask the AI provider for scenario ideas for a role
    Suggest {
        /// Role id or prefix
        role: String,

        /// Create every suggested scenario
        #[arg(long)]
        create: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct PromptCommand {
    #[command(subcommand)]
    pub action: PromptAction,
}

#[derive(Subcommand, Debug)]
pub enum PromptAction {
    /// Create a prompt under a scenario
    New {
        /// Scenario id or prefix
        scenario: String,

        /// Prompt title
        #[arg(long)]
        title: Option<String>,

        /// Tags (can be specified multiple times)
        #[arg(long = "tag", short = 't')]
        tags: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List prompts, optionally for one scenario
    List {
        /// Only prompts of this scenario
        #[arg(long)]
        scenario: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a prompt and any pending edits
    Show {
        /// Prompt id or prefix
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write unsaved edits into the prompt's buffer
    Edit {
        /// Prompt id or prefix
        id: String,

        #[command(flatten)]
        fields: PromptFields,

        /// Drop pending edits instead
        #[arg(long, conflicts_with_all = ["title", "content", "optimized", "stdin"])]
        discard: bool,
    },

    /// Save the buffer (plus any given fields) as a new version
    Save {
        /// Prompt id or prefix
        id: String,

        #[command(flatten)]
        fields: PromptFields,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version history
    History {
        /// Prompt id or prefix
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Copy an old version into the edit buffer
    Restore {
        /// Prompt id or prefix
        id: String,

        /// Version number from history
        #[arg(id = "version_number", value_name = "VERSION")]
        version: u32,
    },

    /// Optimize the draft with the configured AI provider
    Optimize {
        /// Prompt id or prefix
        id: String,

        /// Save a new version right after optimizing
        #[arg(long)]
        save: bool,
    },

    /// Delete a prompt
    Delete {
        /// Prompt id or prefix
        id: String,

        /// Skip the confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },
}

/// Prompt fields settable from the command line.
#[derive(Args, Debug, Default)]
pub struct PromptFields {
    /// New title
    #[arg(long)]
    pub title: Option<String>,

    /// New draft content
    #[arg(long, short = 'c')]
    pub content: Option<String>,

    /// New optimized content
    #[arg(long)]
    pub optimized: Option<String>,

    /// Read draft content from stdin
    #[arg(long, conflicts_with = "content")]
    pub stdin: bool,
}

#[derive(Args, Debug)]
pub struct ArticleCommand {
    #[command(subcommand)]
    pub action: ArticleAction,
}

#[derive(Subcommand, Debug)]
pub enum ArticleAction {
    /// Add a new article
    Add {
        /// Article title
        title: String,

        /// Article body
        #[arg(long, short = 'c', default_value = "")]
        content: String,

        /// Read the body from stdin
        #[arg(long)]
        stdin: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List articles
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one article
    Show {
        /// Article id or prefix
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change an article's title or body
    Update {
        /// Article id or prefix
        id: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New body
        #[arg(long, short = 'c')]
        content: Option<String>,

        /// Read the new body from stdin
        #[arg(long, conflicts_with = "content")]
        stdin: bool,
    },

    /// Delete an article
    Delete {
        /// Article id or prefix
        id: String,

        /// Skip the confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },
}

#[derive(Args, Debug)]
pub struct AuthCommand {
    #[command(subcommand)]
    pub action: AuthAction,
}

#[derive(Subcommand, Debug)]
pub enum AuthAction {
    /// Create an account
    Signup {
        email: String,

        /// Display name
        #[arg(long, short = 'u', default_value = "")]
        username: String,

        /// Password; read from stdin when omitted
        #[arg(long, env = "PROMPTLOOM_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Sign in and pull the cloud snapshot
    Signin {
        email: String,

        /// Password; read from stdin when omitted
        #[arg(long, env = "PROMPTLOOM_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Sign out and clear local data
    Signout {
        /// Skip the confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Show the signed-in account
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show effective settings with API keys masked
    Show,

    /// Set one setting by dotted key (e.g. gemini.apiKey, backend.url)
    Set { key: String, value: String },
}
