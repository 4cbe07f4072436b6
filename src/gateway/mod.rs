//! Optimization gateway: rewrites drafts and suggests scenarios through a
//! hosted language model.
//!
//! Both providers sit behind [`Optimizer`]; [`optimizer_for`] picks one from
//! settings so call sites never branch on the provider name.

mod gemini;
mod openai_compat;
mod prompts;

pub use gemini::GeminiOptimizer;
pub use openai_compat::OpenAiCompatOptimizer;
pub use prompts::{ideas_request, optimize_request, PromptContext, IDEAS_SYSTEM, OPTIMIZER_SYSTEM};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{AiProvider, Settings};
use crate::entity::Role;
use crate::error::{PromptloomError, Result};

const TEMPERATURE: f32 = 0.7;

/// A single model call.
#[derive(Debug, Clone, Copy)]
pub struct Completion<'a> {
    pub system: &'a str,
    pub user: &'a str,
    /// Ask the provider for a JSON reply where it supports that natively
    pub json: bool,
}

/// A scenario proposed for a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioIdea {
    pub title: String,
    #[serde(default)]
    pub goal: String,
}

#[async_trait]
pub trait Optimizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Send one system + user exchange and return the model's text.
    async fn complete(&self, request: Completion<'_>) -> Result<String>;

    /// Rewrite `draft` for the given role and scenario.
    async fn optimize(&self, draft: &str, ctx: &PromptContext) -> Result<String> {
        if draft.trim().is_empty() {
            return Err(PromptloomError::InvalidInput(
                "nothing to optimize: the draft is empty".to_string(),
            ));
        }
        let user = optimize_request(draft, ctx);
        self.complete(Completion {
            system: OPTIMIZER_SYSTEM,
            user: &user,
            json: false,
        })
        .await
    }

    /// Three scenario ideas for `role`. Provider failures and unparsable
    /// replies yield an empty list.
    async fn suggest_scenarios(&self, role: &Role) -> Vec<ScenarioIdea> {
        let user = ideas_request(role);
        let reply = self
            .complete(Completion {
                system: IDEAS_SYSTEM,
                user: &user,
                json: true,
            })
            .await;

        match reply {
            Ok(text) => parse_ideas(&text),
            Err(e) => {
                tracing::warn!("[{}] Idea generation failed: {}", self.name(), e);
                Vec::new()
            }
        }
    }
}

/// Parse a JSON array of ideas, tolerating markdown code fences.
pub fn parse_ideas(text: &str) -> Vec<ScenarioIdea> {
    let cleaned = text.replace("```json", "").replace("```", "");
    match serde_json::from_str::<Vec<ScenarioIdea>>(cleaned.trim()) {
        Ok(ideas) => ideas,
        Err(e) => {
            tracing::warn!("Could not parse scenario ideas: {}", e);
            Vec::new()
        }
    }
}

/// The provider binding selected in settings.
pub fn optimizer_for(settings: &Settings) -> Box<dyn Optimizer> {
    match settings.ai_provider {
        AiProvider::Gemini => Box::new(GeminiOptimizer::new(&settings.gemini)),
        AiProvider::SiliconFlow => Box::new(OpenAiCompatOptimizer::new(&settings.silicon_flow)),
    }
}

fn missing_key(provider: &str) -> PromptloomError {
    PromptloomError::Provider(format!(
        "{} API key is missing. Configure it with 'promptloom config set'.",
        provider
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Scenario;
    use std::sync::Mutex;

    /// Replies with a canned answer and records what it was asked.
    struct Canned {
        reply: Result<String>,
        seen: Mutex<Vec<(String, bool)>>,
    }

    impl Canned {
        fn new(reply: Result<String>) -> Self {
            Self {
                reply,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Optimizer for Canned {
        fn name(&self) -> &'static str {
            "canned"
        }

        async fn complete(&self, request: Completion<'_>) -> Result<String> {
            self.seen
                .lock()
                .unwrap()
                .push((request.user.to_string(), request.json));
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(PromptloomError::Provider(e.to_string())),
            }
        }
    }

    fn context() -> PromptContext {
        let role = Role::new("Editor".to_string(), String::new());
        let scenario = Scenario::new(role.id.clone(), "Blog".to_string(), String::new());
        PromptContext::new(&role, &scenario)
    }

    #[tokio::test]
    async fn test_optimize_rejects_empty_draft() {
        let optimizer = Canned::new(Ok("x".to_string()));
        let result = optimizer.optimize("   ", &context()).await;

        assert!(matches!(result, Err(PromptloomError::InvalidInput(_))));
        assert!(optimizer.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_optimize_sends_template() {
        let optimizer = Canned::new(Ok("better".to_string()));
        let result = optimizer.optimize("draft", &context()).await.unwrap();

        assert_eq!(result, "better");
        let seen = optimizer.seen.lock().unwrap();
        assert!(seen[0].0.contains("DRAFT PROMPT"));
        assert!(!seen[0].1);
    }

    #[tokio::test]
    async fn test_suggest_scenarios_strips_fences() {
        let reply = "```json\n[{\"title\": \"Outline\", \"goal\": \"Plan a post\"}]\n```";
        let optimizer = Canned::new(Ok(reply.to_string()));
        let role = Role::new("Editor".to_string(), String::new());

        let ideas = optimizer.suggest_scenarios(&role).await;
        assert_eq!(
            ideas,
            vec![ScenarioIdea {
                title: "Outline".to_string(),
                goal: "Plan a post".to_string()
            }]
        );
        assert!(optimizer.seen.lock().unwrap()[0].1);
    }

    #[tokio::test]
    async fn test_suggest_scenarios_is_lenient() {
        let role = Role::new("Editor".to_string(), String::new());

        let garbage = Canned::new(Ok("Sure! Here are some ideas...".to_string()));
        assert!(garbage.suggest_scenarios(&role).await.is_empty());

        let failing = Canned::new(Err(PromptloomError::Provider("down".to_string())));
        assert!(failing.suggest_scenarios(&role).await.is_empty());
    }

    #[test]
    fn test_optimizer_for_follows_settings() {
        let mut settings = Settings::default();
        assert_eq!(optimizer_for(&settings).name(), "gemini");

        settings.ai_provider = AiProvider::SiliconFlow;
        assert_eq!(optimizer_for(&settings).name(), "siliconflow");
    }
}
