//! Fixed instruction text sent to the language model.

use crate::entity::{Role, Scenario};

pub const OPTIMIZER_SYSTEM: &str = "You are an expert Prompt Engineer specializing in LLM optimization. \
Your goal is to rewrite user drafts into high-performance, structured prompts using best practices \
(Chain of Thought, clear delimiters, persona adoption).";

pub const IDEAS_SYSTEM: &str = "You are a creative assistant. Respond in JSON only.";

/// The role and scenario a draft is written for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    pub role_name: String,
    pub role_description: String,
    pub scenario_title: String,
    pub scenario_goal: String,
}

impl PromptContext {
    pub fn new(role: &Role, scenario: &Scenario) -> Self {
        Self {
            role_name: role.name.clone(),
            role_description: role.description.clone(),
            scenario_title: scenario.title.clone(),
            scenario_goal: scenario.goal.clone(),
        }
    }
}

pub fn optimize_request(draft: &str, ctx: &PromptContext) -> String {
    format!(
        "I need you to optimize a prompt for an LLM.\n\
         \n\
         CONTEXT INFORMATION:\n\
         - Target Persona (Role): {} ({})\n\
         - Specific Scenario: {} ({})\n\
         \n\
         DRAFT PROMPT:\n\
         \"{}\"\n\
         \n\
         INSTRUCTIONS:\n\
         1. Analyze the draft against the persona and scenario.\n\
         2. Rewrite the prompt to be more effective, precise, and robust.\n\
         3. Maintain the original intent but improve clarity and structure.\n\
         4. Return ONLY the optimized prompt text. Do not add conversational filler.\n",
        ctx.role_name, ctx.role_description, ctx.scenario_title, ctx.scenario_goal, draft
    )
}

pub fn ideas_request(role: &Role) -> String {
    format!(
        "Based on the persona \"{}\" ({}), suggest 3 distinct, useful scenarios where an AI could assist. \
         Return the result as a JSON array of objects with 'title' and 'goal' keys. \
         Do not include markdown formatting like ```json.",
        role.name, role.description
    )
}
