use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{missing_key, Completion, Optimizer, TEMPERATURE};
use crate::config::{SiliconFlowSettings, DEFAULT_SILICONFLOW_BASE_URL, DEFAULT_SILICONFLOW_MODEL};
use crate::error::{PromptloomError, Result};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

/// Any `/chat/completions` endpoint; SiliconFlow by default.
pub struct OpenAiCompatOptimizer {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiCompatOptimizer {
    pub fn new(settings: &SiliconFlowSettings) -> Self {
        let or_default = |value: &str, default: &str| {
            if value.trim().is_empty() {
                default.to_string()
            } else {
                value.trim_end_matches('/').to_string()
            }
        };
        Self {
            api_key: settings.api_key.clone(),
            model: or_default(&settings.model, DEFAULT_SILICONFLOW_MODEL),
            base_url: or_default(&settings.base_url, DEFAULT_SILICONFLOW_BASE_URL),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl Optimizer for OpenAiCompatOptimizer {
    fn name(&self) -> &'static str {
        "siliconflow"
    }

    async fn complete(&self, request: Completion<'_>) -> Result<String> {
        if self.api_key.trim().is_empty() {
            return Err(missing_key("SiliconFlow"));
        }

        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: request.user,
                },
            ],
            temperature: TEMPERATURE,
        };

        tracing::debug!(model = %self.model, url = %self.base_url, "Calling chat completions");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Chat completion request failed: {}", e);
                PromptloomError::Provider(format!("request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!("Chat completion API error: HTTP {} - {}", status, text);
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| status.to_string());
            return Err(PromptloomError::Provider(format!("API Error: {}", message)));
        }

        let parsed = response.json::<ChatResponse>().await.map_err(|e| {
            PromptloomError::Provider(format!("Malformed chat completion response: {}", e))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| PromptloomError::Provider("No response content.".to_string()))
    }
}
