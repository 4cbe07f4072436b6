use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{missing_key, Completion, Optimizer, TEMPERATURE};
use crate::config::{GeminiSettings, DEFAULT_GEMINI_MODEL};
use crate::error::{PromptloomError, Result};

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    system_instruction: Content<'a>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    #[serde(default)]
    message: String,
}

/// Google Gemini `generateContent` binding.
pub struct GeminiOptimizer {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiOptimizer {
    pub fn new(settings: &GeminiSettings) -> Self {
        let model = if settings.model.trim().is_empty() {
            DEFAULT_GEMINI_MODEL.to_string()
        } else {
            settings.model.clone()
        };
        Self {
            api_key: settings.api_key.clone(),
            model,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the binding at another host.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

#[async_trait]
impl Optimizer for GeminiOptimizer {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn complete(&self, request: Completion<'_>) -> Result<String> {
        if self.api_key.trim().is_empty() {
            return Err(missing_key("Gemini"));
        }

        let body = GenerateRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![TextPart { text: request.user }],
            }],
            system_instruction: Content {
                role: None,
                parts: vec![TextPart {
                    text: request.system,
                }],
            },
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                response_mime_type: request.json.then_some("application/json"),
            },
        };

        tracing::debug!(model = %self.model, "Calling Gemini");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Gemini request failed: {}", e);
                PromptloomError::Provider(format!("Gemini request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!("Gemini API error: HTTP {} - {}", status, text);
            let message = serde_json::from_str::<GeminiErrorBody>(&text)
                .map(|b| b.error.message)
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(PromptloomError::Provider(format!("Gemini: {}", message)));
        }

        let parsed = response.json::<GenerateResponse>().await.map_err(|e| {
            PromptloomError::Provider(format!("Malformed Gemini response: {}", e))
        })?;

        parsed
            .text()
            .ok_or_else(|| PromptloomError::Provider("Gemini returned no text".to_string()))
    }
}
