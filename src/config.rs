//! User settings: language, theme, AI provider credentials and the cloud backend.
//!
//! Settings live in `settings.json` inside the workspace directory. Every field
//! has a default, so a partial or outdated file still loads; an undecodable
//! file falls back to defaults entirely. Environment variables fill in blank
//! credentials at load time and are never written back.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PromptloomError, Result};
use crate::storage::{read_json, write_json_atomic};

pub const SETTINGS_FILE: &str = "settings.json";

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_SILICONFLOW_MODEL: &str = "Qwen/Qwen2.5-7B-Instruct";
pub const DEFAULT_SILICONFLOW_BASE_URL: &str = "https://api.siliconflow.cn/v1";

pub const ENV_BACKEND_URL: &str = "PROMPTLOOM_BACKEND_URL";
pub const ENV_BACKEND_KEY: &str = "PROMPTLOOM_BACKEND_KEY";
pub const ENV_GEMINI_KEY: &str = "GEMINI_API_KEY";
pub const ENV_GEMINI_KEY_FALLBACK: &str = "API_KEY";
pub const ENV_SILICONFLOW_KEY: &str = "SILICONFLOW_API_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    #[default]
    Zh,
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::En => write!(f, "en"),
            Language::Zh => write!(f, "zh"),
        }
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "en" => Ok(Language::En),
            "zh" => Ok(Language::Zh),
            _ => Err(format!("Invalid language: {} (expected en or zh)", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
        }
    }
}

impl std::str::FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            _ => Err(format!("Invalid theme: {} (expected light or dark)", s)),
        }
    }
}

/// Which optimization backend handles `optimize` and idea generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    #[default]
    Gemini,
    SiliconFlow,
}

impl std::fmt::Display for AiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AiProvider::Gemini => write!(f, "gemini"),
            AiProvider::SiliconFlow => write!(f, "siliconflow"),
        }
    }
}

impl std::str::FromStr for AiProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "gemini" => Ok(AiProvider::Gemini),
            "siliconflow" => Ok(AiProvider::SiliconFlow),
            _ => Err(format!(
                "Invalid AI provider: {} (expected gemini or siliconflow)",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeminiSettings {
    pub api_key: String,
    pub model: String,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
        }
    }
}

/// OpenAI-compatible HTTP provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SiliconFlowSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl Default for SiliconFlowSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_SILICONFLOW_MODEL.to_string(),
            base_url: DEFAULT_SILICONFLOW_BASE_URL.to_string(),
        }
    }
}

/// Hosted backend endpoint and its public (anon) key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendSettings {
    pub url: String,
    pub anon_key: String,
}

impl BackendSettings {
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty() && !self.anon_key.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub language: Language,
    pub theme: Theme,
    pub ai_provider: AiProvider,
    pub gemini: GeminiSettings,
    pub silicon_flow: SiliconFlowSettings,
    pub backend: BackendSettings,
}

impl Settings {
    /// Load the stored settings merged over defaults, then fill blank
    /// credentials from the process environment.
    pub fn load(dir: &Path) -> Self {
        Self::load_stored(dir).with_env(|key| std::env::var(key).ok())
    }

    /// Load the stored settings without consulting the environment.
    pub fn load_stored(dir: &Path) -> Self {
        let mut settings: Settings = read_json(&dir.join(SETTINGS_FILE)).unwrap_or_default();
        settings.fill_blanks();
        settings
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        write_json_atomic(&dir.join(SETTINGS_FILE), self)
    }

    /// Fill blank credential fields from `lookup`. Stored values always win.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let fill = |slot: &mut String, keys: &[&str]| {
            if slot.trim().is_empty() {
                if let Some(value) = keys.iter().find_map(|k| lookup(k).filter(|v| !v.is_empty())) {
                    *slot = value;
                }
            }
        };

        fill(&mut self.backend.url, &[ENV_BACKEND_URL]);
        fill(&mut self.backend.anon_key, &[ENV_BACKEND_KEY]);
        fill(
            &mut self.gemini.api_key,
            &[ENV_GEMINI_KEY, ENV_GEMINI_KEY_FALLBACK],
        );
        fill(&mut self.silicon_flow.api_key, &[ENV_SILICONFLOW_KEY]);
        self
    }

    /// Blank model/base URL fields fall back to the built-in defaults.
    fn fill_blanks(&mut self) {
        if self.gemini.model.trim().is_empty() {
            self.gemini.model = DEFAULT_GEMINI_MODEL.to_string();
        }
        if self.silicon_flow.model.trim().is_empty() {
            self.silicon_flow.model = DEFAULT_SILICONFLOW_MODEL.to_string();
        }
        if self.silicon_flow.base_url.trim().is_empty() {
            self.silicon_flow.base_url = DEFAULT_SILICONFLOW_BASE_URL.to_string();
        }
    }

    /// Set a value by dotted key, e.g. `gemini.model` or `backend.url`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim().to_string();
        match key {
            "language" => self.language = value.parse().map_err(PromptloomError::InvalidInput)?,
            "theme" => self.theme = value.parse().map_err(PromptloomError::InvalidInput)?,
            "aiProvider" | "ai_provider" => {
                self.ai_provider = value.parse().map_err(PromptloomError::InvalidInput)?
            }
            "gemini.apiKey" => self.gemini.api_key = value,
            "gemini.model" => self.gemini.model = value,
            "siliconFlow.apiKey" => self.silicon_flow.api_key = value,
            "siliconFlow.model" => self.silicon_flow.model = value,
            "siliconFlow.baseUrl" => {
                self.silicon_flow.base_url = value.trim_end_matches('/').to_string()
            }
            "backend.url" => self.backend.url = value.trim_end_matches('/').to_string(),
            "backend.anonKey" => self.backend.anon_key = value,
            _ => {
                return Err(PromptloomError::InvalidInput(format!(
                    "Unknown setting: {}",
                    key
                )))
            }
        }
        self.fill_blanks();
        Ok(())
    }

    /// Copy with secrets masked, for display.
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        copy.gemini.api_key = mask(&copy.gemini.api_key);
        copy.silicon_flow.api_key = mask(&copy.silicon_flow.api_key);
        copy.backend.anon_key = mask(&copy.backend.anon_key);
        copy
    }
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let visible: String = secret.chars().take(4).collect();
    format!("{}****", visible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.language, Language::Zh);
        assert_eq!(settings.theme, Theme::Light);
        assert_eq!(settings.ai_provider, AiProvider::Gemini);
        assert_eq!(settings.gemini.model, DEFAULT_GEMINI_MODEL);
        assert_eq!(settings.silicon_flow.base_url, DEFAULT_SILICONFLOW_BASE_URL);
        assert!(!settings.backend.is_configured());
    }

    #[test]
    fn test_partial_file_merges_with_defaults() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(SETTINGS_FILE),
            r#"{"language": "en", "siliconFlow": {"apiKey": "sk-1"}}"#,
        )
        .unwrap();

        let settings = Settings::load_stored(tmp.path());
        assert_eq!(settings.language, Language::En);
        assert_eq!(settings.theme, Theme::Light);
        assert_eq!(settings.silicon_flow.api_key, "sk-1");
        assert_eq!(settings.silicon_flow.model, DEFAULT_SILICONFLOW_MODEL);
    }

    #[test]
    fn test_corrupt_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(SETTINGS_FILE), "{not json").unwrap();
        assert_eq!(Settings::load_stored(tmp.path()), Settings::default());
    }

    #[test]
    fn test_env_fills_only_blank_fields() {
        let mut settings = Settings::default();
        settings.backend.url = "https://stored.example".to_string();

        let settings = settings.with_env(|key| match key {
            ENV_BACKEND_URL => Some("https://env.example".to_string()),
            ENV_BACKEND_KEY => Some("anon".to_string()),
            ENV_GEMINI_KEY_FALLBACK => Some("g-key".to_string()),
            _ => None,
        });

        assert_eq!(settings.backend.url, "https://stored.example");
        assert_eq!(settings.backend.anon_key, "anon");
        assert_eq!(settings.gemini.api_key, "g-key");
        assert!(settings.backend.is_configured());
    }

    #[test]
    fn test_set_by_dotted_key() {
        let mut settings = Settings::default();
        settings.set("aiProvider", "siliconflow").unwrap();
        settings.set("backend.url", "https://x.example/").unwrap();
        settings.set("gemini.model", "").unwrap();

        assert_eq!(settings.ai_provider, AiProvider::SiliconFlow);
        assert_eq!(settings.backend.url, "https://x.example");
        assert_eq!(settings.gemini.model, DEFAULT_GEMINI_MODEL);
        assert!(settings.set("nope", "1").is_err());
        assert!(settings.set("theme", "purple").is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let tmp = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.theme = Theme::Dark;
        settings.save(tmp.path()).unwrap();

        let json = std::fs::read_to_string(tmp.path().join(SETTINGS_FILE)).unwrap();
        assert!(json.contains("\"aiProvider\""));
        assert_eq!(Settings::load_stored(tmp.path()).theme, Theme::Dark);
    }

    #[test]
    fn test_masked_hides_secrets() {
        let mut settings = Settings::default();
        settings.gemini.api_key = "abcdefgh".to_string();
        let masked = settings.masked();
        assert_eq!(masked.gemini.api_key, "abcd****");
        assert_eq!(masked.silicon_flow.api_key, "");
    }
}
