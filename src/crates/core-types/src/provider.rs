use crate::capability::ModelCapabilities;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire protocol family spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFamily {
    #[serde(alias = "openai-compatible")]
    OpenAi,
    Anthropic,
    #[serde(alias = "gemini")]
    Google,
    Custom,
}

impl ApiFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiFamily::OpenAi => "openai",
            ApiFamily::Anthropic => "anthropic",
            ApiFamily::Google => "google",
            ApiFamily::Custom => "custom",
        }
    }
}

impl fmt::Display for ApiFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    #[default]
    Untested,
    Testing,
    Success,
    Failed,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Overrides the provider's family for this model
    #[serde(default, alias = "apiType", skip_serializing_if = "Option::is_none")]
    pub api_family: Option<ApiFamily>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<ModelCapabilities>,
    #[serde(default, alias = "lastTested", skip_serializing_if = "Option::is_none")]
    pub last_tested_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub test_status: TestStatus,
}

impl ModelConfig {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            enabled: true,
            api_family: None,
            capabilities: None,
            last_tested_at: None,
            test_status: TestStatus::Untested,
        }
    }

    pub fn named(id: &str, name: &str, family: ApiFamily) -> Self {
        Self {
            name: name.to_string(),
            api_family: Some(family),
            ..Self::new(id)
        }
    }
}

/// Connection settings for one provider, supplied fresh by the caller on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(alias = "type")]
    pub api_family: ApiFamily,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ProviderConfig {
    pub fn new(
        id: impl Into<String>,
        api_family: ApiFamily,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            api_family,
            api_key: api_key.into(),
            base_url: base_url.into(),
            models: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_models(mut self, models: Vec<ModelConfig>) -> Self {
        self.models = models;
        self
    }

    pub fn model(&self, model_id: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|model| model.id == model_id)
    }

    /// Family used for `model_id`: the model override if any, else the provider's.
    pub fn effective_family(&self, model_id: &str) -> ApiFamily {
        self.model(model_id)
            .and_then(|model| model.api_family)
            .unwrap_or(self.api_family)
    }

    /// Preset provider definition with the default endpoint and model list.
    pub fn template(family: ApiFamily) -> Self {
        use ApiFamily::*;
        match family {
            OpenAi => Self {
                name: "OpenAI".to_string(),
                ..Self::new("openai", OpenAi, "", "https://api.openai.com/v1/chat/completions")
            }
            .with_models(
                [
                    ("gpt-5", "GPT-5"),
                    ("gpt-5-mini", "GPT-5 Mini"),
                    ("gpt-5-nano", "GPT-5 Nano"),
                    ("gpt-4o", "GPT-4o"),
                    ("gpt-4o-mini", "GPT-4o Mini"),
                    ("gpt-4-turbo", "GPT-4 Turbo"),
                    ("gpt-3.5-turbo", "GPT-3.5 Turbo"),
                    ("o1", "O1"),
                    ("o1-mini", "O1 Mini"),
                ]
                .iter()
                .map(|(id, name)| ModelConfig::named(id, name, OpenAi))
                .collect(),
            ),
            Anthropic => Self {
                name: "Anthropic".to_string(),
                ..Self::new("anthropic", Anthropic, "", "https://api.anthropic.com/v1/messages")
            }
            .with_models(
                [
                    ("claude-opus-4-1-20250805", "Claude 4.1 Opus"),
                    ("claude-sonnet-4-20250514", "Claude 4 Sonnet"),
                    ("claude-3-7-sonnet-20250219", "Claude 3.7 Sonnet"),
                    ("claude-3-5-sonnet-20241022", "Claude 3.5 Sonnet"),
                    ("claude-3-5-haiku-20241022", "Claude 3.5 Haiku"),
                    ("claude-3-haiku-20240307", "Claude 3 Haiku"),
                ]
                .iter()
                .map(|(id, name)| ModelConfig::named(id, name, Anthropic))
                .collect(),
            ),
            Google => Self {
                name: "Gemini".to_string(),
                ..Self::new(
                    "google",
                    Google,
                    "",
                    "https://generativelanguage.googleapis.com/v1beta",
                )
            }
            .with_models(
                [
                    ("gemini-2.5-pro", "Gemini 2.5 Pro"),
                    ("gemini-2.5-flash", "Gemini 2.5 Flash"),
                    ("gemini-2.5-flash-lite", "Gemini 2.5 Flash-Lite"),
                    ("gemini-2.0-flash", "Gemini 2.0 Flash"),
                    ("gemini-1.5-pro", "Gemini 1.5 Pro"),
                    ("gemini-1.5-flash", "Gemini 1.5 Flash"),
                ]
                .iter()
                .map(|(id, name)| ModelConfig::named(id, name, Google))
                .collect(),
            ),
            Custom => Self::new(
                "custom",
                Custom,
                "",
                "https://api.example.com/v1/chat/completions",
            ),
        }
    }
}
