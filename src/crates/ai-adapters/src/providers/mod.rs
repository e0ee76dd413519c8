//! Provider protocol adapters.
//!
//! Each family knows how to build a request for its endpoint and how to read
//! text back out of whole responses and single SSE events.

pub mod anthropic;
pub mod gemini;
pub mod openai;

use crate::capability::heuristics::uses_completion_token_limit;
use crate::config::AiServiceConfig;
use crate::error::{redact_secrets, AiError, AiResult};
use serde_json::Value;
use yprompt_core_types::{ApiFamily, ChatMessage, ProviderConfig, Role, TokenLimitParam};

/// A fully resolved HTTP request, ready to be sent.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

impl ProviderRequest {
    /// URL safe for logs.
    pub fn redacted_url(&self) -> String {
        redact_secrets(&self.url)
    }
}

/// Per-request knobs derived from the service config and model capabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub stream: bool,
    /// `None` leaves the field out of the body
    pub temperature: Option<f32>,
    pub max_tokens: u32,
    pub token_limit_param: TokenLimitParam,
    pub anthropic_version: String,
}

impl RequestOptions {
    pub fn for_model(
        config: &AiServiceConfig,
        provider: &ProviderConfig,
        model_id: &str,
        stream: bool,
    ) -> Self {
        let mut options = Self {
            stream,
            temperature: Some(config.temperature),
            max_tokens: config.max_tokens,
            token_limit_param: TokenLimitParam::MaxTokens,
            anthropic_version: config.anthropic_version.clone(),
        };

        let capabilities = provider
            .model(model_id)
            .and_then(|model| model.capabilities.as_ref());
        match capabilities {
            Some(capabilities) => {
                let params = capabilities.supported_params;
                if !params.temperature_allowed {
                    options.temperature = None;
                }
                options.token_limit_param = params.token_limit_param_name;
            }
            None if uses_completion_token_limit(model_id) => {
                options.temperature = None;
                options.token_limit_param = TokenLimitParam::MaxCompletionTokens;
            }
            None => {}
        }
        options
    }
}

/// Result of reading one SSE `data:` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Delta(String),
    Done,
    /// Keep-alives, metadata and events without visible text
    Ignore,
    /// Error reported by the provider inside the stream
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderAdapter {
    OpenAi,
    Anthropic,
    Gemini,
}

impl ProviderAdapter {
    /// Unknown and custom families speak the OpenAI-compatible protocol.
    pub fn for_family(family: ApiFamily) -> Self {
        match family {
            ApiFamily::OpenAi | ApiFamily::Custom => ProviderAdapter::OpenAi,
            ApiFamily::Anthropic => ProviderAdapter::Anthropic,
            ApiFamily::Google => ProviderAdapter::Gemini,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProviderAdapter::OpenAi => "OpenAI",
            ProviderAdapter::Anthropic => "Anthropic",
            ProviderAdapter::Gemini => "Google",
        }
    }

    pub fn family(&self) -> ApiFamily {
        match self {
            ProviderAdapter::OpenAi => ApiFamily::OpenAi,
            ProviderAdapter::Anthropic => ApiFamily::Anthropic,
            ProviderAdapter::Gemini => ApiFamily::Google,
        }
    }

    pub fn build_request(
        &self,
        provider: &ProviderConfig,
        model_id: &str,
        messages: &[ChatMessage],
        options: &RequestOptions,
    ) -> AiResult<ProviderRequest> {
        let base_url = require_base_url(provider)?;
        match self {
            ProviderAdapter::OpenAi => {
                openai::build_request(base_url, &provider.api_key, model_id, messages, options)
            }
            ProviderAdapter::Anthropic => {
                anthropic::build_request(base_url, &provider.api_key, model_id, messages, options)
            }
            ProviderAdapter::Gemini => {
                gemini::build_request(base_url, &provider.api_key, model_id, messages, options)
            }
        }
    }

    /// Extract the answer text from a complete JSON response.
    pub fn parse_response(&self, raw: &Value) -> AiResult<String> {
        match self {
            ProviderAdapter::OpenAi => openai::parse_response(raw),
            ProviderAdapter::Anthropic => anthropic::parse_response(raw),
            ProviderAdapter::Gemini => gemini::parse_response(raw),
        }
    }

    /// Interpret one SSE `data:` payload. `Err` means the line could not be
    /// parsed; callers skip it.
    pub fn parse_stream_event(&self, data: &str) -> AiResult<StreamEvent> {
        match self {
            ProviderAdapter::OpenAi => openai::parse_stream_event(data),
            ProviderAdapter::Anthropic => anthropic::parse_stream_event(data),
            ProviderAdapter::Gemini => gemini::parse_stream_event(data),
        }
    }
}

pub(crate) fn require_base_url(provider: &ProviderConfig) -> AiResult<&str> {
    let base_url = provider.base_url.trim();
    if base_url.is_empty() {
        return Err(AiError::Configuration("API URL is not configured".to_string()));
    }
    Ok(base_url)
}

/// The first system message's text, if any.
pub(crate) fn system_prompt(messages: &[ChatMessage]) -> Option<String> {
    messages
        .iter()
        .find(|message| message.role() == Role::System)
        .map(ChatMessage::text)
        .filter(|text| !text.is_empty())
}

/// Error carried inside an SSE event, as `{"error": {"message": ...}}` or `{"error": "..."}`.
pub(crate) fn sse_error_message(event: &Value) -> Option<String> {
    let error = event.get("error").filter(|error| !error.is_null())?;
    if let Some(message) = error.get("message").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    if let Some(message) = error.as_str() {
        return Some(message.to_string());
    }
    Some("An error occurred during streaming".to_string())
}

/// Shorten a raw payload for error messages.
pub(crate) fn preview(raw: &Value) -> String {
    const LIMIT: usize = 200;
    let text = raw.to_string();
    match text.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text,
    }
}

pub(crate) fn non_empty(text: &str, provider: &str) -> AiResult<String> {
    if text.trim().is_empty() {
        Err(AiError::EmptyContent(format!("{} response contained no text", provider)))
    } else {
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yprompt_core_types::{ModelCapabilities, ModelConfig, SupportedParams};

    #[test]
    fn custom_family_uses_openai_adapter() {
        assert_eq!(ProviderAdapter::for_family(ApiFamily::Custom), ProviderAdapter::OpenAi);
        assert_eq!(ProviderAdapter::for_family(ApiFamily::Google), ProviderAdapter::Gemini);
    }

    #[test]
    fn empty_base_url_is_a_configuration_error() {
        let provider = ProviderConfig::new("p", ApiFamily::OpenAi, "k", "   ");
        let options = RequestOptions::for_model(&AiServiceConfig::default(), &provider, "gpt-4o", false);
        let err = ProviderAdapter::OpenAi
            .build_request(&provider, "gpt-4o", &[ChatMessage::user("hi")], &options)
            .unwrap_err();
        assert!(matches!(err, AiError::Configuration(_)));
    }

    #[test]
    fn options_follow_detected_capabilities() {
        let config = AiServiceConfig::default();
        let provider = ProviderConfig::new("p", ApiFamily::OpenAi, "k", "https://x");

        let defaults = RequestOptions::for_model(&config, &provider, "gpt-4o", true);
        assert_eq!(defaults.temperature, Some(0.7));
        assert_eq!(defaults.token_limit_param, TokenLimitParam::MaxTokens);

        let o1 = RequestOptions::for_model(&config, &provider, "o1-mini", false);
        assert_eq!(o1.temperature, None);
        assert_eq!(o1.token_limit_param, TokenLimitParam::MaxCompletionTokens);

        let mut capabilities = ModelCapabilities::failed(None, 0);
        capabilities.supported_params = SupportedParams {
            temperature_allowed: false,
            token_limit_param_name: TokenLimitParam::MaxCompletionTokens,
            ..SupportedParams::default()
        };
        let mut model = ModelConfig::new("house-model");
        model.capabilities = Some(capabilities);
        let provider = provider.with_models(vec![model]);
        let detected = RequestOptions::for_model(&config, &provider, "house-model", false);
        assert_eq!(detected.temperature, None);
        assert_eq!(detected.token_limit_param, TokenLimitParam::MaxCompletionTokens);
    }
}
