//! Error taxonomy and the user-facing classification applied at the
//! dispatch boundary.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;

pub type AiResult<T> = Result<T, AiError>;

/// Broad failure groups surfaced to the conversational layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    UnsupportedFileType,
    Authentication,
    RateLimit,
    Network,
    EmptyResponse,
    Other,
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Non-2xx response; `body` keeps the parsed provider error payload.
    #[error("{provider} API error: {status} {status_text} - {body}")]
    Transport {
        provider: String,
        status: u16,
        status_text: String,
        body: Value,
    },

    #[error("API returned empty content: {0}")]
    EmptyContent(String),

    #[error("Unexpected response structure: {0}")]
    UnexpectedShape(String),

    #[error("Unsupported content: {0}")]
    UnsupportedContent(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Stream error: {0}")]
    Stream(String),

    /// Final form of every failure leaving `AiService::call_ai`.
    #[error("{message}")]
    Classified {
        category: ErrorCategory,
        message: String,
    },
}

static SECRET_QUERY_PARAM: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"([?&](?:key|api_key)=)[^&\s"')]*"#).ok());

static MIME_REJECTION: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(unsupported|invalid|not supported)[^.]{0,40}(mime|media|file|content)[\s_-]*type|(mime|media)[\s_-]*type[^.]{0,40}(not supported|unsupported|invalid)",
    )
    .ok()
});

static MIME_TYPE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\b(image|video|audio|application|text)/[A-Za-z0-9.+-]+").ok()
});

/// Mask API keys carried as URL query parameters.
pub fn redact_secrets(text: &str) -> String {
    match SECRET_QUERY_PARAM.as_ref() {
        Some(re) => re.replace_all(text, "${1}***").into_owned(),
        None => text.to_string(),
    }
}

/// Best-effort human readable message from a provider error body.
pub fn provider_error_message(body: &Value) -> Option<String> {
    let body = match body {
        Value::Array(items) => items.first()?,
        other => other,
    };
    if let Some(error) = body.get("error") {
        if let Some(message) = error.get("message").and_then(Value::as_str) {
            return Some(message.to_string());
        }
        if let Some(message) = error.as_str() {
            return Some(message.to_string());
        }
    }
    if let Some(message) = body.get("message").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    body.as_str().map(str::to_string)
}

fn looks_like_mime_rejection(text: &str) -> bool {
    MIME_REJECTION
        .as_ref()
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

impl AiError {
    /// Build the error for a non-2xx provider response. Bodies that reject a
    /// MIME type become `UnsupportedContent` so no fallback is attempted.
    pub fn transport(provider: &str, status: u16, status_text: &str, body: Value) -> Self {
        if let Some(message) = provider_error_message(&body) {
            if looks_like_mime_rejection(&message) {
                return AiError::UnsupportedContent(message);
            }
        }
        AiError::Transport {
            provider: provider.to_string(),
            status,
            status_text: status_text.to_string(),
            body,
        }
    }

    /// Error reported inside an SSE stream by the provider itself.
    pub fn in_stream(message: String) -> Self {
        if looks_like_mime_rejection(&message) {
            AiError::UnsupportedContent(message)
        } else {
            AiError::Stream(message)
        }
    }

    pub fn is_unsupported_content(&self) -> bool {
        match self {
            AiError::UnsupportedContent(_) => true,
            AiError::Classified { category, .. } => *category == ErrorCategory::UnsupportedFileType,
            _ => false,
        }
    }

    /// Whether a failed streaming attempt may be retried once without streaming.
    pub fn allows_non_stream_fallback(&self) -> bool {
        matches!(
            self,
            AiError::Transport { .. }
                | AiError::Network(_)
                | AiError::Timeout(_)
                | AiError::Stream(_)
                | AiError::UnexpectedShape(_)
        )
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            AiError::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            AiError::Classified { category, .. } => *category,
            other => classify(other).0,
        }
    }

    /// Collapse any failure into a single friendly message.
    pub fn into_user_facing(self) -> AiError {
        if let AiError::Classified { .. } = self {
            return self;
        }
        let (category, message) = classify(&self);
        AiError::Classified { category, message }
    }
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        let timed_out = err.is_timeout();
        let message = redact_secrets(&err.without_url().to_string());
        if timed_out {
            AiError::Timeout(message)
        } else {
            AiError::Network(message)
        }
    }
}

fn detail_of(err: &AiError) -> String {
    let detail = match err {
        AiError::Transport {
            status,
            status_text,
            body,
            ..
        } => match provider_error_message(body) {
            Some(message) => format!("{} {}", status, message),
            None => format!("{} {}", status, status_text),
        },
        AiError::Configuration(message)
        | AiError::EmptyContent(message)
        | AiError::UnexpectedShape(message)
        | AiError::UnsupportedContent(message)
        | AiError::Network(message)
        | AiError::Timeout(message)
        | AiError::Stream(message) => message.clone(),
        AiError::Classified { message, .. } => message.clone(),
    };
    redact_secrets(detail.trim())
}

/// Pattern-match an error into a category and a message fit for display.
pub fn classify(err: &AiError) -> (ErrorCategory, String) {
    let detail = detail_of(err);
    let lowered = detail.to_lowercase();

    if err.is_unsupported_content() || looks_like_mime_rejection(&detail) {
        let mime = MIME_TYPE
            .as_ref()
            .and_then(|re| re.find(&detail))
            .map(|m| m.as_str().to_string());
        let message = match mime {
            Some(mime) => format!(
                "The selected model rejected a file of type {}. Remove the attachment or switch to a provider that supports this file type (Gemini accepts the widest range).",
                mime
            ),
            None => "The selected model rejected one of the attached files. Remove the attachment or switch to a provider that supports this file type (Gemini accepts the widest range).".to_string(),
        };
        return (ErrorCategory::UnsupportedFileType, message);
    }

    match err {
        AiError::Configuration(message) => {
            return (
                ErrorCategory::Configuration,
                format!("Provider configuration is incomplete: {}", message),
            )
        }
        AiError::EmptyContent(_) => {
            return (
                ErrorCategory::EmptyResponse,
                "The model returned an empty response. Please try again.".to_string(),
            )
        }
        AiError::Network(_) | AiError::Timeout(_) => {
            return (
                ErrorCategory::Network,
                "Could not reach the AI provider. Please check your network connection and the API URL.".to_string(),
            )
        }
        _ => {}
    }

    let status = err.status();
    if matches!(status, Some(401) | Some(403))
        || lowered.contains("api key")
        || lowered.contains("api_key")
        || lowered.contains("unauthorized")
        || lowered.contains("authentication")
        || lowered.contains("permission denied")
    {
        return (
            ErrorCategory::Authentication,
            "Authentication failed. Please check your API key.".to_string(),
        );
    }

    if status == Some(429)
        || lowered.contains("rate limit")
        || lowered.contains("rate_limit")
        || lowered.contains("quota")
        || lowered.contains("too many requests")
    {
        return (
            ErrorCategory::RateLimit,
            "The provider is rate limiting requests. Please retry later.".to_string(),
        );
    }

    if lowered.contains("timeout")
        || lowered.contains("timed out")
        || lowered.contains("connection")
        || lowered.contains("network")
    {
        return (
            ErrorCategory::Network,
            "Could not reach the AI provider. Please check your network connection and the API URL.".to_string(),
        );
    }

    (ErrorCategory::Other, format!("Request failed: {}", detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_key_query_parameter() {
        let text = "error sending request for url (https://x/v1beta/models/m:generateContent?key=abc123&alt=sse)";
        let redacted = redact_secrets(text);
        assert!(!redacted.contains("abc123"));
        assert!(redacted.contains("key=***&alt=sse"));
    }

    #[test]
    fn extracts_nested_and_array_error_messages() {
        assert_eq!(
            provider_error_message(&json!({"error": {"message": "bad key"}})).as_deref(),
            Some("bad key")
        );
        assert_eq!(
            provider_error_message(&json!([{"error": {"code": 400, "message": "nope"}}])).as_deref(),
            Some("nope")
        );
        assert_eq!(
            provider_error_message(&json!({"error": "plain"})).as_deref(),
            Some("plain")
        );
        assert!(provider_error_message(&json!({})).is_none());
    }

    #[test]
    fn mime_rejection_becomes_unsupported_content() {
        let err = AiError::transport(
            "Google",
            400,
            "Bad Request",
            json!({"error": {"message": "Unsupported MIME type: video/x-flv"}}),
        );
        assert!(err.is_unsupported_content());
        assert!(!err.allows_non_stream_fallback());
        let (category, message) = classify(&err);
        assert_eq!(category, ErrorCategory::UnsupportedFileType);
        assert!(message.contains("video/x-flv"));
    }

    #[test]
    fn status_codes_drive_categories() {
        let auth = AiError::transport("OpenAI", 401, "Unauthorized", json!({}));
        assert_eq!(auth.category(), ErrorCategory::Authentication);
        assert!(auth.allows_non_stream_fallback());

        let limited = AiError::transport(
            "Anthropic",
            429,
            "Too Many Requests",
            json!({"error": {"type": "rate_limit_error", "message": "slow down"}}),
        );
        assert_eq!(limited.category(), ErrorCategory::RateLimit);
    }

    #[test]
    fn unmatched_errors_keep_detail_without_raw_json() {
        let err = AiError::transport(
            "OpenAI",
            500,
            "Internal Server Error",
            json!({"error": {"message": "upstream exploded"}}),
        );
        let classified = err.into_user_facing();
        assert_eq!(classified.category(), ErrorCategory::Other);
        assert_eq!(
            classified.to_string(),
            "Request failed: 500 upstream exploded"
        );
    }

    #[test]
    fn configuration_and_empty_content_are_not_fallback_candidates() {
        assert!(!AiError::Configuration("x".into()).allows_non_stream_fallback());
        assert!(!AiError::EmptyContent("x".into()).allows_non_stream_fallback());
        assert_eq!(
            AiError::Configuration("API URL is not configured".into()).category(),
            ErrorCategory::Configuration
        );
    }
}
