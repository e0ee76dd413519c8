use super::{non_empty, preview, sse_error_message, ProviderRequest, RequestOptions, StreamEvent};
use crate::error::{AiError, AiResult};
use crate::multimodal;
use crate::types::openai::{OpenAIChatResponse, OpenAISSEData};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use yprompt_core_types::{ApiFamily, ChatMessage};

const PROVIDER: &str = "OpenAI";

/// `https://host` -> `https://host/v1/chat/completions`,
/// `https://host/v1` -> `https://host/v1/chat/completions`,
/// full endpoint URLs are kept.
pub fn resolve_chat_url(base_url: &str) -> String {
    let url = base_url.trim();
    if url.contains("/chat/completions") {
        url.to_string()
    } else if url.contains("/v1") {
        format!("{}/chat/completions", url.trim_end_matches('/'))
    } else {
        format!("{}/v1/chat/completions", url.trim_end_matches('/'))
    }
}

/// Model listing endpoint for the same base URL.
pub fn resolve_models_url(base_url: &str) -> String {
    let url = base_url.trim().trim_end_matches('/');
    let url = url.strip_suffix("/chat/completions").unwrap_or(url);
    if url.contains("/models") {
        url.to_string()
    } else if url.contains("/v1") {
        format!("{}/models", url)
    } else {
        format!("{}/v1/models", url)
    }
}

fn wire_message(message: &ChatMessage) -> Value {
    let converted = multimodal::convert(message, ApiFamily::OpenAi);
    let content = if converted.is_text_only() {
        Value::String(converted.joined_text())
    } else {
        Value::Array(converted.parts.iter().map(|part| part.to_json()).collect())
    };
    json!({ "role": message.role().as_str(), "content": content })
}

pub fn build_request(
    base_url: &str,
    api_key: &str,
    model_id: &str,
    messages: &[ChatMessage],
    options: &RequestOptions,
) -> AiResult<ProviderRequest> {
    let mut body = Map::new();
    body.insert("model".to_string(), json!(model_id));
    body.insert(
        "messages".to_string(),
        Value::Array(messages.iter().map(wire_message).collect()),
    );
    if let Some(temperature) = options.temperature {
        body.insert("temperature".to_string(), json!(temperature));
    }
    body.insert(
        options.token_limit_param.as_str().to_string(),
        json!(options.max_tokens),
    );
    if options.stream {
        body.insert("stream".to_string(), json!(true));
    }

    Ok(ProviderRequest {
        url: resolve_chat_url(base_url),
        headers: vec![
            ("Content-Type", "application/json".to_string()),
            ("Authorization", format!("Bearer {}", api_key)),
        ],
        body: Value::Object(body),
    })
}

/// Reads `choices[0].message.content`, then the shapes OpenAI-compatible
/// proxies are known to return instead.
pub fn parse_response(raw: &Value) -> AiResult<String> {
    if let Ok(response) = OpenAIChatResponse::deserialize(raw) {
        if response.has_choices() {
            let text = response
                .first_message_content()
                .or_else(|| response.first_choice_text())
                .unwrap_or_default();
            return non_empty(text, PROVIDER);
        }
    }

    if raw.get("candidates").is_some() {
        return super::gemini::parse_response(raw);
    }

    if let Some(text) = raw.as_str() {
        return non_empty(text, PROVIDER);
    }

    for field in ["text", "content", "response", "output"] {
        if let Some(text) = raw.get(field).and_then(Value::as_str) {
            return non_empty(text, PROVIDER);
        }
    }

    Err(AiError::UnexpectedShape(format!(
        "{} response has no recognised text field: {}",
        PROVIDER,
        preview(raw)
    )))
}

pub fn parse_stream_event(data: &str) -> AiResult<StreamEvent> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(StreamEvent::Done);
    }
    let event: Value = serde_json::from_str(data)
        .map_err(|e| AiError::UnexpectedShape(format!("invalid SSE JSON: {}", e)))?;
    if let Some(message) = sse_error_message(&event) {
        return Ok(StreamEvent::Error(message));
    }
    let chunk = OpenAISSEData::deserialize(&event)
        .map_err(|e| AiError::UnexpectedShape(format!("SSE data schema error: {}", e)))?;
    Ok(match chunk.into_delta_content() {
        Some(text) if !text.is_empty() => StreamEvent::Delta(text),
        _ => StreamEvent::Ignore,
    })
}
