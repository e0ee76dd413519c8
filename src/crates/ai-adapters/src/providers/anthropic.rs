use super::{non_empty, preview, system_prompt, ProviderRequest, RequestOptions, StreamEvent};
use crate::error::{AiError, AiResult};
use crate::multimodal;
use crate::types::anthropic::{AnthropicSSEEvent, MessagesResponse};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use yprompt_core_types::{ApiFamily, ChatMessage, Role};

const PROVIDER: &str = "Anthropic";

pub fn resolve_messages_url(base_url: &str) -> String {
    let url = base_url.trim();
    if url.contains("/v1/messages") {
        url.to_string()
    } else {
        format!("{}/v1/messages", url.trim_end_matches('/'))
    }
}

fn wire_message(message: &ChatMessage) -> Value {
    let role = match message.role() {
        Role::Assistant => "assistant",
        _ => "user",
    };
    let converted = multimodal::convert(message, ApiFamily::Anthropic);
    let content = if converted.is_text_only() {
        Value::String(converted.joined_text())
    } else {
        Value::Array(converted.parts.iter().map(|part| part.to_json()).collect())
    };
    json!({ "role": role, "content": content })
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
    body.insert("max_tokens".to_string(), json!(options.max_tokens));
    if let Some(system) = system_prompt(messages) {
        body.insert("system".to_string(), json!(system));
    }
    body.insert(
        "messages".to_string(),
        Value::Array(
            messages
                .iter()
                .filter(|message| message.role() != Role::System)
                .map(wire_message)
                .collect(),
        ),
    );
    if options.stream {
        body.insert("stream".to_string(), json!(true));
    }

    Ok(ProviderRequest {
        url: resolve_messages_url(base_url),
        headers: vec![
            ("Content-Type", "application/json".to_string()),
            ("x-api-key", api_key.to_string()),
            ("anthropic-version", options.anthropic_version.clone()),
        ],
        body: Value::Object(body),
    })
}

pub fn parse_response(raw: &Value) -> AiResult<String> {
    let response = MessagesResponse::deserialize(raw).map_err(|e| {
        AiError::UnexpectedShape(format!("{} response: {} ({})", PROVIDER, e, preview(raw)))
    })?;
    if !response.has_content() {
        return Err(AiError::UnexpectedShape(format!(
            "{} response has no content blocks: {}",
            PROVIDER,
            preview(raw)
        )));
    }
    non_empty(response.first_text().unwrap_or_default(), PROVIDER)
}

pub fn parse_stream_event(data: &str) -> AiResult<StreamEvent> {
    let event: AnthropicSSEEvent = serde_json::from_str(data.trim())
        .map_err(|e| AiError::UnexpectedShape(format!("invalid SSE JSON: {}", e)))?;
    Ok(match event.event_type.as_str() {
        "content_block_delta" => match event.delta.and_then(|delta| delta.text) {
            Some(text) if !text.is_empty() => StreamEvent::Delta(text),
            _ => StreamEvent::Ignore,
        },
        "message_stop" => StreamEvent::Done,
        "error" => {
            let error = event.error;
            let message = error
                .as_ref()
                .and_then(|error| error.message.clone())
                .or_else(|| error.and_then(|error| error.error_type))
                .unwrap_or_else(|| "An error occurred during streaming".to_string());
            StreamEvent::Error(message)
        }
        _ => StreamEvent::Ignore,
    })
}
