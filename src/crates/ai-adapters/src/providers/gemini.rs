use super::{non_empty, preview, sse_error_message, system_prompt, ProviderRequest, RequestOptions, StreamEvent};
use crate::error::{AiError, AiResult};
use crate::multimodal::{self, WirePart};
use crate::types::gemini::GenerateContentResponse;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use yprompt_core_types::{ApiFamily, ChatMessage, Role};

const PROVIDER: &str = "Google";

/// Normalise any configured URL to the `.../v1beta` API root.
pub fn resolve_api_root(base_url: &str) -> String {
    let mut url = base_url.trim().trim_end_matches('/');
    if url.ends_with("/v1beta") {
        return url.to_string();
    }
    if let Some((root, _)) = url.split_once("/models/") {
        url = root.trim_end_matches('/');
    }
    if url.ends_with("/v1beta") {
        url.to_string()
    } else {
        format!("{}/v1beta", url)
    }
}

pub fn resolve_generate_url(base_url: &str, model_id: &str, api_key: &str, stream: bool) -> String {
    let root = resolve_api_root(base_url);
    let key = urlencoding::encode(api_key);
    if stream {
        format!("{}/models/{}:streamGenerateContent?key={}&alt=sse", root, model_id, key)
    } else {
        format!("{}/models/{}:generateContent?key={}", root, model_id, key)
    }
}

struct Turn {
    role: &'static str,
    parts: Vec<WirePart>,
}

/// Gemini has no system role: the system prompt is put in front of the
/// first user turn's first text part.
fn merge_system_prompt(turns: &mut Vec<Turn>, system: String) {
    let user_turn = turns.iter().position(|turn| turn.role == "user");
    let Some(index) = user_turn else {
        turns.insert(
            0,
            Turn {
                role: "user",
                parts: vec![WirePart::Text(system)],
            },
        );
        return;
    };
    let parts = &mut turns[index].parts;
    let first_text = parts
        .iter()
        .position(|part| matches!(part, WirePart::Text(_)));
    match first_text.map(|idx| &mut parts[idx]) {
        Some(WirePart::Text(text)) => *text = format!("{}\n\n{}", system, text),
        _ => parts.insert(0, WirePart::Text(system)),
    }
}

pub fn build_request(
    base_url: &str,
    api_key: &str,
    model_id: &str,
    messages: &[ChatMessage],
    options: &RequestOptions,
) -> AiResult<ProviderRequest> {
    let mut turns: Vec<Turn> = messages
        .iter()
        .filter(|message| message.role() != Role::System)
        .map(|message| Turn {
            role: if message.role() == Role::Assistant { "model" } else { "user" },
            parts: multimodal::convert(message, ApiFamily::Google).parts,
        })
        .collect();
    if let Some(system) = system_prompt(messages) {
        merge_system_prompt(&mut turns, system);
    }

    let contents: Vec<Value> = turns
        .iter()
        .map(|turn| {
            json!({
                "role": turn.role,
                "parts": turn.parts.iter().map(WirePart::to_gemini_json).collect::<Vec<_>>(),
            })
        })
        .collect();

    let mut generation_config = Map::new();
    if let Some(temperature) = options.temperature {
        generation_config.insert("temperature".to_string(), json!(temperature));
    }

    Ok(ProviderRequest {
        url: resolve_generate_url(base_url, model_id, api_key, options.stream),
        headers: vec![("Content-Type", "application/json".to_string())],
        body: json!({
            "contents": contents,
            "generationConfig": Value::Object(generation_config),
        }),
    })
}

pub fn parse_response(raw: &Value) -> AiResult<String> {
    let response = GenerateContentResponse::deserialize(raw).map_err(|e| {
        AiError::UnexpectedShape(format!("{} response: {} ({})", PROVIDER, e, preview(raw)))
    })?;
    if response.parts().is_none() {
        return Err(AiError::UnexpectedShape(format!(
            "{} response is missing candidates[0].content.parts: {}",
            PROVIDER,
            preview(raw)
        )));
    }
    non_empty(response.first_visible_text().unwrap_or_default(), PROVIDER)
}

pub fn parse_stream_event(data: &str) -> AiResult<StreamEvent> {
    let event: Value = serde_json::from_str(data.trim())
        .map_err(|e| AiError::UnexpectedShape(format!("invalid SSE JSON: {}", e)))?;
    if let Some(message) = sse_error_message(&event) {
        return Ok(StreamEvent::Error(message));
    }
    let chunk = GenerateContentResponse::deserialize(&event)
        .map_err(|e| AiError::UnexpectedShape(format!("SSE data schema error: {}", e)))?;
    Ok(match chunk.first_visible_text() {
        Some(text) if !text.is_empty() => StreamEvent::Delta(text.to_string()),
        _ => StreamEvent::Ignore,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use yprompt_core_types::TokenLimitParam;

    fn options(stream: bool) -> RequestOptions {
        RequestOptions {
            stream,
            temperature: Some(0.5),
            max_tokens: 2000,
            token_limit_param: TokenLimitParam::MaxTokens,
            anthropic_version: "2023-06-01".to_string(),
        }
    }

    #[test]
    fn normalises_api_root() {
        let root = "https://generativelanguage.googleapis.com/v1beta";
        assert_eq!(resolve_api_root("https://generativelanguage.googleapis.com"), root);
        assert_eq!(resolve_api_root("https://generativelanguage.googleapis.com/v1beta/"), root);
        assert_eq!(
            resolve_api_root(
                "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent"
            ),
            root
        );
    }

    #[test]
    fn key_and_alt_go_into_query() {
        assert_eq!(
            resolve_generate_url("https://g.example", "gemini-2.5-flash", "a b", true),
            "https://g.example/v1beta/models/gemini-2.5-flash:streamGenerateContent?key=a%20b&alt=sse"
        );
        assert_eq!(
            resolve_generate_url("https://g.example/v1beta", "gemini-2.5-flash", "k", false),
            "https://g.example/v1beta/models/gemini-2.5-flash:generateContent?key=k"
        );
    }

    #[test]
    fn system_prompt_prefixes_first_user_turn() {
        let messages = vec![
            ChatMessage::system("be precise"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
            ChatMessage::user("again"),
        ];
        let request = build_request("https://g", "k", "gemini-2.5-pro", &messages, &options(false)).unwrap();
        assert_eq!(
            request.body,
            json!({
                "contents": [
                    {"role": "user", "parts": [{"text": "be precise\n\nhi"}]},
                    {"role": "model", "parts": [{"text": "hello"}]},
                    {"role": "user", "parts": [{"text": "again"}]}
                ],
                "generationConfig": {"temperature": 0.5f32}
            })
        );
        assert!(request.headers.iter().all(|(name, _)| *name != "Authorization"));
    }

    #[test]
    fn system_prompt_without_user_turn_adds_one() {
        let messages = vec![ChatMessage::system("only system")];
        let request = build_request("https://g", "k", "gemini-2.5-pro", &messages, &options(false)).unwrap();
        assert_eq!(
            request.body["contents"],
            json!([{"role": "user", "parts": [{"text": "only system"}]}])
        );
    }

    #[test]
    fn skips_thought_parts_and_flags_missing_structure() {
        let raw = json!({"candidates": [{"content": {"parts": [
            {"text": "hidden", "thought": true},
            {"text": "visible"}
        ]}}]});
        assert_eq!(parse_response(&raw).unwrap(), "visible");

        let only_thoughts = json!({"candidates": [{"content": {"parts": [{"text": "x", "thought": true}]}}]});
        assert!(matches!(parse_response(&only_thoughts), Err(AiError::EmptyContent(_))));

        let blocked = json!({"candidates": [{"finishReason": "SAFETY"}]});
        assert!(matches!(parse_response(&blocked), Err(AiError::UnexpectedShape(_))));
    }

    #[test]
    fn parses_stream_chunks() {
        assert_eq!(
            parse_stream_event(r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hi"}]}}]}"#)
                .unwrap(),
            StreamEvent::Delta("Hi".to_string())
        );
        assert_eq!(
            parse_stream_event(r#"{"candidates":[{"finishReason":"STOP"}],"usageMetadata":{}}"#).unwrap(),
            StreamEvent::Ignore
        );
        assert_eq!(
            parse_stream_event(r#"{"error":{"code":400,"message":"API key not valid"}}"#).unwrap(),
            StreamEvent::Error("API key not valid".to_string())
        );
    }
}
