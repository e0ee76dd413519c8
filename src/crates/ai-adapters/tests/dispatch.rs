mod common;

use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use common::{openai_delta, openai_message, provider_app, spawn, sse, Recorded, Recorder};
use serde_json::json;
use yprompt_ai_adapters::{AiError, AiService, AiServiceConfig, ErrorCategory, StreamSink};
use yprompt_core_types::{ApiFamily, Attachment, AttachmentKind, ChatMessage, ProviderConfig};

fn service() -> AiService {
    AiService::new(AiServiceConfig::default()).unwrap()
}

fn messages() -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("You are a prompt engineering assistant."),
        ChatMessage::user("Help me write a prompt."),
    ]
}

fn category(err: &AiError) -> ErrorCategory {
    err.category()
}

#[tokio::test]
async fn openai_stream_removes_thinking_and_forwards_chunks() {
    fn respond(_: &Recorded) -> Response {
        sse([
            r#"{"choices":[{"delta":{"content":"<think>secret</think>Hello"}}]}"#.to_string(),
            "[DONE]".to_string(),
        ])
    }
    let recorder = Recorder::default();
    let base = spawn(provider_app("/v1/chat/completions", recorder.clone(), respond)).await;
    let provider = ProviderConfig::new("openai", ApiFamily::OpenAi, "sk-test", base);

    let (sink, mut rx) = StreamSink::channel();
    let text = service()
        .call_ai_with_sink(&messages(), &provider, "gpt-4o", true, Some(&sink))
        .await
        .unwrap();

    assert_eq!(text, "Hello");
    assert_eq!(rx.recv().await.as_deref(), Some("Hello"));
    let request = &recorder.all()[0];
    assert!(request.is_stream());
    assert_eq!(request.header("authorization"), Some("Bearer sk-test"));
    assert_eq!(request.body["messages"][0]["role"], json!("system"));
}

#[tokio::test]
async fn think_tags_split_across_events_are_filtered() {
    fn respond(_: &Recorded) -> Response {
        sse([
            openai_delta("Intro <thi"),
            openai_delta("nk>hidden plan"),
            openai_delta("</thi"),
            openai_delta("nk> and answer"),
            "[DONE]".to_string(),
        ])
    }
    let base = spawn(provider_app("/v1/chat/completions", Recorder::default(), respond)).await;
    let provider = ProviderConfig::new("openai", ApiFamily::OpenAi, "k", format!("{base}/v1"));

    let seen = Arc::new(Mutex::new(String::new()));
    let collector = Arc::clone(&seen);
    let sink = StreamSink::from_fn(move |chunk| collector.lock().unwrap().push_str(chunk));
    let text = service()
        .call_ai_with_sink(&messages(), &provider, "gpt-4o-mini", true, Some(&sink))
        .await
        .unwrap();

    assert_eq!(text, "Intro  and answer");
    assert_eq!(*seen.lock().unwrap(), "Intro  and answer");
}

#[tokio::test]
async fn unparseable_events_are_skipped() {
    fn respond(_: &Recorded) -> Response {
        sse([
            "{not json".to_string(),
            openai_delta("still "),
            r#"{"object":"chat.completion.chunk","choices":[]}"#.to_string(),
            openai_delta("works"),
            "[DONE]".to_string(),
        ])
    }
    let base = spawn(provider_app("/v1/chat/completions", Recorder::default(), respond)).await;
    let provider = ProviderConfig::new("openai", ApiFamily::OpenAi, "k", base);

    let text = service()
        .call_ai(&messages(), &provider, "gpt-4o", true)
        .await
        .unwrap();
    assert_eq!(text, "still works");
}

#[tokio::test]
async fn empty_base_url_fails_before_any_request() {
    let provider = ProviderConfig::new("openai", ApiFamily::OpenAi, "k", "");
    for stream in [false, true] {
        let err = service()
            .call_ai(&messages(), &provider, "gpt-4o", stream)
            .await
            .unwrap_err();
        assert_eq!(category(&err), ErrorCategory::Configuration);
        assert!(err.to_string().contains("API URL is not configured"));
    }
}

#[tokio::test]
async fn failed_stream_falls_back_to_single_non_stream_call() {
    fn respond(request: &Recorded) -> Response {
        if request.is_stream() {
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({"error": {"message": "stream upstream failed"}})),
            )
                .into_response()
        } else {
            Json(openai_message("from the fallback")).into_response()
        }
    }
    let recorder = Recorder::default();
    let base = spawn(provider_app("/v1/chat/completions", recorder.clone(), respond)).await;
    let provider = ProviderConfig::new("openai", ApiFamily::OpenAi, "k", base);

    let text = service()
        .call_ai(&messages(), &provider, "gpt-4o", true)
        .await
        .unwrap();

    assert_eq!(text, "from the fallback");
    let requests = recorder.all();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].is_stream());
    assert!(!requests[1].is_stream());
}

#[tokio::test]
async fn rejected_mime_type_is_not_retried() {
    fn respond(_: &Recorded) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"message": "Unsupported MIME type: video/x-flv"}})),
        )
            .into_response()
    }
    let recorder = Recorder::default();
    let base = spawn(provider_app("/v1/chat/completions", recorder.clone(), respond)).await;
    let provider = ProviderConfig::new("openai", ApiFamily::OpenAi, "k", base);

    let err = service()
        .call_ai(&messages(), &provider, "gpt-4o", true)
        .await
        .unwrap_err();

    assert_eq!(category(&err), ErrorCategory::UnsupportedFileType);
    assert!(err.to_string().contains("video/x-flv"));
    assert_eq!(recorder.count(), 1);
}

#[tokio::test]
async fn authentication_failure_gets_friendly_message() {
    fn respond(_: &Recorded) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"message": "Incorrect API key provided: sk-***"}})),
        )
            .into_response()
    }
    let base = spawn(provider_app("/v1/chat/completions", Recorder::default(), respond)).await;
    let provider = ProviderConfig::new("openai", ApiFamily::OpenAi, "bad", base);

    let err = service()
        .call_ai(&messages(), &provider, "gpt-4o", false)
        .await
        .unwrap_err();
    assert_eq!(category(&err), ErrorCategory::Authentication);
    assert_eq!(err.to_string(), "Authentication failed. Please check your API key.");
}

#[tokio::test]
async fn anthropic_stream_reads_content_block_deltas() {
    fn respond(request: &Recorded) -> Response {
        assert!(request.is_stream());
        sse([
            json!({"type": "message_start", "message": {"id": "msg_1"}}).to_string(),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}).to_string(),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hi"}}).to_string(),
            json!({"type": "ping"}).to_string(),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": " there"}}).to_string(),
            json!({"type": "message_stop"}).to_string(),
        ])
    }
    let recorder = Recorder::default();
    let base = spawn(provider_app("/v1/messages", recorder.clone(), respond)).await;
    let provider = ProviderConfig::new("anthropic", ApiFamily::Anthropic, "sk-ant", base);

    let text = service()
        .call_ai(&messages(), &provider, "claude-3-5-sonnet-20241022", true)
        .await
        .unwrap();

    assert_eq!(text, "Hi there");
    let request = &recorder.all()[0];
    assert_eq!(request.header("x-api-key"), Some("sk-ant"));
    assert_eq!(request.header("anthropic-version"), Some("2023-06-01"));
    assert_eq!(request.body["system"], json!("You are a prompt engineering assistant."));
    assert_eq!(request.body["messages"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn gemini_stream_skips_thoughts_and_ends_with_body() {
    fn respond(request: &Recorded) -> Response {
        assert_eq!(request.query.get("key").map(String::as_str), Some("g-key"));
        assert_eq!(request.query.get("alt").map(String::as_str), Some("sse"));
        sse([
            json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "planning", "thought": true}]}}]}).to_string(),
            json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "Hello "}]}}]}).to_string(),
            json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "world"}]}, "finishReason": "STOP"}]}).to_string(),
        ])
    }
    let recorder = Recorder::default();
    let base = spawn(provider_app("/v1beta/models/:call", recorder.clone(), respond)).await;
    let provider = ProviderConfig::new("google", ApiFamily::Google, "g-key", base);

    let text = service()
        .call_ai(&messages(), &provider, "gemini-2.5-flash", true)
        .await
        .unwrap();

    assert_eq!(text, "Hello world");
    let request = &recorder.all()[0];
    assert_eq!(
        request.body["contents"][0]["parts"][0]["text"],
        json!("You are a prompt engineering assistant.\n\nHelp me write a prompt.")
    );
}

#[tokio::test]
async fn model_family_override_picks_adapter() {
    fn respond(_: &Recorded) -> Response {
        Json(json!({"content": [{"type": "text", "text": "via messages API"}]})).into_response()
    }
    let base = spawn(provider_app("/v1/messages", Recorder::default(), respond)).await;
    let mut model = yprompt_core_types::ModelConfig::new("claude-3-haiku-20240307");
    model.api_family = Some(ApiFamily::Anthropic);
    let provider = ProviderConfig::new("gateway", ApiFamily::OpenAi, "k", base).with_models(vec![model]);

    let text = service()
        .call_ai(&messages(), &provider, "claude-3-haiku-20240307", false)
        .await
        .unwrap();
    assert_eq!(text, "via messages API");
}

#[tokio::test]
async fn attachments_for_text_only_model_are_explained_without_a_call() {
    let recorder = Recorder::default();
    fn respond(_: &Recorded) -> Response {
        Json(openai_message("should not be called")).into_response()
    }
    let base = spawn(provider_app("/v1/chat/completions", recorder.clone(), respond)).await;
    let provider = ProviderConfig::new("openai", ApiFamily::OpenAi, "k", base);
    let message = ChatMessage::user("What is in this picture?").with_attachments(vec![Attachment::new(
        "1",
        "photo.png",
        AttachmentKind::Image,
        "image/png",
        4096,
        "iVBORw0KGgo=",
    )]);

    let text = service()
        .call_ai(&[message], &provider, "gpt-3.5-turbo", false)
        .await
        .unwrap();

    assert!(text.contains("gpt-3.5-turbo"));
    assert_eq!(recorder.count(), 0);
}

#[tokio::test]
async fn detailed_reply_is_sanitized_and_carries_decision() {
    fn respond(_: &Recorded) -> Response {
        Json(openai_message(
            "I have everything I need.\n\n<ASSESSMENT>\nCONTEXT: [SUFFICIENT]\nDECISION: [END_NOW]\n</ASSESSMENT>",
        ))
        .into_response()
    }
    let base = spawn(provider_app("/v1/chat/completions", Recorder::default(), respond)).await;
    let provider = ProviderConfig::new("openai", ApiFamily::OpenAi, "k", base);

    let reply = service()
        .call_ai_detailed(&messages(), &provider, "gpt-4o", false, None)
        .await
        .unwrap();

    assert_eq!(reply.text.trim_end(), "I have everything I need.");
    assert!(reply.should_end);
    assert!(reply.raw.contains("<ASSESSMENT>"));
}

#[tokio::test]
async fn lists_models_sorted() {
    let app = Router::new().route(
        "/v1/models",
        get(|| async {
            Json(json!({"object": "list", "data": [{"id": "gpt-4o"}, {"id": "gpt-3.5-turbo"}, {"id": ""}]}))
        }),
    );
    let base = spawn(app).await;
    let provider = ProviderConfig::new("openai", ApiFamily::OpenAi, "k", format!("{base}/v1/chat/completions"));

    let models = service().list_models(&provider).await.unwrap();
    assert_eq!(models, vec!["gpt-3.5-turbo".to_string(), "gpt-4o".to_string()]);
}

#[tokio::test]
async fn connection_test_reports_success_and_failure() {
    fn respond(_: &Recorded) -> Response {
        Json(openai_message("pong")).into_response()
    }
    let base = spawn(provider_app("/v1/chat/completions", Recorder::default(), respond)).await;
    let service = service();

    let ok = ProviderConfig::new("openai", ApiFamily::OpenAi, "k", base);
    assert!(service.test_connection(&ok, "gpt-4o").await);

    let missing = ProviderConfig::new("openai", ApiFamily::OpenAi, "k", "");
    assert!(!service.test_connection(&missing, "gpt-4o").await);
}
