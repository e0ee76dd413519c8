#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use axum::extract::Query;
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use tokio::net::TcpListener;

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// An SSE response emitting one `data:` event per item, then closing.
pub fn sse<I, S>(events: I) -> Response
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let events: Vec<Result<Event, Infallible>> = events
        .into_iter()
        .map(|data| Ok(Event::default().data(data.into())))
        .collect();
    Sse::new(futures_util::stream::iter(events)).into_response()
}

pub fn openai_delta(text: &str) -> String {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion.chunk",
        "choices": [{"index": 0, "delta": {"content": text}, "finish_reason": null}]
    })
    .to_string()
}

pub fn openai_message(text: &str) -> Value {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": text}}]
    })
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    pub body: Value,
}

impl Recorded {
    pub fn is_stream(&self) -> bool {
        self.body.get("stream").and_then(Value::as_bool).unwrap_or(false)
            || self.query.get("alt").map(String::as_str) == Some("sse")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Text of every message/content part in the body, concatenated.
    pub fn prompt_text(&self) -> String {
        self.body.to_string()
    }
}

/// Requests seen by a mock provider.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl Recorder {
    pub fn record(&self, headers: HeaderMap, query: HashMap<String, String>, body: Value) -> Recorded {
        let recorded = Recorded {
            headers,
            query,
            body,
        };
        self.requests.lock().unwrap().push(recorded.clone());
        recorded
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn all(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

pub type Responder = fn(&Recorded) -> Response;

/// A mock provider answering POSTs on `path` with `respond`, recording each request.
pub fn provider_app(path: &str, recorder: Recorder, respond: Responder) -> Router {
    Router::new().route(
        path,
        post(
            move |headers: HeaderMap,
                  Query(query): Query<HashMap<String, String>>,
                  Json(body): Json<Value>| {
                let recorder = recorder.clone();
                async move {
                    let recorded = recorder.record(headers, query, body);
                    respond(&recorded)
                }
            },
        ),
    )
}
