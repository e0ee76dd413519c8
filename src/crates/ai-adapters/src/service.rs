//! Dispatch facade: one entry point for every provider family.

use crate::config::AiServiceConfig;
use crate::error::{redact_secrets, AiError, AiResult};
use crate::multimodal::check_multimodal_support;
use crate::providers::{openai, require_base_url, ProviderAdapter, ProviderRequest, RequestOptions};
use crate::sanitizer::{sanitize, should_end_conversation};
use crate::stream_handler::handle_provider_stream;
use crate::think_filter::ThinkTagFilter;
use futures::StreamExt;
use log::{debug, error, info, warn};
use reqwest::{Client, Response};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use yprompt_core_types::{ApiFamily, ChatMessage, ProviderConfig};

const CONNECTION_TEST_PROMPT: &str = "Test connection";

/// Receiver of visible text chunks for one streaming call.
#[derive(Clone)]
pub struct StreamSink {
    inner: SinkInner,
}

#[derive(Clone)]
enum SinkInner {
    Channel(mpsc::UnboundedSender<String>),
    Callback(Arc<dyn Fn(&str) + Send + Sync>),
}

impl StreamSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::from_sender(tx), rx)
    }

    pub fn from_sender(tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            inner: SinkInner::Channel(tx),
        }
    }

    pub fn from_fn(callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            inner: SinkInner::Callback(Arc::new(callback)),
        }
    }

    /// Deliver a chunk. A closed receiver is not an error.
    pub fn send(&self, chunk: &str) {
        match &self.inner {
            SinkInner::Channel(tx) => {
                let _ = tx.send(chunk.to_string());
            }
            SinkInner::Callback(callback) => callback(chunk),
        }
    }
}

impl fmt::Debug for StreamSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.inner {
            SinkInner::Channel(_) => "channel",
            SinkInner::Callback(_) => "callback",
        };
        f.debug_struct("StreamSink").field("kind", &kind).finish()
    }
}

/// Answer plus the interpretation the conversational layer needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiReply {
    /// Text fit for display
    pub text: String,
    /// Text as returned by the provider
    pub raw: String,
    /// The model asked to stop the interview
    pub should_end: bool,
}

/// Entry point for every model call. Build one at startup and share it.
#[derive(Debug, Clone)]
pub struct AiService {
    client: Client,
    config: AiServiceConfig,
}

impl AiService {
    pub fn new(config: AiServiceConfig) -> AiResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| AiError::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: AiServiceConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &AiServiceConfig {
        &self.config
    }

    /// Send `messages` to `model_id` and return the whole answer.
    ///
    /// If attachments are present but the model cannot read them, the
    /// explanation is returned as `Ok` without any network call. Every
    /// error leaves this function classified with a user-facing message.
    pub async fn call_ai(
        &self,
        messages: &[ChatMessage],
        provider: &ProviderConfig,
        model_id: &str,
        stream: bool,
    ) -> AiResult<String> {
        self.call_ai_with_sink(messages, provider, model_id, stream, None)
            .await
    }

    /// [`call_ai`](Self::call_ai) with visible chunks forwarded to `sink` while streaming.
    pub async fn call_ai_with_sink(
        &self,
        messages: &[ChatMessage],
        provider: &ProviderConfig,
        model_id: &str,
        stream: bool,
        sink: Option<&StreamSink>,
    ) -> AiResult<String> {
        let family = provider.effective_family(model_id);
        let support = check_multimodal_support(messages, model_id, family);
        if !support.supported {
            let reason = support.reason.unwrap_or_default();
            info!("Skipping call to {}: {}", model_id, reason);
            return Ok(reason);
        }

        let result = if stream {
            self.call_ai_stream(messages, provider, model_id, family, sink)
                .await
        } else {
            self.complete(ProviderAdapter::for_family(family), messages, provider, model_id)
                .await
        };
        result.map_err(|e| {
            let classified = e.into_user_facing();
            error!(
                "AI call failed: provider={}, model={}, error={}",
                provider.id, model_id, classified
            );
            classified
        })
    }

    /// [`call_ai_with_sink`](Self::call_ai_with_sink), returning the sanitized
    /// text together with the end-of-interview decision.
    pub async fn call_ai_detailed(
        &self,
        messages: &[ChatMessage],
        provider: &ProviderConfig,
        model_id: &str,
        stream: bool,
        sink: Option<&StreamSink>,
    ) -> AiResult<AiReply> {
        let raw = self
            .call_ai_with_sink(messages, provider, model_id, stream, sink)
            .await?;
        Ok(AiReply {
            text: sanitize(&raw),
            should_end: should_end_conversation(&raw),
            raw,
        })
    }

    /// Stream from the provider; on a failure other than rejected content,
    /// retry once without streaming.
    ///
    /// Chunks already delivered to `sink` are not retracted when the
    /// fallback runs; the returned string is authoritative.
    pub async fn call_ai_stream(
        &self,
        messages: &[ChatMessage],
        provider: &ProviderConfig,
        model_id: &str,
        family: ApiFamily,
        sink: Option<&StreamSink>,
    ) -> AiResult<String> {
        let adapter = ProviderAdapter::for_family(family);
        match self
            .stream_completion(adapter, messages, provider, model_id, sink)
            .await
        {
            Ok(text) => Ok(text),
            Err(e) if e.allows_non_stream_fallback() => {
                warn!(
                    "{} streaming failed for model {}, retrying without streaming: {}",
                    adapter.name(),
                    model_id,
                    e
                );
                self.complete(adapter, messages, provider, model_id).await
            }
            Err(e) => Err(e),
        }
    }

    /// One streaming attempt with thinking spans removed.
    pub async fn stream_completion(
        &self,
        adapter: ProviderAdapter,
        messages: &[ChatMessage],
        provider: &ProviderConfig,
        model_id: &str,
        sink: Option<&StreamSink>,
    ) -> AiResult<String> {
        let options = RequestOptions::for_model(&self.config, provider, model_id, true);
        let request = adapter.build_request(provider, model_id, messages, &options)?;
        let response = self.send(adapter, &request, model_id).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(handle_provider_stream(
            response,
            adapter,
            tx,
            self.config.stream_idle_timeout,
        ));

        let mut events = UnboundedReceiverStream::new(rx);
        let mut filter = ThinkTagFilter::new();
        let mut text = String::new();
        let emit = |visible: String, text: &mut String| {
            if visible.is_empty() {
                return;
            }
            if let Some(sink) = sink {
                sink.send(&visible);
            }
            text.push_str(&visible);
        };

        while let Some(event) = events.next().await {
            let chunk = event?;
            emit(filter.filter_chunk(&chunk), &mut text);
        }
        emit(filter.flush(), &mut text);

        if text.trim().is_empty() {
            return Err(AiError::EmptyContent(format!(
                "{} stream produced no visible text",
                adapter.name()
            )));
        }
        debug!(
            "{} stream completed: model={}, chars={}",
            adapter.name(),
            model_id,
            text.chars().count()
        );
        Ok(text)
    }

    /// One non-streaming attempt.
    pub async fn complete(
        &self,
        adapter: ProviderAdapter,
        messages: &[ChatMessage],
        provider: &ProviderConfig,
        model_id: &str,
    ) -> AiResult<String> {
        let options = RequestOptions::for_model(&self.config, provider, model_id, false);
        let request = adapter.build_request(provider, model_id, messages, &options)?;
        let raw = self.request_json(adapter, &request, model_id).await?;
        adapter.parse_response(&raw)
    }

    /// Send a prepared request and return the JSON body untouched.
    pub async fn request_json(
        &self,
        adapter: ProviderAdapter,
        request: &ProviderRequest,
        model_id: &str,
    ) -> AiResult<Value> {
        let response = self.send(adapter, request, model_id).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            AiError::UnexpectedShape(format!("{} response is not JSON: {}", adapter.name(), e))
        })
    }

    async fn send(
        &self,
        adapter: ProviderAdapter,
        request: &ProviderRequest,
        model_id: &str,
    ) -> AiResult<Response> {
        debug!(
            "{} request: url={}, model={}",
            adapter.name(),
            request.redacted_url(),
            model_id
        );
        let mut builder = self
            .client
            .post(&request.url)
            .timeout(self.config.timeout_for_model(model_id));
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        let response = builder.json(&request.body).send().await?;
        check_status(adapter.name(), response).await
    }

    /// Model ids offered by an OpenAI-compatible `/models` endpoint, sorted.
    pub async fn list_models(&self, provider: &ProviderConfig) -> AiResult<Vec<String>> {
        self.fetch_models(provider)
            .await
            .map_err(AiError::into_user_facing)
    }

    async fn fetch_models(&self, provider: &ProviderConfig) -> AiResult<Vec<String>> {
        let url = openai::resolve_models_url(require_base_url(provider)?);
        debug!("Listing models: url={}", redact_secrets(&url));
        let response = self
            .client
            .get(&url)
            .timeout(self.config.base_timeout)
            .header("Authorization", format!("Bearer {}", provider.api_key))
            .header("Content-Type", "application/json")
            .send()
            .await?;
        let response = check_status("Models", response).await?;
        let text = response.text().await?;
        let body: Value = serde_json::from_str(&text)
            .map_err(|e| AiError::UnexpectedShape(format!("model list is not JSON: {}", e)))?;

        let Some(entries) = body.get("data").and_then(Value::as_array) else {
            return Err(AiError::UnexpectedShape(
                "model list response has no data array".to_string(),
            ));
        };
        let mut ids: Vec<String> = entries
            .iter()
            .filter_map(|entry| entry.get("id").and_then(Value::as_str))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Whether a short non-streaming call returns any text.
    pub async fn test_connection(&self, provider: &ProviderConfig, model_id: &str) -> bool {
        let messages = [ChatMessage::user(CONNECTION_TEST_PROMPT)];
        match self.call_ai(&messages, provider, model_id, false).await {
            Ok(text) => !text.trim().is_empty(),
            Err(e) => {
                warn!("Connection test failed for {}/{}: {}", provider.id, model_id, e);
                false
            }
        }
    }
}

/// Turn a non-2xx response into a transport error carrying the parsed body.
async fn check_status(provider: &str, response: Response) -> AiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let status_text = status.canonical_reason().unwrap_or_default().to_string();
    let text = response.text().await.unwrap_or_default();
    let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
    let err = AiError::transport(provider, status.as_u16(), &status_text, body);
    error!("{}", redact_secrets(&err.to_string()));
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::StreamSink;
    use std::sync::{Arc, Mutex};

    #[test]
    fn channel_sink_survives_dropped_receiver() {
        let (sink, rx) = StreamSink::channel();
        drop(rx);
        sink.send("ignored");
    }

    #[test]
    fn callback_sink_receives_chunks_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let collector = Arc::clone(&seen);
        let sink = StreamSink::from_fn(move |chunk| {
            if let Ok(mut chunks) = collector.lock() {
                chunks.push(chunk.to_string());
            }
        });
        sink.send("a");
        sink.send("b");
        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }
}
