use crate::error::{AiError, AiResult};
use crate::providers::{ProviderAdapter, StreamEvent};
use eventsource_stream::Eventsource;
use futures::StreamExt;
use log::{debug, error, trace, warn};
use reqwest::Response;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Convert an SSE response body into a channel of raw text deltas.
///
/// Lines that cannot be parsed are logged and skipped. The channel is
/// closed when the provider signals completion or the body ends; a provider
/// error event or transport failure is sent as the last item.
///
/// # Arguments
/// * `response` - HTTP response with a `text/event-stream` body
/// * `adapter` - protocol used to interpret each `data:` payload
/// * `tx_event` - delta sender
/// * `idle_timeout` - maximum wait between two events
pub async fn handle_provider_stream(
    response: Response,
    adapter: ProviderAdapter,
    tx_event: mpsc::UnboundedSender<AiResult<String>>,
    idle_timeout: Duration,
) {
    let mut stream = response.bytes_stream().eventsource();
    let provider = adapter.name();

    loop {
        let sse_event = timeout(idle_timeout, stream.next()).await;
        let sse = match sse_event {
            Ok(Some(Ok(sse))) => sse,
            Ok(None) => {
                debug!("{} SSE stream closed", provider);
                return;
            }
            Ok(Some(Err(e))) => {
                let error_msg = format!("SSE stream error: {}", e);
                error!("{}", error_msg);
                let _ = tx_event.send(Err(AiError::Stream(error_msg)));
                return;
            }
            Err(_) => {
                let error_msg = format!("SSE stream timeout after {}s", idle_timeout.as_secs());
                error!("{}", error_msg);
                let _ = tx_event.send(Err(AiError::Timeout(error_msg)));
                return;
            }
        };

        let raw = sse.data;
        trace!("{} SSE: {:?}", provider, raw);
        if raw.trim().is_empty() {
            continue;
        }

        match adapter.parse_stream_event(&raw) {
            Ok(StreamEvent::Delta(text)) => {
                if tx_event.send(Ok(text)).is_err() {
                    debug!("{} stream receiver dropped, stopping", provider);
                    return;
                }
            }
            Ok(StreamEvent::Done) => return,
            Ok(StreamEvent::Ignore) => {}
            Ok(StreamEvent::Error(message)) => {
                error!("{} SSE API error: {}, data: {}", provider, message, raw);
                let _ = tx_event.send(Err(AiError::in_stream(message)));
                return;
            }
            Err(e) => {
                warn!("Skipping unparseable {} SSE event: {}, data: {}", provider, e, raw);
            }
        }
    }
}
