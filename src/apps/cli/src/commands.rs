use anyhow::{Context, Result};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::oneshot;
use yprompt_ai_adapters::{AiService, CapabilityDetector, StreamSink};
use yprompt_core_types::{ApiFamily, ChatMessage, ModelCapabilities, ProviderConfig};

use crate::config::ProvidersFile;

pub struct ChatRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub stream: bool,
    pub detailed: bool,
}

impl ChatRequest {
    /// Raw chunks are echoed only when no sanitized reply is printed afterwards.
    fn prints_live(&self) -> bool {
        self.stream && !self.detailed
    }
}

fn service(file: &ProvidersFile) -> Result<AiService> {
    AiService::new(file.service.service_config()).context("Failed to create AI service")
}

pub async fn chat(
    file: &ProvidersFile,
    provider: &ProviderConfig,
    model: &str,
    request: ChatRequest,
) -> Result<()> {
    let service = service(file)?;
    let live = request.prints_live();
    let mut messages = Vec::new();
    if let Some(system) = request.system {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(request.prompt));

    let sink = StreamSink::from_fn(|chunk| {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(chunk.as_bytes());
        let _ = stdout.flush();
    });
    let sink = live.then_some(&sink);

    if request.detailed {
        let reply = service
            .call_ai_detailed(&messages, provider, model, request.stream, sink)
            .await?;
        println!("{}", reply.text);
        println!("---");
        println!("should end conversation: {}", reply.should_end);
    } else {
        let text = service
            .call_ai_with_sink(&messages, provider, model, request.stream, sink)
            .await?;
        if sink.is_none() {
            print!("{}", text);
        }
        println!();
    }
    Ok(())
}

pub async fn probe(
    file: &ProvidersFile,
    provider: &ProviderConfig,
    model: &str,
    json: bool,
) -> Result<()> {
    let service = Arc::new(service(file)?);
    let detector = Arc::new(CapabilityDetector::new(service, file.service.cache_config()));

    let (tx, rx) = oneshot::channel::<ModelCapabilities>();
    let handle = detector
        .detect_capabilities_with_callback(
            provider,
            model,
            |report| {
                if json {
                    return;
                }
                match &report.error {
                    None => println!(
                        "connected in {} ms ({})",
                        report.response_time_ms,
                        if report.prefer_stream { "streaming" } else { "non-streaming" }
                    ),
                    Some(error) => println!("connection failed: {}", error),
                }
            },
            move |capabilities| {
                let _ = tx.send(capabilities);
            },
            false,
        )
        .await;
    if let Some(handle) = handle {
        handle.await.context("Reasoning probe task failed")?;
    }
    let capabilities = rx.await.context("Capability detection produced no result")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&capabilities)?);
        return Ok(());
    }
    if capabilities.is_connected() {
        match capabilities.reasoning_kind {
            Some(kind) if capabilities.reasoning_supported => println!("reasoning: yes ({:?})", kind),
            _ => println!("reasoning: no"),
        }
        let params = &capabilities.supported_params;
        println!(
            "temperature: {}, token limit: {}, streaming: {}",
            params.temperature_allowed,
            params.token_limit_param_name.as_str(),
            params.streaming_allowed
        );
    }
    Ok(())
}

pub async fn models(file: &ProvidersFile, provider: &ProviderConfig) -> Result<()> {
    let service = service(file)?;
    for model in service.list_models(provider).await? {
        println!("{}", model);
    }
    Ok(())
}

pub fn providers(family: Option<ApiFamily>) -> Result<()> {
    let families = match family {
        Some(family) => vec![family],
        None => vec![
            ApiFamily::OpenAi,
            ApiFamily::Anthropic,
            ApiFamily::Google,
            ApiFamily::Custom,
        ],
    };
    let file = ProvidersFile {
        providers: families.into_iter().map(ProviderConfig::template).collect(),
        ..ProvidersFile::default()
    };
    print!("{}", toml::to_string_pretty(&file)?);
    Ok(())
}
