//! Runtime probing of what a `(provider, model)` pair can do.
//!
//! Phase 1 checks that the model answers at all; phase 2 guesses whether it
//! reasons visibly. Results are cached per pair for a configurable TTL.

pub mod heuristics;

use crate::providers::{ProviderAdapter, RequestOptions};
use crate::service::AiService;
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use dashmap::DashMap;
use heuristics::{
    has_gemini_thought_field, has_openai_reasoning_field, has_thinking_tags,
    is_claude_thinking_model, is_gemini_thinking_model, is_o1_style_model, score_text_reasoning,
    CLAUDE_THINKING_PROMPT, GEMINI_THOUGHT_PROMPT, MATH_PROBLEM_PROMPT,
    O1_PROBE_MAX_COMPLETION_TOKENS, STEP_BY_STEP_INSTRUCTION,
};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use yprompt_core_types::{
    ApiFamily, ChatMessage, ModelCapabilities, ProviderConfig, ReasoningKind, SupportedParams,
    TestResult, TestStatus, TokenLimitParam,
};

const CONNECTION_PROBE_PROMPT: &str = "Hi";

#[derive(Debug, Clone)]
pub struct CapabilityCacheConfig {
    pub ttl: Duration,
}

impl Default for CapabilityCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::hours(24),
        }
    }
}

/// Outcome of phase 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionReport {
    pub connected: bool,
    pub response_time_ms: u64,
    pub error: Option<String>,
    /// Streaming worked; phase 2 uses the same transport
    pub prefer_stream: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
}

struct ReasoningProbe {
    reasoning_supported: bool,
    reasoning_kind: Option<ReasoningKind>,
    supported_params: SupportedParams,
}

impl ReasoningProbe {
    fn unknown() -> Self {
        Self {
            reasoning_supported: false,
            reasoning_kind: None,
            supported_params: SupportedParams::default(),
        }
    }

    fn detected(reasoning: bool, kind: ReasoningKind) -> Self {
        Self {
            reasoning_supported: reasoning,
            reasoning_kind: reasoning.then_some(kind),
            supported_params: SupportedParams::default(),
        }
    }

    /// Streaming stays allowed only if phase 1 succeeded over a stream.
    fn into_capabilities(self, connection: &ConnectionReport) -> ModelCapabilities {
        let mut supported_params = self.supported_params;
        supported_params.streaming_allowed &= connection.prefer_stream;
        ModelCapabilities {
            reasoning_supported: self.reasoning_supported,
            reasoning_kind: self.reasoning_kind,
            supported_params,
            last_test_result: TestResult {
                connected: true,
                reasoning: self.reasoning_supported,
                response_time_ms: connection.response_time_ms,
                error: None,
                tested_at: Utc::now(),
            },
        }
    }
}

fn cache_key(provider_id: &str, model_id: &str) -> String {
    format!("{}:{}", provider_id, model_id)
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

pub struct CapabilityDetector {
    service: Arc<AiService>,
    cache_config: CapabilityCacheConfig,
    cache: DashMap<String, ModelCapabilities>,
    statuses: DashMap<String, TestStatus>,
}

impl CapabilityDetector {
    pub fn new(service: Arc<AiService>, cache_config: CapabilityCacheConfig) -> Self {
        Self {
            service,
            cache_config,
            cache: DashMap::new(),
            statuses: DashMap::new(),
        }
    }

    /// Last stored result for the pair, regardless of age.
    pub fn cached(&self, provider_id: &str, model_id: &str) -> Option<ModelCapabilities> {
        self.cache
            .get(&cache_key(provider_id, model_id))
            .map(|entry| entry.value().clone())
    }

    pub fn status(&self, provider_id: &str, model_id: &str) -> TestStatus {
        self.statuses
            .get(&cache_key(provider_id, model_id))
            .map(|entry| *entry.value())
            .unwrap_or_default()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        self.statuses.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        let mut keys: Vec<String> = self.cache.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        CacheStats {
            size: keys.len(),
            keys,
        }
    }

    fn fresh(&self, key: &str) -> Option<ModelCapabilities> {
        let entry = self.cache.get(key)?;
        entry
            .is_fresh(self.cache_config.ttl, Utc::now())
            .then(|| entry.value().clone())
    }

    fn store(&self, key: &str, capabilities: ModelCapabilities) {
        let status = if capabilities.is_connected() {
            TestStatus::Success
        } else {
            TestStatus::Failed
        };
        self.cache.insert(key.to_string(), capabilities);
        self.statuses.insert(key.to_string(), status);
    }

    /// Run both phases and return the result; cached results younger than
    /// the TTL are returned unless `force_refresh` is set.
    pub async fn detect_capabilities(
        &self,
        provider: &ProviderConfig,
        model_id: &str,
        force_refresh: bool,
    ) -> ModelCapabilities {
        let key = cache_key(&provider.id, model_id);
        if !force_refresh {
            if let Some(cached) = self.fresh(&key) {
                debug!("Capability cache hit: {}", key);
                return cached;
            }
        }

        self.statuses.insert(key.clone(), TestStatus::Testing);
        let connection = self.connection_phase(provider, model_id).await;
        let capabilities = if connection.connected {
            self.reasoning_phase(provider, model_id, &connection).await
        } else {
            ModelCapabilities::failed(connection.error, connection.response_time_ms)
        };
        self.store(&key, capabilities.clone());
        capabilities
    }

    /// Report phase 1 through `on_connection` as soon as it is known, then
    /// run phase 2 in a background task that ends with `on_reasoning`.
    ///
    /// Returns the handle of the background task, or `None` when everything
    /// was answered inline (cache hit or failed connection).
    pub async fn detect_capabilities_with_callback<C, R>(
        self: &Arc<Self>,
        provider: &ProviderConfig,
        model_id: &str,
        on_connection: C,
        on_reasoning: R,
        force_refresh: bool,
    ) -> Option<JoinHandle<()>>
    where
        C: FnOnce(ConnectionReport),
        R: FnOnce(ModelCapabilities) + Send + 'static,
    {
        let key = cache_key(&provider.id, model_id);
        if !force_refresh {
            if let Some(cached) = self.fresh(&key) {
                debug!("Capability cache hit: {}", key);
                on_connection(ConnectionReport {
                    connected: cached.last_test_result.connected,
                    response_time_ms: cached.last_test_result.response_time_ms,
                    error: cached.last_test_result.error.clone(),
                    prefer_stream: cached.supported_params.streaming_allowed,
                });
                on_reasoning(cached);
                return None;
            }
        }

        self.statuses.insert(key.clone(), TestStatus::Testing);
        let connection = self.connection_phase(provider, model_id).await;
        on_connection(connection.clone());

        if !connection.connected {
            let failed = ModelCapabilities::failed(connection.error, connection.response_time_ms);
            self.store(&key, failed.clone());
            on_reasoning(failed);
            return None;
        }

        let detector = Arc::clone(self);
        let provider = provider.clone();
        let model_id = model_id.to_string();
        Some(tokio::spawn(async move {
            let capabilities = detector
                .reasoning_phase(&provider, &model_id, &connection)
                .await;
            detector.store(&key, capabilities.clone());
            on_reasoning(capabilities);
        }))
    }

    /// Streaming "Hi" first, then non-streaming.
    async fn connection_phase(&self, provider: &ProviderConfig, model_id: &str) -> ConnectionReport {
        let adapter = ProviderAdapter::for_family(provider.effective_family(model_id));
        let messages = [ChatMessage::user(CONNECTION_PROBE_PROMPT)];
        let start = Instant::now();

        match self
            .service
            .stream_completion(adapter, &messages, provider, model_id, None)
            .await
        {
            Ok(text) if !text.trim().is_empty() => {
                return ConnectionReport {
                    connected: true,
                    response_time_ms: elapsed_ms(start),
                    error: None,
                    prefer_stream: true,
                };
            }
            Ok(_) => debug!("Streaming connection test returned no text: {}", model_id),
            Err(e) => debug!(
                "Streaming connection test failed for {}, trying non-streaming: {}",
                model_id, e
            ),
        }

        let outcome = self
            .service
            .complete(adapter, &messages, provider, model_id)
            .await;
        let response_time_ms = elapsed_ms(start);
        match outcome {
            Ok(text) if !text.trim().is_empty() => ConnectionReport {
                connected: true,
                response_time_ms,
                error: None,
                prefer_stream: false,
            },
            Ok(_) => ConnectionReport {
                connected: false,
                response_time_ms,
                error: Some("Both streaming and non-streaming tests returned no content".to_string()),
                prefer_stream: false,
            },
            Err(e) => {
                let error = e.into_user_facing().to_string();
                info!("Connection test failed for {}/{}: {}", provider.id, model_id, error);
                ConnectionReport {
                    connected: false,
                    response_time_ms,
                    error: Some(error),
                    prefer_stream: false,
                }
            }
        }
    }

    /// Never fails: a probe error still yields a connected result without reasoning.
    async fn reasoning_phase(
        &self,
        provider: &ProviderConfig,
        model_id: &str,
        connection: &ConnectionReport,
    ) -> ModelCapabilities {
        let family = provider.effective_family(model_id);
        let probe = match family {
            ApiFamily::OpenAi => self.probe_openai(provider, model_id, connection.prefer_stream).await,
            ApiFamily::Google => self.probe_gemini(provider, model_id).await,
            ApiFamily::Anthropic => self.probe_claude(provider, model_id, connection.prefer_stream).await,
            ApiFamily::Custom => Ok(ReasoningProbe::unknown()),
        };
        let probe = probe.unwrap_or_else(|e| {
            warn!(
                "Reasoning probe failed for {}/{}, assuming none: {:#}",
                provider.id, model_id, e
            );
            ReasoningProbe::unknown()
        });
        debug!(
            "Reasoning probe for {}/{}: supported={}, kind={:?}",
            provider.id, model_id, probe.reasoning_supported, probe.reasoning_kind
        );
        probe.into_capabilities(connection)
    }

    async fn ask(
        &self,
        provider: &ProviderConfig,
        model_id: &str,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<String> {
        let adapter = ProviderAdapter::for_family(provider.effective_family(model_id));
        let text = if stream {
            self.service
                .stream_completion(adapter, messages, provider, model_id, None)
                .await?
        } else {
            self.service
                .complete(adapter, messages, provider, model_id)
                .await?
        };
        Ok(text)
    }

    async fn probe_openai(
        &self,
        provider: &ProviderConfig,
        model_id: &str,
        prefer_stream: bool,
    ) -> Result<ReasoningProbe> {
        let question = ChatMessage::user(MATH_PROBLEM_PROMPT);

        if is_o1_style_model(model_id) {
            let adapter = ProviderAdapter::OpenAi;
            let options = RequestOptions {
                stream: false,
                temperature: None,
                max_tokens: O1_PROBE_MAX_COMPLETION_TOKENS,
                token_limit_param: TokenLimitParam::MaxCompletionTokens,
                anthropic_version: self.service.config().anthropic_version.clone(),
            };
            let request = adapter.build_request(provider, model_id, &[question], &options)?;
            let raw = self
                .service
                .request_json(adapter, &request, model_id)
                .await
                .context("o1-style reasoning request failed")?;
            let mut probe = ReasoningProbe::detected(
                has_openai_reasoning_field(&raw),
                ReasoningKind::OpenaiReasoning,
            );
            probe.supported_params = SupportedParams {
                temperature_allowed: false,
                token_limit_param_name: TokenLimitParam::MaxCompletionTokens,
                streaming_allowed: false,
                system_message_allowed: true,
            };
            return Ok(probe);
        }

        let messages = [ChatMessage::system(STEP_BY_STEP_INSTRUCTION), question];
        let answer = self
            .ask(provider, model_id, &messages, prefer_stream)
            .await
            .context("step-by-step reasoning request failed")?;
        let score = score_text_reasoning(&answer);
        debug!("Text reasoning score for {}: {:?}", model_id, score);
        Ok(ReasoningProbe::detected(score.is_reasoning(), ReasoningKind::GenericCot))
    }

    /// Looks for `thought` parts in the raw response, then at the model name.
    async fn probe_gemini(&self, provider: &ProviderConfig, model_id: &str) -> Result<ReasoningProbe> {
        let adapter = ProviderAdapter::Gemini;
        let options = RequestOptions::for_model(self.service.config(), provider, model_id, false);
        let request = adapter.build_request(
            provider,
            model_id,
            &[ChatMessage::user(GEMINI_THOUGHT_PROMPT)],
            &options,
        )?;
        let raw = self
            .service
            .request_json(adapter, &request, model_id)
            .await
            .context("Gemini thought request failed")?;
        let reasoning = has_gemini_thought_field(&raw) || is_gemini_thinking_model(model_id);
        Ok(ReasoningProbe::detected(reasoning, ReasoningKind::GeminiThought))
    }

    async fn probe_claude(
        &self,
        provider: &ProviderConfig,
        model_id: &str,
        prefer_stream: bool,
    ) -> Result<ReasoningProbe> {
        let answer = self
            .ask(
                provider,
                model_id,
                &[ChatMessage::user(CLAUDE_THINKING_PROMPT)],
                prefer_stream,
            )
            .await
            .context("Claude thinking request failed")?;
        let reasoning = has_thinking_tags(&answer) || is_claude_thinking_model(model_id);
        Ok(ReasoningProbe::detected(reasoning, ReasoningKind::ClaudeThinking))
    }
}
