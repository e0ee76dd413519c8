use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasoningKind {
    /// Dedicated reasoning field (o1-style models)
    OpenaiReasoning,
    /// `parts[].thought` in Gemini responses
    GeminiThought,
    /// `<thinking>` tags in Claude responses
    ClaudeThinking,
    /// Chain of thought recognised in plain text
    GenericCot,
}

/// Name of the token limit field a model accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenLimitParam {
    #[default]
    MaxTokens,
    MaxCompletionTokens,
}

impl TokenLimitParam {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenLimitParam::MaxTokens => "max_tokens",
            TokenLimitParam::MaxCompletionTokens => "max_completion_tokens",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedParams {
    #[serde(alias = "temperature")]
    pub temperature_allowed: bool,
    #[serde(alias = "maxTokens")]
    pub token_limit_param_name: TokenLimitParam,
    #[serde(alias = "streaming")]
    pub streaming_allowed: bool,
    #[serde(alias = "systemMessage")]
    pub system_message_allowed: bool,
}

impl Default for SupportedParams {
    fn default() -> Self {
        Self {
            temperature_allowed: true,
            token_limit_param_name: TokenLimitParam::MaxTokens,
            streaming_allowed: true,
            system_message_allowed: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub connected: bool,
    #[serde(default)]
    pub reasoning: bool,
    #[serde(alias = "responseTime")]
    pub response_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(alias = "timestamp")]
    pub tested_at: DateTime<Utc>,
}

/// Detected behaviour of one `(provider, model)` pair.
///
/// Always replaced as a whole; never patched field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCapabilities {
    #[serde(alias = "reasoning")]
    pub reasoning_supported: bool,
    #[serde(alias = "reasoningType")]
    pub reasoning_kind: Option<ReasoningKind>,
    pub supported_params: SupportedParams,
    #[serde(alias = "testResult")]
    pub last_test_result: TestResult,
}

impl ModelCapabilities {
    /// Capabilities recorded when the connection test failed.
    pub fn failed(error: Option<String>, response_time_ms: u64) -> Self {
        Self {
            reasoning_supported: false,
            reasoning_kind: None,
            supported_params: SupportedParams::default(),
            last_test_result: TestResult {
                connected: false,
                reasoning: false,
                response_time_ms,
                error,
                tested_at: Utc::now(),
            },
        }
    }

    pub fn is_connected(&self) -> bool {
        self.last_test_result.connected
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.last_test_result.tested_at)
    }

    /// Whether the result is younger than `ttl` at `now`.
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) < ttl
    }
}
