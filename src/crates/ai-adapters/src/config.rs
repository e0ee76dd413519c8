//! Service-wide request defaults

use std::time::Duration;

/// Substrings identifying models that think before answering and therefore
/// get the extended call timeout.
pub const DEFAULT_REASONING_MODEL_MARKERS: &[&str] = &[
    "o1",
    "o3",
    "o4-mini",
    "reasoner",
    "deepseek-r1",
    "thinking",
    "qwq",
    "gpt-5",
];

pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AiServiceConfig {
    /// Whole-call timeout for ordinary models
    pub base_timeout: Duration,
    /// Whole-call timeout for models matching `reasoning_model_markers`
    pub reasoning_timeout: Duration,
    pub connect_timeout: Duration,
    /// Maximum silence between two SSE events
    pub stream_idle_timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
    pub anthropic_version: String,
    pub reasoning_model_markers: Vec<String>,
}

impl Default for AiServiceConfig {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_secs(5 * 60),
            reasoning_timeout: Duration::from_secs(10 * 60),
            connect_timeout: Duration::from_secs(15),
            stream_idle_timeout: Duration::from_secs(600),
            temperature: 0.7,
            max_tokens: 2000,
            anthropic_version: DEFAULT_ANTHROPIC_VERSION.to_string(),
            reasoning_model_markers: DEFAULT_REASONING_MODEL_MARKERS
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
        }
    }
}

impl AiServiceConfig {
    pub fn is_reasoning_model(&self, model_id: &str) -> bool {
        let model = model_id.to_lowercase();
        self.reasoning_model_markers
            .iter()
            .any(|marker| model.contains(marker.as_str()))
    }

    pub fn timeout_for_model(&self, model_id: &str) -> Duration {
        if self.is_reasoning_model(model_id) {
            self.reasoning_timeout
        } else {
            self.base_timeout
        }
    }
}
