//! YPrompt AI core
//!
//! Talks to OpenAI-compatible, Anthropic and Gemini endpoints, normalises
//! their JSON and SSE responses into plain text, strips out-of-band content
//! (`<think>` spans, `<ASSESSMENT>` blocks) and probes model capabilities.

pub mod capability;
pub mod config;
pub mod error;
pub mod multimodal;
pub mod providers;
pub mod sanitizer;
pub mod service;
pub mod stream_handler;
pub mod think_filter;
pub mod types;

pub use capability::{CacheStats, CapabilityCacheConfig, CapabilityDetector, ConnectionReport};
pub use config::AiServiceConfig;
pub use error::{AiError, AiResult, ErrorCategory};
pub use multimodal::{check_multimodal_support, MultimodalSupport};
pub use providers::{ProviderAdapter, ProviderRequest, RequestOptions, StreamEvent};
pub use sanitizer::{clean_for_formatting, sanitize, should_end_conversation};
pub use service::{AiReply, AiService, StreamSink};
pub use think_filter::ThinkTagFilter;
