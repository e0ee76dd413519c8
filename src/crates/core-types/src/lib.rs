//! YPrompt shared data model
//!
//! Plain DTOs exchanged between the conversational layer and the AI core.
//! Everything here is serde-serializable (camelCase) so the surrounding
//! layer can persist it unchanged.

pub mod capability;
pub mod message;
pub mod provider;

pub use capability::{
    ModelCapabilities, ReasoningKind, SupportedParams, TestResult, TokenLimitParam,
};
pub use message::{Attachment, AttachmentKind, ChatMessage, ContentPart, MessageContent, Role};
pub use provider::{ApiFamily, ModelConfig, ProviderConfig, TestStatus};
