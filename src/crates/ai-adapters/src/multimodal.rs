//! Conversion of messages with attachments into provider content parts,
//! and the pre-flight check for models that cannot take binary input.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use log::{debug, warn};
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;
use yprompt_core_types::{ApiFamily, Attachment, AttachmentKind, ChatMessage, ContentPart, MessageContent};

const OPENAI_IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/jpg", "image/gif", "image/webp"];
const ANTHROPIC_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];
const ANTHROPIC_TEXT_DOCUMENT_TYPES: &[&str] = &[
    "text/plain",
    "text/markdown",
    "application/json",
    "text/csv",
    "text/xml",
    "application/xml",
    "text/html",
];

const GEMINI_IMAGE_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/jpg",
    "image/webp",
    "image/heic",
    "image/heif",
];
const GEMINI_DOCUMENT_TYPES: &[&str] = &[
    "text/plain",
    "text/html",
    "application/json",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/rtf",
    "text/rtf",
    "text/csv",
    "text/xml",
    "application/xml",
];
const GEMINI_AUDIO_TYPES: &[&str] = &[
    "audio/wav",
    "audio/x-wav",
    "audio/mp3",
    "audio/mpeg",
    "audio/aac",
    "audio/ogg",
    "audio/flac",
];
const GEMINI_VIDEO_TYPES: &[&str] = &[
    "video/mp4",
    "video/webm",
    "video/quicktime",
    "video/x-msvideo",
    "video/x-flv",
    "video/mpeg",
    "video/mpg",
    "video/x-ms-wmv",
];

static GEMINI_MULTIMODAL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"gemini-(?:1\.5|[2-9])").ok());
static CLAUDE_MULTIMODAL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"claude-(?:[3-9]|opus|sonnet|haiku)").ok());

/// One content element in the shape a provider expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WirePart {
    Text(String),
    /// OpenAI `image_url` with a `data:` URI
    ImageUrl { url: String },
    /// Anthropic base64 `source` block
    AnthropicImage { media_type: String, data: String },
    /// Gemini `inline_data`
    InlineData { mime_type: String, data: String },
}

impl WirePart {
    pub fn to_json(&self) -> Value {
        match self {
            WirePart::Text(text) => json!({ "type": "text", "text": text }),
            WirePart::ImageUrl { url } => json!({ "type": "image_url", "image_url": { "url": url } }),
            WirePart::AnthropicImage { media_type, data } => json!({
                "type": "image",
                "source": { "type": "base64", "media_type": media_type, "data": data }
            }),
            WirePart::InlineData { mime_type, data } => json!({
                "inline_data": { "mime_type": mime_type, "data": data }
            }),
        }
    }

    /// Gemini uses bare `{"text": ...}` parts.
    pub fn to_gemini_json(&self) -> Value {
        match self {
            WirePart::Text(text) => json!({ "text": text }),
            other => other.to_json(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            WirePart::Text(text) => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedAttachment {
    pub name: String,
    pub kind: AttachmentKind,
    pub mime_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertedContent {
    pub parts: Vec<WirePart>,
    pub dropped: Vec<DroppedAttachment>,
}

impl ConvertedContent {
    pub fn is_text_only(&self) -> bool {
        self.parts.iter().all(|part| matches!(part, WirePart::Text(_)))
    }

    /// Text parts joined by blank lines.
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(WirePart::as_text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Convert one message into provider parts for `family`.
///
/// Attachments the family cannot take are left out and described in a
/// trailing text part instead.
pub fn convert(message: &ChatMessage, family: ApiFamily) -> ConvertedContent {
    let mut converted = ConvertedContent::default();

    match message.content() {
        MessageContent::Text(text) => converted.parts.push(WirePart::Text(text.clone())),
        MessageContent::Parts(parts) => {
            for part in parts {
                match part {
                    ContentPart::Text { text } => converted.parts.push(WirePart::Text(text.clone())),
                    ContentPart::Image { inline_data, mime_type } => {
                        match image_part(family, mime_type, inline_data) {
                            Some(wire) => converted.parts.push(wire),
                            None => converted.dropped.push(DroppedAttachment {
                                name: "inline image".to_string(),
                                kind: AttachmentKind::Image,
                                mime_type: mime_type.clone(),
                                size_bytes: (inline_data.len() as u64 * 3) / 4,
                            }),
                        }
                    }
                }
            }
        }
    }

    for attachment in message.attachments() {
        match attachment_part(family, attachment) {
            Some(wire) => converted.parts.push(wire),
            None => {
                debug!(
                    "Dropping attachment for {} family: name={}, type={}, mime={}",
                    family,
                    attachment.name,
                    attachment.kind.as_str(),
                    attachment.mime_type
                );
                converted.dropped.push(DroppedAttachment {
                    name: attachment.name.clone(),
                    kind: attachment.kind,
                    mime_type: attachment.mime_type.clone(),
                    size_bytes: attachment.size_bytes,
                });
            }
        }
    }

    if !converted.dropped.is_empty() {
        converted.parts.push(WirePart::Text(dropped_note(&converted.dropped)));
    }
    converted
}

fn image_part(family: ApiFamily, mime_type: &str, data: &str) -> Option<WirePart> {
    let mime = mime_type.to_lowercase();
    match family {
        ApiFamily::OpenAi | ApiFamily::Custom => OPENAI_IMAGE_TYPES.contains(&mime.as_str()).then(|| {
            WirePart::ImageUrl {
                url: format!("data:{};base64,{}", mime, data),
            }
        }),
        ApiFamily::Anthropic => ANTHROPIC_IMAGE_TYPES.contains(&mime.as_str()).then(|| {
            WirePart::AnthropicImage {
                media_type: mime.clone(),
                data: data.to_string(),
            }
        }),
        ApiFamily::Google => GEMINI_IMAGE_TYPES.contains(&mime.as_str()).then(|| WirePart::InlineData {
            mime_type: mime.clone(),
            data: data.to_string(),
        }),
    }
}

fn attachment_part(family: ApiFamily, attachment: &Attachment) -> Option<WirePart> {
    let mime = attachment.mime_type.to_lowercase();
    match (family, attachment.kind) {
        (_, AttachmentKind::Image) => image_part(family, &mime, &attachment.base64_data),
        (ApiFamily::Anthropic, AttachmentKind::Document)
            if ANTHROPIC_TEXT_DOCUMENT_TYPES.contains(&mime.as_str()) =>
        {
            inline_text_document(attachment)
        }
        (ApiFamily::Google, kind) => {
            let allowed = match kind {
                AttachmentKind::Document => GEMINI_DOCUMENT_TYPES,
                AttachmentKind::Audio => GEMINI_AUDIO_TYPES,
                AttachmentKind::Video => GEMINI_VIDEO_TYPES,
                AttachmentKind::Image => GEMINI_IMAGE_TYPES,
            };
            allowed.contains(&mime.as_str()).then(|| WirePart::InlineData {
                mime_type: mime.clone(),
                data: attachment.base64_data.clone(),
            })
        }
        _ => None,
    }
}

fn inline_text_document(attachment: &Attachment) -> Option<WirePart> {
    let bytes = match BASE64_STANDARD.decode(attachment.base64_data.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to decode document {}: {}", attachment.name, e);
            return None;
        }
    };
    match String::from_utf8(bytes) {
        Ok(text) => Some(WirePart::Text(format!(
            "[File: {}]\n{}",
            attachment.name, text
        ))),
        Err(e) => {
            warn!("Document {} is not valid UTF-8: {}", attachment.name, e);
            None
        }
    }
}

fn dropped_note(dropped: &[DroppedAttachment]) -> String {
    let files = dropped
        .iter()
        .map(|file| {
            format!(
                "- {} ({}, {}, {})",
                file.name,
                file.kind.as_str(),
                file.mime_type,
                format_file_size(file.size_bytes)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "[The user attached {} file(s) that this model cannot read:\n{}]",
        dropped.len(),
        files
    )
}

/// `0 B`, `512 B`, `1.5 KB`, `2 MB`; at most one decimal.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 10.0).round() / 10.0;
    format!("{} {}", rounded, UNITS[unit])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultimodalSupport {
    pub supported: bool,
    pub reason: Option<String>,
}

/// Whether the model name belongs to a known vision/multimodal line.
pub fn is_multimodal_model(model_id: &str) -> bool {
    let model = model_id.to_lowercase();
    let openai = model.contains("gpt-4o")
        || model.contains("gpt-4.1")
        || model.contains("gpt-4-turbo")
        || model.contains("gpt-5")
        || (model.contains("gpt-4") && model.contains("vision"));
    let gemini = GEMINI_MULTIMODAL
        .as_ref()
        .map(|re| re.is_match(&model))
        .unwrap_or(false);
    let claude = CLAUDE_MULTIMODAL
        .as_ref()
        .map(|re| re.is_match(&model))
        .unwrap_or(false);
    openai || gemini || claude || model.contains("vision") || model.contains("-vl")
}

/// Fail fast when binary inputs are present but the model cannot take them.
pub fn check_multimodal_support(
    messages: &[ChatMessage],
    model_id: &str,
    family: ApiFamily,
) -> MultimodalSupport {
    let inputs: usize = messages.iter().map(ChatMessage::binary_input_count).sum();
    if inputs == 0 || is_multimodal_model(model_id) {
        return MultimodalSupport {
            supported: true,
            reason: None,
        };
    }
    MultimodalSupport {
        supported: false,
        reason: Some(format!(
            "The model \"{}\" ({}) does not accept images or files, but {} attachment(s) were provided. Remove the attachments or switch to a multimodal model such as GPT-4o, Claude 3 or later, or Gemini 1.5 or later.",
            model_id, family, inputs
        )),
    }
}
