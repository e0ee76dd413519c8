use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    block_type: Option<String>,
    text: Option<String>,
}

impl MessagesResponse {
    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }

    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| block.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
pub struct AnthropicSSEEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub delta: Option<EventDelta>,
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct EventDelta {
    #[serde(rename = "type")]
    pub delta_type: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub message: Option<String>,
}
