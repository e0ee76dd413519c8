use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct OpenAIChatResponse {
    #[serde(default)]
    choices: Vec<ResponseChoice>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: Option<ResponseMessage>,
    /// Legacy completions shape
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAIChatResponse {
    pub fn has_choices(&self) -> bool {
        !self.choices.is_empty()
    }

    pub fn first_message_content(&self) -> Option<&str> {
        self.choices
            .first()?
            .message
            .as_ref()?
            .content
            .as_deref()
    }

    pub fn first_choice_text(&self) -> Option<&str> {
        self.choices.first()?.text.as_deref()
    }
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<Delta>,
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAISSEData {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

impl OpenAISSEData {
    pub fn into_delta_content(self) -> Option<String> {
        self.choices.into_iter().next()?.delta?.content
    }
}
