use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<Part>>,
}

#[derive(Debug, Deserialize)]
pub struct Part {
    pub text: Option<String>,
    /// Boolean in practice, but some gateways send strings or objects.
    thought: Option<Value>,
}

impl Part {
    pub fn is_thought(&self) -> bool {
        match &self.thought {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(text)) => !text.is_empty(),
            Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
            Some(_) => true,
        }
    }
}

impl GenerateContentResponse {
    /// `candidates[0].content.parts`, or `None` when the structure is absent.
    pub fn parts(&self) -> Option<&[Part]> {
        self.candidates
            .as_ref()?
            .first()?
            .content
            .as_ref()?
            .parts
            .as_deref()
    }

    /// First part with text that is not marked as a thought.
    pub fn first_visible_text(&self) -> Option<&str> {
        self.parts()?
            .iter()
            .find(|part| part.text.is_some() && !part.is_thought())
            .and_then(|part| part.text.as_deref())
    }
}
