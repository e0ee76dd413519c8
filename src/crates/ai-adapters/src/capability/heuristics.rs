//! Best-effort reasoning detection from model names and response text.
//!
//! No provider exposes a capability endpoint, so everything here is a
//! heuristic. Thresholds and word lists may be retuned; bump
//! [`HEURISTICS_VERSION`] whenever results for the same input can change.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

pub const HEURISTICS_VERSION: u32 = 1;

/// Prompt sent to ordinary OpenAI-family models in phase 2.
pub const MATH_PROBLEM_PROMPT: &str = "一家商店原价100元的商品，先打8折，再打9折，最终价格是多少？请详细展示你的计算和推理过程。\nA product originally costs 100, is discounted 20% and then another 10%. What is the final price? Show your calculation and reasoning step by step.";

pub const STEP_BY_STEP_INSTRUCTION: &str = "When answering, show your complete thinking process: 1) analyse the problem 2) plan the steps 3) carry out the calculation or reasoning 4) verify the answer. Label every step clearly.";

pub const GEMINI_THOUGHT_PROMPT: &str = "请思考并回答：什么是人工智能？";

pub const CLAUDE_THINKING_PROMPT: &str =
    "Please show your thinking process inside <thinking></thinking> tags, then answer: what is AI?";

/// Token limit used by the o1-style probe request.
pub const O1_PROBE_MAX_COMPLETION_TOKENS: u32 = 100;

const THINKING_INDICATORS: &[&str] = &[
    "<thinking>",
    "thinking:",
    "思考：",
    "分析：",
    "推理：",
    "首先",
    "然后",
    "接着",
    "最后",
    "第一步",
    "第二步",
    "第三步",
    "step 1",
    "step 2",
    "step 3",
    "步骤1",
    "步骤2",
    "计算",
    "计算过程",
    "解题",
    "推导",
    "验证",
    "原价",
    "打折",
    "折扣",
    "最终价格",
    "让我",
    "我需要",
    "我们来",
    "分析一下",
    "考虑到",
    "因此",
    "所以",
    "由此可见",
    "可以得出",
    "根据",
    "基于",
    "假设",
    "如果",
    "那么",
    "first,",
    "then,",
    "finally,",
    "let me",
    "let's",
    "we need to",
    "calculate",
    "original price",
    "final price",
    "discount",
    "therefore",
    "verify",
];

const LOGICAL_CONNECTIVES: &[&str] = &[
    "因为", "所以", "然而", "但是", "因此", "由于", "由此", "可见", "because", "therefore",
    "however", "thus", "hence",
];

const EXPLICIT_MARKERS: &[&str] = &["<thinking>", "分析过程", "reasoning process"];

static NUMBERED_LIST: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[1-9]\.|[一二三四五]\s*、|步骤\s*[1-9]").ok());

static ARITHMETIC: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\d+\s*[×*]\s*\d+",
        r"\d+\s*[÷/]\s*\d+",
        r"\d+\s*\+\s*\d+",
        r"\d+\s*-\s*\d+",
        r"=\s*\d+",
        r"0\.\d+",
        r"\d+%",
        r"打.*折",
        r"折扣",
    ]
    .into_iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Signals extracted from a free-text answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReasoningScore {
    pub indicators: usize,
    pub structured: bool,
    pub arithmetic: bool,
    pub explicit_marker: bool,
}

impl ReasoningScore {
    pub fn is_reasoning(&self) -> bool {
        (self.indicators >= 2 && self.structured)
            || self.indicators >= 3
            || self.arithmetic
            || self.explicit_marker
    }
}

pub fn score_text_reasoning(text: &str) -> ReasoningScore {
    let lowered = text.to_lowercase();
    ReasoningScore {
        indicators: THINKING_INDICATORS
            .iter()
            .filter(|indicator| lowered.contains(*indicator))
            .count(),
        structured: has_structured_thinking(text),
        arithmetic: has_arithmetic(text),
        explicit_marker: EXPLICIT_MARKERS.iter().any(|marker| lowered.contains(marker)),
    }
}

/// Numbered steps, or several paragraphs tied together by connectives.
pub fn has_structured_thinking(text: &str) -> bool {
    let numbered = NUMBERED_LIST
        .as_ref()
        .map(|re| re.is_match(text))
        .unwrap_or(false);
    if numbered {
        return true;
    }
    let paragraphs = text.lines().filter(|line| !line.trim().is_empty()).count();
    let lowered = text.to_lowercase();
    let connectives = LOGICAL_CONNECTIVES
        .iter()
        .filter(|word| lowered.contains(*word))
        .count();
    paragraphs > 2 && connectives >= 2
}

pub fn has_arithmetic(text: &str) -> bool {
    ARITHMETIC.iter().any(|re| re.is_match(text))
}

fn model_name(model_id: &str) -> String {
    let lowered = model_id.to_lowercase();
    match lowered.rsplit_once('/') {
        Some((_, name)) => name.to_string(),
        None => lowered,
    }
}

/// OpenAI o-series models with a dedicated reasoning channel.
pub fn is_o1_style_model(model_id: &str) -> bool {
    let name = model_name(model_id);
    ["o1", "o3", "o4"].iter().any(|prefix| {
        name.strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(['-', '_', '.']))
    })
}

/// Models that reject `max_tokens` and a custom temperature.
pub fn uses_completion_token_limit(model_id: &str) -> bool {
    is_o1_style_model(model_id) || model_name(model_id).starts_with("gpt-5")
}

pub fn is_gemini_thinking_model(model_id: &str) -> bool {
    let name = model_id.to_lowercase();
    ["gemini-2.", "gemini-2-", "gemini-pro", "thinking", "exp"]
        .iter()
        .any(|marker| name.contains(marker))
}

pub fn is_claude_thinking_model(model_id: &str) -> bool {
    let name = model_id.to_lowercase();
    ["claude-3.5", "claude-3-5", "claude-3-7", "claude-4", "sonnet", "opus"]
        .iter()
        .any(|marker| name.contains(marker))
}

pub fn has_thinking_tags(text: &str) -> bool {
    text.contains("<thinking>") && text.contains("</thinking>")
}

/// Any truthy `thought` on any part of any candidate in a raw Gemini response.
pub fn has_gemini_thought_field(raw: &Value) -> bool {
    raw.get("candidates")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|candidate| candidate.pointer("/content/parts").and_then(Value::as_array))
        .flatten()
        .any(|part| match part.get("thought") {
            None | Some(Value::Null) | Some(Value::Bool(false)) => false,
            Some(Value::String(text)) => !text.is_empty(),
            Some(_) => true,
        })
}

/// Non-empty `reasoning` or `reasoning_content` on the first choice.
pub fn has_openai_reasoning_field(raw: &Value) -> bool {
    let Some(message) = raw.pointer("/choices/0/message") else {
        return false;
    };
    ["reasoning", "reasoning_content"].iter().any(|field| match message.get(*field) {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => !text.is_empty(),
        Some(_) => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn worked_discount_answer_counts_as_reasoning() {
        let answer = "首先，原价100元打8折：100 × 0.8 = 80元。\n然后再打9折：80 × 0.9 = 72元。\n所以最终价格是72元。";
        let score = score_text_reasoning(answer);
        assert!(score.indicators >= 3);
        assert!(score.arithmetic);
        assert!(score.is_reasoning());
    }

    #[test]
    fn terse_answer_is_not_reasoning() {
        let score = score_text_reasoning("The final price is seventy-two.");
        assert!(!score.arithmetic);
        assert!(!score.is_reasoning());
    }

    #[test]
    fn two_indicators_need_structure() {
        let flat = "Let me think. Therefore seventy-two.";
        let score = score_text_reasoning(flat);
        assert_eq!(score.indicators, 2);
        assert!(!score.structured);
        assert!(!score.is_reasoning());

        let listed = "Let me think.\n1. Apply the first discount\nTherefore seventy-two.";
        assert!(score_text_reasoning(listed).is_reasoning());
    }

    #[test]
    fn explicit_marker_is_enough() {
        assert!(score_text_reasoning("<thinking>hmm</thinking> AI is software").is_reasoning());
    }

    #[test]
    fn recognises_o_series_models() {
        assert!(is_o1_style_model("o1"));
        assert!(is_o1_style_model("o1-mini"));
        assert!(is_o1_style_model("openai/o3-mini"));
        assert!(is_o1_style_model("o4-mini"));
        assert!(!is_o1_style_model("gpt-4o"));
        assert!(!is_o1_style_model("gpt-4o1"));
        assert!(uses_completion_token_limit("gpt-5-mini"));
        assert!(!uses_completion_token_limit("gpt-4o-mini"));
    }

    #[test]
    fn name_allowlists() {
        assert!(is_gemini_thinking_model("gemini-2.5-flash"));
        assert!(is_gemini_thinking_model("gemini-exp-1206"));
        assert!(!is_gemini_thinking_model("gemini-1.5-flash"));
        assert!(is_claude_thinking_model("claude-3-7-sonnet-20250219"));
        assert!(!is_claude_thinking_model("claude-3-haiku-20240307"));
    }

    #[test]
    fn raw_response_fields() {
        assert!(has_gemini_thought_field(&json!({
            "candidates": [{"content": {"parts": [{"text": "x", "thought": true}, {"text": "y"}]}}]
        })));
        assert!(!has_gemini_thought_field(&json!({
            "candidates": [{"content": {"parts": [{"text": "y"}]}}]
        })));
        assert!(has_openai_reasoning_field(&json!({
            "choices": [{"message": {"content": "4", "reasoning": "2+2"}}]
        })));
        assert!(!has_openai_reasoning_field(&json!({
            "choices": [{"message": {"content": "4", "reasoning": null}}]
        })));
    }
}
