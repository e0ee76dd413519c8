//! Cleanup of fully assembled model output: `<ASSESSMENT>` control blocks,
//! leftover thinking spans and truncated tag fragments.

use log::warn;
use regex::Regex;
use std::sync::LazyLock;

type Pattern = LazyLock<Result<Regex, regex::Error>>;

/// Number of trailing non-empty lines in which bare field labels count as
/// the start of a leaked assessment block.
pub const ASSESSMENT_REGION_LINES: usize = 12;

static COMPLETE_THINK: Pattern = LazyLock::new(|| Regex::new(r"(?is)<think>.*?</think>"));
static COMPLETE_ASSESSMENT: Pattern =
    LazyLock::new(|| Regex::new(r"(?is)<ASSESSMENT>.*?</ASSESSMENT>"));
static OPEN_ASSESSMENT: Pattern = LazyLock::new(|| Regex::new(r"(?i)<ASSESSMENT>"));

static STRUCTURAL_FRAGMENTS: LazyLock<Vec<Result<Regex, regex::Error>>> = LazyLock::new(|| {
    [
        r"(?i)<thin[^>]*$",
        r"(?i)</thin[^>]*$",
        r"(?i)\n\n<thin",
        r"(?i)<ASSE[^>]*$",
        r"(?i)</ASSE[^>]*$",
        r"(?i)\n\n<ASSE",
    ]
    .into_iter()
    .map(Regex::new)
    .collect()
});

const FIELD_LABELS: [&str; 7] = [
    "CONTEXT",
    "TASK",
    "FORMAT",
    "QUALITY",
    "TURN_COUNT",
    "DECISION",
    "CONFIDENCE",
];

static FIELD_LABEL_LINES: LazyLock<Vec<Result<Regex, regex::Error>>> = LazyLock::new(|| {
    FIELD_LABELS
        .iter()
        .map(|label| Regex::new(&format!(r"(?im)^[ \t*#>\-]*{}:", label)))
        .collect()
});

static DECISION_FIELD: Pattern = LazyLock::new(|| Regex::new(r"(?i)DECISION:\s*\[([^\]]+)\]"));
static ASSESSMENT_BODY: Pattern =
    LazyLock::new(|| Regex::new(r"(?is)<ASSESSMENT>(.*?)</ASSESSMENT>"));

static CODE_FENCE_OPEN: Pattern = LazyLock::new(|| Regex::new(r"(?m)^```\w*\n?"));
static CODE_FENCE_CLOSE: Pattern = LazyLock::new(|| Regex::new(r"(?m)\n?```$"));
static PREAMBLES: LazyLock<Vec<Result<Regex, regex::Error>>> = LazyLock::new(|| {
    [
        r"(?i)^Here is the.*?translation.*?:\s*",
        r"(?i)^Here is the.*?converted.*?:\s*",
        r"(?i)^Here is.*?:\s*",
        r"^以下是.*?翻译.*?：\s*",
        r"^以下是.*?转换.*?：\s*",
        r"^以下是.*?：\s*",
        r"^.*?翻译结果.*?：\s*",
        r"^.*?转换结果.*?：\s*",
    ]
    .into_iter()
    .map(Regex::new)
    .collect()
});

fn compiled(pattern: &Result<Regex, regex::Error>) -> Result<&Regex, regex::Error> {
    pattern.as_ref().map_err(Clone::clone)
}

/// Remove assessment blocks, thinking spans and dangling fragments.
///
/// Never fails: if a pattern cannot be used the input is returned unchanged.
pub fn sanitize(text: &str) -> String {
    cleaned_or_original(text, try_sanitize(text))
}

fn cleaned_or_original(text: &str, outcome: Result<String, regex::Error>) -> String {
    match outcome {
        Ok(cleaned) => cleaned,
        Err(e) => {
            warn!("Response sanitizer failed, returning original text: {}", e);
            text.to_string()
        }
    }
}

/// Fallible form of [`sanitize`]. Passes are repeated until the text stops
/// changing, so the result is a fixpoint.
pub fn try_sanitize(text: &str) -> Result<String, regex::Error> {
    let mut current = text.to_string();
    loop {
        let next = sanitize_pass(&current)?;
        if next == current {
            return Ok(current);
        }
        current = next;
    }
}

fn sanitize_pass(text: &str) -> Result<String, regex::Error> {
    let cleaned = compiled(&COMPLETE_THINK)?.replace_all(text, "");
    let cleaned = compiled(&COMPLETE_ASSESSMENT)?
        .replace_all(&cleaned, "")
        .into_owned();

    if let Some(pos) = cleaned.find("<think>") {
        return Ok(truncate_at(&cleaned, pos));
    }
    if let Some(found) = compiled(&OPEN_ASSESSMENT)?.find(&cleaned) {
        return Ok(truncate_at(&cleaned, found.start()));
    }

    for pattern in STRUCTURAL_FRAGMENTS.iter() {
        if let Some(found) = compiled(pattern)?.find(&cleaned) {
            return Ok(truncate_at(&cleaned, found.start()));
        }
    }

    let region_start = assessment_region_start(&cleaned);
    for pattern in FIELD_LABEL_LINES.iter() {
        let hit = compiled(pattern)?
            .find_iter(&cleaned)
            .find(|m| m.start() >= region_start);
        if let Some(found) = hit {
            return Ok(truncate_at(&cleaned, found.start()));
        }
    }

    Ok(cleaned)
}

fn truncate_at(text: &str, pos: usize) -> String {
    text[..pos].trim_end().to_string()
}

/// Byte offset where the trailing assessment region begins.
fn assessment_region_start(text: &str) -> usize {
    let mut starts = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if !line.trim().is_empty() {
            starts.push(offset);
        }
        offset += line.len();
    }
    if starts.len() <= ASSESSMENT_REGION_LINES {
        0
    } else {
        starts[starts.len() - ASSESSMENT_REGION_LINES]
    }
}

/// Strip wrappers models add around converted or translated prompts:
/// thinking spans, markdown code fences and one introductory line.
pub fn clean_for_formatting(text: &str) -> String {
    match try_clean_for_formatting(text) {
        Ok(cleaned) => cleaned,
        Err(e) => {
            warn!("Formatting cleanup failed, returning original text: {}", e);
            text.to_string()
        }
    }
}

fn try_clean_for_formatting(text: &str) -> Result<String, regex::Error> {
    let cleaned = compiled(&COMPLETE_THINK)?.replace_all(text, "");
    let cleaned = compiled(&CODE_FENCE_OPEN)?.replace_all(&cleaned, "");
    let mut cleaned = compiled(&CODE_FENCE_CLOSE)?
        .replace_all(&cleaned, "")
        .into_owned();

    for pattern in PREAMBLES.iter() {
        let re = compiled(pattern)?;
        if re.is_match(&cleaned) {
            cleaned = re.replacen(&cleaned, 1, "").into_owned();
            break;
        }
    }
    Ok(cleaned.trim().to_string())
}

/// Value of the `DECISION: [...]` field of a complete assessment block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Continue,
    EndNow,
    Other(String),
}

impl Decision {
    fn parse(token: &str) -> Self {
        let token = token.trim().to_uppercase();
        match token.as_str() {
            "END_NOW" => Decision::EndNow,
            "CONTINUE" => Decision::Continue,
            _ => Decision::Other(token),
        }
    }
}

/// Read the decision out of the first complete `<ASSESSMENT>` block.
pub fn assessment_decision(text: &str) -> Option<Decision> {
    let body = compiled(&ASSESSMENT_BODY).ok()?.captures(text)?.get(1)?;
    let token = compiled(&DECISION_FIELD)
        .ok()?
        .captures(body.as_str())?
        .get(1)?;
    Some(Decision::parse(token.as_str()))
}

/// True only when the model explicitly asked to end the interview.
pub fn should_end_conversation(text: &str) -> bool {
    matches!(assessment_decision(text), Some(Decision::EndNow))
}
