//! Incremental removal of `<think>…</think>` spans from streamed text.

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

/// Per-stream filter state. Create one per streaming call; never share
/// between concurrent streams.
#[derive(Debug, Default, Clone)]
pub struct ThinkTagFilter {
    carryover: String,
    inside_think: bool,
}

impl ThinkTagFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk and get back the text that is visible so far.
    ///
    /// Text that might be the beginning of an opening tag is held back until
    /// the next chunk decides it.
    pub fn filter_chunk(&mut self, chunk: &str) -> String {
        let mut buffer = std::mem::take(&mut self.carryover);
        buffer.push_str(chunk);

        let mut visible = String::new();
        let mut pos = 0;
        loop {
            let rest = &buffer[pos..];
            if self.inside_think {
                match rest.find(CLOSE_TAG) {
                    Some(idx) => {
                        self.inside_think = false;
                        pos += idx + CLOSE_TAG.len();
                    }
                    None => {
                        self.carryover = rest.to_string();
                        return visible;
                    }
                }
            } else {
                match rest.find(OPEN_TAG) {
                    Some(idx) => {
                        visible.push_str(&rest[..idx]);
                        self.inside_think = true;
                        pos += idx + OPEN_TAG.len();
                    }
                    None => {
                        let held = partial_open_tag_len(rest);
                        let split = rest.len() - held;
                        visible.push_str(&rest[..split]);
                        self.carryover = rest[split..].to_string();
                        return visible;
                    }
                }
            }
        }
    }

    /// Release text held back as a possible tag prefix once the stream has ended.
    ///
    /// Inside an unterminated span nothing is released; the state stays
    /// suppressed until [`reset`](Self::reset).
    pub fn flush(&mut self) -> String {
        if self.inside_think {
            return String::new();
        }
        std::mem::take(&mut self.carryover)
    }

    pub fn reset(&mut self) {
        self.carryover.clear();
        self.inside_think = false;
    }

    pub fn is_inside_think(&self) -> bool {
        self.inside_think
    }
}

/// Length of the longest proper prefix of `<think>` that `text` ends with.
fn partial_open_tag_len(text: &str) -> usize {
    (1..OPEN_TAG.len())
        .rev()
        .find(|&len| text.ends_with(&OPEN_TAG[..len]))
        .unwrap_or(0)
}
