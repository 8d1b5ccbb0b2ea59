//! Answer extraction from raw agent output.
//!
//! Each agent kind composes a short, ordered list of extractors; the first
//! one that finds an answer wins.

mod events;
mod json;

pub use events::{claude_last_result, codex_completion, codex_last_agent_message};
pub use json::{envelope_field, extract_json, ENVELOPE_KEYS};

/// Outcome of one extraction strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Found(String),
    Missing,
}

impl Extraction {
    pub fn is_found(&self) -> bool {
        matches!(self, Extraction::Found(_))
    }

    /// Wrap non-blank text
    pub(crate) fn from_text(text: &str) -> Self {
        if text.trim().is_empty() {
            Extraction::Missing
        } else {
            Extraction::Found(text.to_string())
        }
    }
}

pub type Extractor = fn(&str) -> Extraction;

/// Run extractors in order, first match wins
pub fn first_found(raw: &str, extractors: &[Extractor]) -> Extraction {
    for extractor in extractors {
        if let found @ Extraction::Found(_) = extractor(raw) {
            return found;
        }
    }
    Extraction::Missing
}
