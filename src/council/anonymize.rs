//! Identity scrubbing and label shuffling for the judge's view of the plans.

use super::planning::ValidPlan;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use regex::Regex;
use tracing::debug;

pub const REDACTED: &str = "[redacted]";

/// Vendor, model and trace vocabulary that could reveal which agent wrote a plan.
const IDENTITY_PATTERNS: &[&str] = &[
    // trace identifiers together with their values
    r#"(?i)\b(?:thread|session|conversation|request|trace)[_-]?id\b["']?\s*[:=]\s*["']?[\w.-]+["']?"#,
    r"(?i)\b(?:thread|session|conversation|request|trace)_id\b",
    r"(?i)\b(?:openai|anthropic|google|deepmind)\b",
    r"(?i)\b(?:chatgpt|codex|claude|gemini|bard|copilot)(?:[-_][\w.]+)*\b",
    r"(?i)\bgpt[-_]?\d[\w.-]*",
    r"(?i)\bgpt\b",
    r"(?i)\bo[134](?:-[a-z0-9][\w.]*)?\b",
    r"(?i)\b(?:sonnet|opus|haiku)(?:[-_][\w.]+)*\b",
];

/// Replaces identity tokens with `[redacted]`.
///
/// Scrubbing is idempotent: no pattern matches the replacement text.
#[derive(Debug, Clone)]
pub struct Anonymizer {
    patterns: Vec<Regex>,
}

impl Anonymizer {
    /// Fixed vocabulary plus the names of this run's agents
    pub fn new<S: AsRef<str>>(agent_names: &[S]) -> Self {
        let mut patterns: Vec<Regex> = IDENTITY_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();

        for name in agent_names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            match name_pattern(name) {
                Some(re) if !re.is_match(REDACTED) => patterns.push(re),
                _ => debug!("Not scrubbing agent name '{}'", name),
            }
        }

        Self { patterns }
    }

    pub fn scrub(&self, text: &str) -> String {
        self.patterns
            .iter()
            .fold(text.to_string(), |acc, re| {
                re.replace_all(&acc, REDACTED).into_owned()
            })
    }
}

/// True when scrubbing `name` would also rewrite `[redacted]`, so the name cannot be hidden.
///
/// Rosters reject such names up front.
pub fn collides_with_redaction(name: &str) -> bool {
    name_pattern(name.trim()).is_some_and(|re| re.is_match(REDACTED))
}

/// Case-insensitive literal match, bounded where the name starts or ends with a word character
fn name_pattern(name: &str) -> Option<Regex> {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let start = if name.starts_with(is_word) { r"\b" } else { "" };
    let end = if name.ends_with(is_word) { r"\b" } else { "" };
    Regex::new(&format!("(?i){}{}{}", start, regex::escape(name), end)).ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledPlan {
    pub label: String,
    pub text: String,
}

/// Plans as the judge sees them, plus the label to agent mapping kept for bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct AnonymizedSet {
    pub plans: Vec<LabeledPlan>,
    pub mapping: Vec<(String, String)>,
}

impl AnonymizedSet {
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn agent_for(&self, label: &str) -> Option<&str> {
        self.mapping
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, agent)| agent.as_str())
    }
}

/// Scrub every plan, shuffle, then label `Plan 1..n` in shuffled order
pub fn anonymize_and_shuffle<R: Rng + ?Sized>(
    plans: &[ValidPlan],
    anonymizer: &Anonymizer,
    rng: &mut R,
) -> AnonymizedSet {
    let mut scrubbed: Vec<(String, String)> = plans
        .iter()
        .map(|plan| (plan.agent.clone(), anonymizer.scrub(&plan.text)))
        .collect();
    scrubbed.shuffle(rng);

    let mut set = AnonymizedSet::default();
    for (idx, (agent, text)) in scrubbed.into_iter().enumerate() {
        let label = format!("Plan {}", idx + 1);
        set.mapping.push((label.clone(), agent));
        set.plans.push(LabeledPlan { label, text });
    }
    set
}

pub fn shuffle_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
