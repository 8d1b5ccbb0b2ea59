//! Plan and judge document contracts: required section headers and validation.

use crate::error::ConfigError;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_PLAN_TEMPLATE: &str = include_str!("../templates/plan.md");
pub const DEFAULT_JUDGE_TEMPLATE: &str = include_str!("../templates/judge.md");

pub const PLAN_HEADERS: &[&str] = &[
    "# Plan",
    "## Overview",
    "## Scope",
    "## Phases",
    "## Testing Strategy",
    "## Risks",
    "## Rollback Plan",
    "## Edge Cases",
];

pub const JUDGE_HEADERS: &[&str] = &[
    "# Judge Report",
    "## Scores",
    "## Comparative Analysis",
    "## Missing Steps",
    "## Contradictions",
    "## Improvements",
    "## Final Plan",
];

/// Result of checking a document against a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub ok: bool,
    pub error: Option<String>,
    pub missing: Vec<String>,
}

/// Every required header must appear somewhere in `text`, in any order.
pub fn validate<S: AsRef<str>>(text: &str, required_headers: &[S]) -> Validation {
    let missing: Vec<String> = required_headers
        .iter()
        .map(|h| h.as_ref())
        .filter(|header| !text.contains(header))
        .map(str::to_string)
        .collect();

    if missing.is_empty() {
        Validation {
            ok: true,
            error: None,
            missing,
        }
    } else {
        Validation {
            ok: false,
            error: Some(format!("Missing required headers: {}", missing.join(", "))),
            missing,
        }
    }
}

/// Level-1 and level-2 headers of a template, in order
pub fn required_headers(template: &str) -> Vec<String> {
    template
        .lines()
        .map(str::trim_end)
        .filter(|line| {
            let hashes = line.chars().take_while(|c| *c == '#').count();
            (1..=2).contains(&hashes) && line[hashes..].starts_with(' ') && line.len() > hashes + 1
        })
        .map(str::to_string)
        .collect()
}

/// Plan and judge templates plus the headers each contract requires.
#[derive(Debug, Clone)]
pub struct Templates {
    pub plan: String,
    pub judge: String,
    plan_headers: Vec<String>,
    judge_headers: Vec<String>,
}

impl Default for Templates {
    fn default() -> Self {
        Self::new(DEFAULT_PLAN_TEMPLATE.to_string(), DEFAULT_JUDGE_TEMPLATE.to_string())
    }
}

impl Templates {
    pub fn new(plan: String, judge: String) -> Self {
        let plan_headers = headers_or(&plan, PLAN_HEADERS);
        let judge_headers = headers_or(&judge, JUDGE_HEADERS);
        Self {
            plan,
            judge,
            plan_headers,
            judge_headers,
        }
    }

    /// Load overrides from disk; missing overrides fall back to the embedded templates
    pub fn load(plan: Option<&Path>, judge: Option<&Path>) -> Result<Self, ConfigError> {
        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })
        };

        let plan = match plan {
            Some(path) => read(path)?,
            None => DEFAULT_PLAN_TEMPLATE.to_string(),
        };
        let judge = match judge {
            Some(path) => read(path)?,
            None => DEFAULT_JUDGE_TEMPLATE.to_string(),
        };
        Ok(Self::new(plan, judge))
    }

    pub fn plan_headers(&self) -> &[String] {
        &self.plan_headers
    }

    pub fn judge_headers(&self) -> &[String] {
        &self.judge_headers
    }
}

fn headers_or(template: &str, fallback: &[&str]) -> Vec<String> {
    let headers = required_headers(template);
    if headers.is_empty() {
        debug!("Template has no headers, using built-in contract");
        fallback.iter().map(|h| h.to_string()).collect()
    } else {
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_plan() -> String {
        PLAN_HEADERS
            .iter()
            .rev()
            .map(|h| format!("{}\ncontent\n", h))
            .collect()
    }

    #[test]
    fn test_all_headers_any_order() {
        let result = validate(&full_plan(), PLAN_HEADERS);
        assert!(result.ok);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_headers_anywhere_in_text() {
        let text = format!("preamble {} trailing", PLAN_HEADERS.join(" "));
        assert!(validate(&text, PLAN_HEADERS).ok);
    }

    #[test]
    fn test_every_missing_header_is_named() {
        for skip in PLAN_HEADERS.iter().skip(1) {
            let text: String = PLAN_HEADERS
                .iter()
                .filter(|h| h != &skip)
                .map(|h| format!("{}\n", h))
                .collect();
            let result = validate(&text, PLAN_HEADERS);
            assert!(!result.ok, "{} should be missing", skip);
            assert!(result.error.unwrap().contains(skip));
        }
    }

    #[test]
    fn test_error_lists_all_missing() {
        let result = validate("# Judge Report\n## Scores\n", JUDGE_HEADERS);
        assert!(!result.ok);
        assert_eq!(result.missing.len(), 5);
        let error = result.error.unwrap();
        for header in &JUDGE_HEADERS[2..] {
            assert!(error.contains(header));
        }
    }

    #[test]
    fn test_embedded_templates_match_contracts() {
        let templates = Templates::default();
        assert_eq!(templates.plan_headers(), PLAN_HEADERS);
        assert_eq!(templates.judge_headers(), JUDGE_HEADERS);
    }

    #[test]
    fn test_required_headers_ignores_deeper_levels() {
        let template = "# Doc\n### Detail\n## Part\n#NoSpace\n##\n";
        assert_eq!(required_headers(template), vec!["# Doc", "## Part"]);
    }

    #[test]
    fn test_headerless_template_falls_back() {
        let templates = Templates::new("free prose".to_string(), String::new());
        assert_eq!(templates.plan_headers(), PLAN_HEADERS);
        assert_eq!(templates.judge_headers(), JUDGE_HEADERS);
    }
}
