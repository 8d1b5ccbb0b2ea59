use super::Extraction;
use serde_json::Value;

/// Envelope keys checked in priority order.
pub const ENVELOPE_KEYS: &[&str] = &["response", "result", "output", "text", "content", "message"];

/// Answer from a single JSON object envelope: first present key in
/// [`ENVELOPE_KEYS`], with list-typed content blocks joined.
pub fn envelope_field(raw: &str) -> Extraction {
    let Some(json_str) = extract_json(raw) else {
        return Extraction::Missing;
    };
    let Ok(value) = serde_json::from_str::<Value>(&json_str) else {
        return Extraction::Missing;
    };
    let Some(object) = value.as_object() else {
        return Extraction::Missing;
    };

    for key in ENVELOPE_KEYS {
        if let Some(text) = object.get(*key).and_then(text_of) {
            return Extraction::from_text(&text);
        }
    }
    Extraction::Missing
}

/// Plain string, or the joined `text` of `[{type: "text", text}]` blocks
pub(crate) fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Array(blocks) => {
            let parts: Vec<&str> = blocks
                .iter()
                .filter_map(|block| match block {
                    Value::String(s) => Some(s.as_str()),
                    Value::Object(_) => block.get("text").and_then(|t| t.as_str()),
                    _ => None,
                })
                .filter(|s| !s.trim().is_empty())
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("\n"))
            }
        }
        _ => None,
    }
}

/// Extract a JSON object from a string that might contain markdown code blocks
/// or trailing log noise
pub fn extract_json(s: &str) -> Option<String> {
    let trimmed = s.trim();

    // First try: the whole string is valid JSON
    if trimmed.starts_with('{') && serde_json::from_str::<Value>(trimmed).is_ok() {
        return Some(trimmed.to_string());
    }

    // Second try: extract from markdown code block
    let re = regex::Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?```").ok()?;
    for cap in re.captures_iter(s) {
        let potential_json = cap.get(1)?.as_str().trim();
        if potential_json.starts_with('{')
            && serde_json::from_str::<Value>(potential_json).is_ok()
        {
            return Some(potential_json.to_string());
        }
    }

    // Third try: balanced braces starting at the first '{', respecting strings
    let brace_start = s.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut end = None;

    for (i, c) in s[brace_start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(brace_start + i + 1);
                    break;
                }
            }
            _ => {}
        }
    }

    let potential_json = &s[brace_start..end?];
    if serde_json::from_str::<Value>(potential_json).is_ok() {
        return Some(potential_json.to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_priority() {
        let raw = r#"{"result": "second", "response": "first", "stats": {}}"#;
        assert_eq!(envelope_field(raw), Extraction::Found("first".to_string()));
    }

    #[test]
    fn test_envelope_skips_empty_keys() {
        let raw = r#"{"response": "", "output": "from output"}"#;
        assert_eq!(
            envelope_field(raw),
            Extraction::Found("from output".to_string())
        );
    }

    #[test]
    fn test_envelope_content_blocks() {
        let raw = r###"{"content": [{"type": "text", "text": "# Plan"}, {"type": "text", "text": "## Overview"}]}"###;
        assert_eq!(
            envelope_field(raw),
            Extraction::Found("# Plan\n## Overview".to_string())
        );
    }

    #[test]
    fn test_envelope_with_log_noise() {
        let raw = "Loaded cached credentials.\n{\"response\": \"answer {with braces}\"}\n";
        assert_eq!(
            envelope_field(raw),
            Extraction::Found("answer {with braces}".to_string())
        );
    }

    #[test]
    fn test_envelope_missing() {
        assert_eq!(envelope_field("no json here"), Extraction::Missing);
        assert_eq!(envelope_field(r#"{"stats": {"tokens": 3}}"#), Extraction::Missing);
    }

    #[test]
    fn test_extract_json_markdown_wrapped() {
        let md = "Here:\n\n```json\n{\"response\": \"x\"}\n```\n";
        assert_eq!(extract_json(md).as_deref(), Some("{\"response\": \"x\"}"));
    }
}
