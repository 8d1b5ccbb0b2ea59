use super::json::text_of;
use super::Extraction;
use serde_json::Value;

/// Parse every line that holds a JSON value, skipping log noise
fn json_lines(raw: &str) -> impl Iterator<Item = Value> + '_ {
    raw.lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{') || line.starts_with('['))
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
}

fn event_type(event: &Value) -> Option<&str> {
    event.get("type").and_then(|t| t.as_str())
}

/// Codex events sometimes nest the payload under `msg`
fn codex_payload(event: &Value) -> &Value {
    event.get("msg").unwrap_or(event)
}

fn is_agent_item(item: &Value) -> bool {
    matches!(event_type(item), Some("agent_message") | Some("assistant_message"))
}

/// First completion event in a Codex JSONL stream, scanning from the start.
pub fn codex_completion(raw: &str) -> Extraction {
    for event in json_lines(raw) {
        let payload = codex_payload(&event);
        let text = match event_type(payload) {
            Some("task_complete") | Some("turn.completed") | Some("turn_complete") => payload
                .get("last_agent_message")
                .or_else(|| payload.get("message"))
                .and_then(text_of),
            Some("item.completed") => payload
                .get("item")
                .filter(|item| is_agent_item(item))
                .and_then(|item| item.get("text").or_else(|| item.get("content")))
                .and_then(text_of),
            _ => None,
        };
        if let Some(text) = text {
            return Extraction::from_text(&text);
        }
    }
    Extraction::Missing
}

/// Last agent message seen anywhere in a Codex stream.
pub fn codex_last_agent_message(raw: &str) -> Extraction {
    let mut last = None;
    for event in json_lines(raw) {
        let payload = codex_payload(&event);
        let text = match event_type(payload) {
            Some("agent_message") => payload.get("message").and_then(text_of),
            Some("item.updated") | Some("item.completed") => payload
                .get("item")
                .filter(|item| is_agent_item(item))
                .and_then(|item| item.get("text"))
                .and_then(text_of),
            _ => None,
        };
        if text.is_some() {
            last = text;
        }
    }
    last.map(|t| Extraction::from_text(&t))
        .unwrap_or(Extraction::Missing)
}

/// Last `result` event of a Claude JSON event array, scanning from the end.
pub fn claude_last_result(raw: &str) -> Extraction {
    let events: Vec<Value> = match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Array(events)) => events,
        Ok(event @ Value::Object(_)) => vec![event],
        _ => json_lines(raw)
            .flat_map(|value| match value {
                Value::Array(events) => events,
                other => vec![other],
            })
            .collect(),
    };

    events
        .iter()
        .rev()
        .filter(|event| event_type(event) == Some("result"))
        .find_map(|event| event.get("result").and_then(|r| r.as_str()))
        .map(Extraction::from_text)
        .unwrap_or(Extraction::Missing)
}
