//! Tool argument structuring.
//!
//! Tool arguments stream in as raw text fragments. After every fragment the
//! whole buffer is re-parsed so the feed can show structured arguments as soon
//! as they become valid JSON. Malformed text never fails; it degrades to an
//! `{"input": <raw>}` wrapper.

use serde_json::{Map, Value};

/// Key used for the raw-text fallback.
pub const RAW_INPUT_KEY: &str = "input";

/// Derive structured args from the accumulated raw argument text.
///
/// Tries, in order: the whole string, the outermost `{...}` substring, the
/// outermost `[...]` substring. When all fail, returns `{"input": raw}` merged
/// over the previously known object fields (minus any earlier `input`).
pub fn structure_args(raw: &str, previous: Option<&Value>) -> Value {
    if let Some(parsed) = parse_json(raw) {
        return parsed;
    }
    if let Some(parsed) = outermost(raw, '{', '}').and_then(parse_json) {
        return parsed;
    }
    if let Some(parsed) = outermost(raw, '[', ']').and_then(parse_json) {
        return parsed;
    }

    let mut fallback = match previous {
        Some(Value::Object(prev)) => prev
            .iter()
            .filter(|(key, _)| key.as_str() != RAW_INPUT_KEY)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        _ => Map::new(),
    };
    fallback.insert(RAW_INPUT_KEY.to_string(), Value::String(raw.to_string()));
    Value::Object(fallback)
}

/// Merge `incoming` args over `existing`.
///
/// Object fields are merged key by key with `incoming` winning; any other
/// combination replaces `existing` outright.
pub fn merge_args(existing: Option<Value>, incoming: Value) -> Value {
    match (existing, incoming) {
        (Some(Value::Object(mut base)), Value::Object(extra)) => {
            base.extend(extra);
            Value::Object(base)
        }
        (_, incoming) => incoming,
    }
}

fn parse_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

fn outermost(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_whole_string_parses() {
        assert_eq!(structure_args(r#"{"cmd":"ls"}"#, None), json!({"cmd": "ls"}));
        assert_eq!(structure_args("  [1, 2] ", None), json!([1, 2]));
    }

    #[test]
    fn test_embedded_object() {
        let raw = r#"Calling with {"path": "/tmp"} now"#;
        assert_eq!(structure_args(raw, None), json!({"path": "/tmp"}));
    }

    #[test]
    fn test_embedded_array() {
        let raw = r#"args: ["a", "b"] end"#;
        assert_eq!(structure_args(raw, None), json!(["a", "b"]));
    }

    #[test]
    fn test_partial_falls_back_to_input() {
        assert_eq!(
            structure_args(r#"{"cmd":"#, None),
            json!({"input": "{\"cmd\":"})
        );
        assert_eq!(structure_args("", None), json!({"input": ""}));
    }

    #[test]
    fn test_fallback_keeps_known_fields() {
        let previous = json!({"path": "/tmp", "input": "stale"});
        assert_eq!(
            structure_args(r#"{"path": "/tmp", "mode": "#, Some(&previous)),
            json!({"path": "/tmp", "input": "{\"path\": \"/tmp\", \"mode\": "})
        );
    }

    #[test]
    fn test_fallback_ignores_non_object_previous() {
        let previous = json!(["x"]);
        assert_eq!(structure_args("nope", Some(&previous)), json!({"input": "nope"}));
    }

    #[test]
    fn test_merge_args() {
        assert_eq!(
            merge_args(Some(json!({"a": 1, "b": 2})), json!({"b": 3, "c": 4})),
            json!({"a": 1, "b": 3, "c": 4})
        );
        assert_eq!(merge_args(Some(json!({"a": 1})), json!([1])), json!([1]));
        assert_eq!(merge_args(None, json!({"a": 1})), json!({"a": 1}));
    }
}
