//! Helpers for reading structured answers out of model text.

use serde_json::Value;

/// Find the JSON object a model answered with.
///
/// Accepts a bare object, an object inside a fenced code block, or an object
/// embedded in surrounding prose (first `{` to last `}`).
pub fn extract_json_object(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Some(v) = parse_object(trimmed) {
        return Some(v);
    }

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        // Skip the info string (e.g. `json`) up to the first newline.
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        if let Some(end) = body.find("```") {
            if let Some(v) = parse_object(body[..end].trim()) {
                return Some(v);
            }
        }
    }

    let open = trimmed.find('{')?;
    let close = trimmed.rfind('}')?;
    if close <= open {
        return None;
    }
    parse_object(&trimmed[open..=close])
}

fn parse_object(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(v) if v.is_object() => Some(v),
        _ => None,
    }
}

/// Read a score that may be absent or explicitly not applicable.
///
/// Numbers and numeric strings yield `Some`; `null` and "n/a"-style strings
/// yield `None`. Anything else is an error.
pub fn optional_score(value: &Value) -> Result<Option<f64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| format!("score {n} is not representable")),
        Value::String(s) => {
            let s = s.trim();
            if is_not_applicable(s) {
                return Ok(None);
            }
            s.parse::<f64>()
                .map(Some)
                .map_err(|_| format!("score {s:?} is not a number"))
        }
        other => Err(format!("score {other} is not a number")),
    }
}

fn is_not_applicable(s: &str) -> bool {
    matches!(
        s.to_ascii_lowercase().as_str(),
        "" | "n/a" | "na" | "none" | "null" | "not applicable"
    )
}

/// Text content of a trace field: strings as-is, common message shapes
/// unwrapped, anything else as compact JSON.
pub fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Object(map) => ["content", "text", "output", "answer"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extracts_bare_object() {
        assert_eq!(
            extract_json_object(r#"{"score": 1}"#),
            Some(json!({"score": 1}))
        );
    }

    #[test]
    fn test_extracts_fenced_object() {
        let text = "Here you go:\n```json\n{\"score\": 0.5, \"reason\": \"ok\"}\n```\nThanks";
        assert_eq!(extract_json_object(text).unwrap()["score"], 0.5);
    }

    #[test]
    fn test_extracts_object_in_prose() {
        let text = "My verdict is {\"overall_winner\": \"B\"} as shown.";
        assert_eq!(extract_json_object(text).unwrap()["overall_winner"], "B");
    }

    #[test]
    fn test_rejects_non_object() {
        assert!(extract_json_object("[1, 2, 3]").is_none());
        assert!(extract_json_object("no json here").is_none());
    }

    #[test]
    fn test_optional_score_variants() {
        assert_eq!(optional_score(&json!(0.25)).unwrap(), Some(0.25));
        assert_eq!(optional_score(&json!("0.75")).unwrap(), Some(0.75));
        assert_eq!(optional_score(&json!(null)).unwrap(), None);
        assert_eq!(optional_score(&json!("N/A")).unwrap(), None);
        assert_eq!(optional_score(&json!("not applicable")).unwrap(), None);
        assert!(optional_score(&json!("great")).is_err());
        assert!(optional_score(&json!([0.5])).is_err());
    }

    #[test]
    fn test_text_of_unwraps_message_shapes() {
        assert_eq!(text_of(&json!("plain")), "plain");
        assert_eq!(text_of(&json!({"content": "hello"})), "hello");
        assert_eq!(text_of(&json!({"n": 1})), "{\"n\":1}");
        assert_eq!(text_of(&json!(null)), "");
    }
}
