use serde_json::{Map, Value};
use tracing::debug;

/// Recovers the first JSON object from free model text.
///
/// Language models wrap JSON in prose or Markdown fences often enough that the
/// raw reply cannot be handed to `serde_json` directly. Tries, in order: the whole
/// text, a fenced ```json block, any fenced block, then the outermost `{...}` span.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let trimmed = text.trim().trim_matches('\u{feff}');

    let candidates = [
        Some(trimmed),
        fenced_block(trimmed, "```json"),
        fenced_block(trimmed, "```"),
        brace_span(trimmed),
    ];

    for candidate in candidates.into_iter().flatten() {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate.trim()) {
            return Some(map);
        }
    }

    debug!("No JSON object found in model output ({} chars)", trimmed.len());
    None
}

fn fenced_block<'a>(text: &'a str, fence: &str) -> Option<&'a str> {
    let start = text.find(fence)? + fence.len();
    let end = text[start..].find("```")?;
    Some(&text[start..start + end])
}

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Reads a number that may have been emitted as a string; `"80%"` reads as 0.8.
pub fn as_lenient_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_suffix('%') {
                Some(pct) => pct.trim().parse::<f64>().ok().map(|n| n / 100.0),
                None => s.parse::<f64>().ok(),
            }
        }
        _ => None,
    }
    .filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_object() {
        let map = extract_json_object(r#"{"fields": {"age": 40}}"#).unwrap();
        assert_eq!(map["fields"]["age"], json!(40));
    }

    #[test]
    fn test_fenced_object_with_prose() {
        let text = "Sure! Here is the result:\n```json\n{\"confidence\": 0.8}\n```\nLet me know.";
        let map = extract_json_object(text).unwrap();
        assert_eq!(map["confidence"], json!(0.8));
    }

    #[test]
    fn test_brace_span_inside_prose() {
        let text = "The extraction is {\"rationale\": \"ok\"} as requested";
        let map = extract_json_object(text).unwrap();
        assert_eq!(map["rationale"], json!("ok"));
    }

    #[test]
    fn test_arrays_and_garbage_are_rejected() {
        assert!(extract_json_object("[1, 2, 3]").is_none());
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("").is_none());
    }

    #[test]
    fn test_lenient_numbers() {
        assert_eq!(as_lenient_f64(&json!("0.75")), Some(0.75));
        assert_eq!(as_lenient_f64(&json!(" 80% ")), Some(0.8));
        assert_eq!(as_lenient_f64(&json!(3)), Some(3.0));
        assert_eq!(as_lenient_f64(&json!(true)), None);
        assert_eq!(as_lenient_f64(&json!("NaN")), None);
    }
}
