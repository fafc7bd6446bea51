use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Maximum number of characters of raw model output echoed back in error
/// bodies. Full payloads are never returned to the caller.
const SNIPPET_LIMIT: usize = 400;

static LEADING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^```json\s*").unwrap());
static TRAILING_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)```\s*$").unwrap());

/// A response that could not be turned into a usable artifact: either the
/// text was not JSON, or the parsed value failed shape validation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct NormalizeError {
    pub message: String,
    pub snippet: String,
}

/// Remove an optional leading ```json fence and trailing ``` fence
/// (case-insensitive) and surrounding whitespace.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_leading = LEADING_FENCE.replace(trimmed, "");
    TRAILING_FENCE.replace(&without_leading, "").to_string()
}

/// Parse raw model output as JSON. Stripping happens first; if the stripped
/// text fails to parse, the unstripped original is tried once more. Fenced
/// and unfenced renditions of the same JSON therefore normalize identically.
pub fn parse_artifact(raw: &str) -> Result<Value, NormalizeError> {
    let cleaned = strip_code_fences(raw);
    match serde_json::from_str(&cleaned) {
        Ok(value) => Ok(value),
        Err(_) => serde_json::from_str(raw).map_err(|e| NormalizeError {
            message: format!("Malformed JSON in model response: {e}"),
            snippet: snippet_of(raw),
        }),
    }
}

/// Presence check for collection-shaped artifacts: the top-level `key` must
/// exist and hold a non-empty array. Element types are not inspected.
pub fn require_non_empty_array(
    value: &Value,
    key: &str,
    raw: &str,
    what: &str,
) -> Result<(), NormalizeError> {
    match value.get(key).and_then(Value::as_array) {
        Some(items) if !items.is_empty() => Ok(()),
        _ => Err(NormalizeError {
            message: format!("Invalid {what} format"),
            snippet: snippet_of(raw),
        }),
    }
}

pub fn snippet_of(raw: &str) -> String {
    raw.chars().take(SNIPPET_LIMIT).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fenced_and_unfenced_parse_identically() {
        let plain = r#"{"questions": [{"question": "Q1"}]}"#;
        let fenced = format!("```json\n{plain}\n```");
        let upper_fenced = format!("```JSON\n{plain}\n```");

        let from_plain = parse_artifact(plain).unwrap();
        assert_eq!(parse_artifact(&fenced).unwrap(), from_plain);
        assert_eq!(parse_artifact(&upper_fenced).unwrap(), from_plain);
    }

    #[test]
    fn unfenced_json_survives_stripping() {
        // A bare JSON payload must not be corrupted by fence removal.
        let raw = r#"  {"title": "Intro", "chapters": [1]}  "#;
        let parsed = parse_artifact(raw).unwrap();
        assert_eq!(parsed["title"], "Intro");
    }

    #[test]
    fn trailing_fence_without_leading_is_removed() {
        let raw = "{\"Chapters\": [1, 2]}\n```";
        let parsed = parse_artifact(raw).unwrap();
        assert_eq!(parsed["Chapters"], json!([1, 2]));
    }

    #[test]
    fn unparsable_text_reports_snippet() {
        let raw = "the model apologized instead of emitting JSON";
        let err = parse_artifact(raw).unwrap_err();
        assert!(err.message.contains("Malformed JSON"));
        assert_eq!(err.snippet, raw);
    }

    #[test]
    fn snippet_is_truncated_to_400_chars() {
        let raw = "x".repeat(1000);
        let err = parse_artifact(&raw).unwrap_err();
        assert_eq!(err.snippet.chars().count(), 400);
    }

    #[test]
    fn shape_check_requires_non_empty_array() {
        let raw = r#"{"Chapters": []}"#;
        let value = parse_artifact(raw).unwrap();
        let err = require_non_empty_array(&value, "Chapters", raw, "course layout").unwrap_err();
        assert_eq!(err.message, "Invalid course layout format");

        let raw = r#"{"Chapters": "not an array"}"#;
        let value = parse_artifact(raw).unwrap();
        assert!(require_non_empty_array(&value, "Chapters", raw, "course layout").is_err());

        let raw = r#"{"Chapters": [{"ChapterName": "One"}]}"#;
        let value = parse_artifact(raw).unwrap();
        assert!(require_non_empty_array(&value, "Chapters", raw, "course layout").is_ok());
    }
}
