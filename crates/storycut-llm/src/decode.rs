//! Robust text-to-structure decoding.
//!
//! LLM responses frequently wrap their JSON in markdown fences, lead with
//! prose, or carry trailing commas. `robust_json` tries a fixed sequence of
//! recovery stages and reports `None` only when every stage fails. It never
//! panics on malformed input; callers treat `None` as a recoverable
//! per-item failure.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("valid fence regex"));

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("valid comma regex"));

/// Attempt to parse one JSON object or array out of arbitrary text.
///
/// Stages, in order, stopping at first success:
/// 1. Parse the whole string.
/// 2. Strip a fenced code block and parse the remainder.
/// 3. Slice from the first `{`/`[` to the last matching close bracket.
/// 4. Remove trailing commas before `}`/`]` and parse again.
pub fn robust_json(text: &str) -> Option<Value> {
    if text.is_empty() {
        return None;
    }

    // 1. Whole string
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }

    // 2. Markdown fence cleanup
    let cleaned = strip_fences(text);
    if let Ok(value) = serde_json::from_str(&cleaned) {
        return Some(value);
    }

    // 3. Bracket extraction (object or array, whichever starts first)
    if let Some(candidate) = bracket_slice(&cleaned) {
        if let Ok(value) = serde_json::from_str(candidate) {
            return Some(value);
        }
    }

    // 4. Trailing comma repair
    let repaired = TRAILING_COMMA.replace_all(&cleaned, "$1");
    if let Ok(value) = serde_json::from_str(repaired.as_ref()) {
        return Some(value);
    }

    None
}

fn strip_fences(text: &str) -> String {
    if !text.contains("```") {
        return text.to_string();
    }
    if let Some(captures) = FENCE.captures(text) {
        return captures[1].to_string();
    }
    // Opening fence without a closing one
    text.replace("```json", "").replace("```", "")
}

fn bracket_slice(text: &str) -> Option<&str> {
    let first_curly = text.find('{');
    let first_square = text.find('[');

    let (start, close) = match (first_curly, first_square) {
        (Some(c), Some(s)) if c < s => (c, '}'),
        (Some(c), None) => (c, '}'),
        (_, Some(s)) => (s, ']'),
        (None, None) => return None,
    };

    let end = text.rfind(close)?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json() {
        let value = robust_json(r#"{"cuts": []}"#).unwrap();
        assert!(value["cuts"].is_array());
    }

    #[test]
    fn test_array_root() {
        let value = robust_json(r#"[1, 2, 3]"#).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_markdown_fence() {
        let text = "Here is your story:\n```json\n{\"cutNumber\": 1}\n```\nEnjoy!";
        let value = robust_json(text).unwrap();
        assert_eq!(value["cutNumber"], 1);
    }

    #[test]
    fn test_bare_fence() {
        let text = "```\n{\"a\": true}\n```";
        assert_eq!(robust_json(text).unwrap()["a"], true);
    }

    #[test]
    fn test_unclosed_fence() {
        let text = "```json\n{\"a\": 1}";
        assert_eq!(robust_json(text).unwrap()["a"], 1);
    }

    #[test]
    fn test_surrounding_prose() {
        let text = "Sure! The plan is {\"chunks\": [{\"guide\": \"open\"}]} as requested.";
        let value = robust_json(text).unwrap();
        assert_eq!(value["chunks"][0]["guide"], "open");
    }

    #[test]
    fn test_array_before_object_in_prose() {
        let text = "results: [\"a\", \"b\"] -- and a stray } later";
        let value = robust_json(text).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_trailing_comma() {
        let text = r#"{"cuts": [{"cutNumber": 1},], "done": true,}"#;
        let value = robust_json(text).unwrap();
        assert_eq!(value["done"], true);
    }

    #[test]
    fn test_unparsable_is_none() {
        assert!(robust_json("no structure here at all").is_none());
        assert!(robust_json("").is_none());
        assert!(robust_json("{{{{").is_none());
    }

    #[test]
    fn test_idempotent_on_own_output() {
        let text = "```json\n{\"cuts\": [{\"cutNumber\": 1, \"description\": \"dawn\"}]}\n```";
        let first = robust_json(text).unwrap();
        let reserialized = serde_json::to_string(&first).unwrap();
        let second = robust_json(&reserialized).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_never_panics_on_noise() {
        for text in ["}{", "]]][[", "data: [DONE]", "\u{0}\u{1}", "{\"k\": }"] {
            let _ = robust_json(text);
        }
    }
}
