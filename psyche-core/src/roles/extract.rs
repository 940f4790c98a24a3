//! JSON extraction from model replies.
//!
//! The shims expect a JSON object somewhere in the reply text. The scanner
//! finds the first balanced `{ ... }`, tracking string literals and escape
//! sequences so braces inside strings do not confuse the depth count. The
//! extracted slice is parsed against the operation's serde schema; a
//! mismatch surfaces as `Parse`, which callers downgrade to idle/failure
//! results.

use serde::de::DeserializeOwned;

use crate::error::{PsycheError, Result};

/// First balanced JSON object in the text, if any.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract and parse the reply's payload.
pub fn parse_payload<T: DeserializeOwned>(text: &str) -> Result<T> {
    let object = extract_json_object(text)
        .ok_or_else(|| PsycheError::Parse("no JSON object in reply".to_string()))?;
    serde_json::from_str(object).map_err(|e| PsycheError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    struct Reply {
        action: String,
    }

    #[test]
    fn test_extracts_from_surrounding_prose() {
        let text = "Sure, here is my decision:\n{\"action\": \"dispatch\"}\nDone.";
        let reply: Reply = parse_payload(text).unwrap();
        assert_eq!(reply.action, "dispatch");
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let text = r#"{"action": "converse", "note": "use {braces} freely \" here"}"#;
        let object = extract_json_object(text).unwrap();
        assert_eq!(object, text);
    }

    #[test]
    fn test_nested_objects_balance() {
        let text = r#"prefix {"a": {"b": {"c": 1}}} suffix {"second": true}"#;
        let object = extract_json_object(text).unwrap();
        assert_eq!(object, r#"{"a": {"b": {"c": 1}}}"#);
    }

    #[test]
    fn test_no_object_is_parse_error() {
        let err = parse_payload::<Reply>("just prose, no JSON").unwrap_err();
        assert!(matches!(err, PsycheError::Parse(_)));
    }

    #[test]
    fn test_schema_mismatch_is_parse_error() {
        let err = parse_payload::<Reply>(r#"{"unrelated": 1}"#).unwrap_err();
        assert!(matches!(err, PsycheError::Parse(_)));
    }

    #[test]
    fn test_unterminated_object_yields_none() {
        assert!(extract_json_object(r#"{"a": 1"#).is_none());
    }
}
