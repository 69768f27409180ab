//! Shared utility functions for the ratchet crate.

/// Find every balanced top-level JSON object in `text`, in order of appearance.
///
/// Braces inside JSON string literals (including escaped quotes) are not
/// counted. An opening brace that never closes, such as a code fragment in
/// prose, is skipped and the scan resumes right after it. The returned slices
/// are only candidates; callers still have to parse them.
pub fn json_object_candidates(text: &str) -> Vec<&str> {
    let mut candidates = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find('{') {
        let start = pos + offset;
        match closing_brace(text, start) {
            Some(end) => {
                candidates.push(&text[start..=end]);
                pos = end + 1;
            }
            None => pos = start + 1,
        }
    }

    candidates
}

/// Byte index of the brace that closes the object opened at `start`.
fn closing_brace(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + i);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_simple() {
        assert_eq!(
            json_object_candidates(r#"{"key": "value"}"#),
            vec![r#"{"key": "value"}"#]
        );
    }

    #[test]
    fn test_candidates_with_surrounding_prose() {
        let text = r#"Here is the JSON: {"key": "value"} and some more text"#;
        assert_eq!(json_object_candidates(text), vec![r#"{"key": "value"}"#]);
    }

    #[test]
    fn test_candidates_nested_object_is_one_candidate() {
        let text = r#"{"outer": {"inner": "value"}}"#;
        assert_eq!(json_object_candidates(text), vec![text]);
    }

    #[test]
    fn test_candidates_multiple_in_order() {
        let text = r#"first {"a": 1} then {"b": 2}"#;
        assert_eq!(json_object_candidates(text), vec![r#"{"a": 1}"#, r#"{"b": 2}"#]);
    }

    #[test]
    fn test_candidates_ignore_braces_in_strings() {
        let text = r#"{"reason": "use } and { carefully \" ok"}"#;
        assert_eq!(json_object_candidates(text), vec![text]);
    }

    #[test]
    fn test_candidates_stray_closing_brace_in_prose() {
        let text = r#"oops } {"a": 1}"#;
        assert_eq!(json_object_candidates(text), vec![r#"{"a": 1}"#]);
    }

    #[test]
    fn test_candidates_no_json() {
        assert!(json_object_candidates("No JSON here").is_empty());
    }

    #[test]
    fn test_candidates_after_unclosed_code_brace() {
        let text = "I added `impl Lexer {` with a new method.\n\n{\"nextPhase\": \"END\"}";
        assert_eq!(
            json_object_candidates(text),
            vec![r#"{"nextPhase": "END"}"#]
        );
    }

    #[test]
    fn test_candidates_unclosed_quote_after_stray_brace() {
        let text = r#"fn main() { println!("hi   then {"a": 1}"#;
        assert_eq!(json_object_candidates(text), vec![r#"{"a": 1}"#]);
    }

    #[test]
    fn test_candidates_unclosed() {
        assert!(json_object_candidates(r#"{"key": "value""#).is_empty());
    }
}
