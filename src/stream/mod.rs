//! Wire format of the agent CLI's `stream-json` output.
//!
//! Each stdout line is one JSON event. [`decode_line`] turns a line into the
//! loop's own [`SessionEvent`]s; anything that is not a recognised event is
//! kept as a text fragment so no agent output is lost.

use serde::Deserialize;
use serde_json::Value;

use crate::agent::SessionEvent;

/// Events from the agent CLI's stream-json output format
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "assistant")]
    Assistant {
        message: AssistantMessage,
        #[serde(default)]
        session_id: String,
    },

    #[serde(rename = "user")]
    User {},

    #[serde(rename = "result")]
    Result {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
    },

    #[serde(rename = "system")]
    System {
        #[serde(default)]
        subtype: String,
    },
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "tool_use")]
    ToolUse {
        name: String,
        input: Value,
        #[serde(default)]
        id: String,
    },

    #[serde(rename = "text")]
    Text { text: String },

    #[serde(other)]
    Other,
}

/// Decode one stdout line into zero or more session events.
pub fn decode_line(line: &str) -> Vec<SessionEvent> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }

    let event = match serde_json::from_str::<StreamEvent>(line) {
        Ok(event) => event,
        // Not a stream event, might be stderr or other output
        Err(_) => return vec![SessionEvent::Fragment(line.to_string())],
    };

    match event {
        StreamEvent::Assistant { message, .. } => message
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(SessionEvent::Fragment(text)),
                ContentBlock::ToolUse { name, input, .. } => Some(SessionEvent::Progress {
                    tool: name.clone(),
                    description: describe_tool_use(&name, &input),
                }),
                ContentBlock::Other => None,
            })
            .collect(),
        StreamEvent::Result {
            result,
            is_error,
            subtype,
            ..
        } => vec![SessionEvent::Finished {
            success: !is_error,
            result,
            detail: subtype,
        }],
        StreamEvent::User { .. } | StreamEvent::System { .. } => Vec::new(),
    }
}

/// Extract a human-readable description from a tool use event
pub fn describe_tool_use(name: &str, input: &Value) -> String {
    let field = |key: &str| input.get(key).and_then(|v| v.as_str());
    match name {
        "Read" => format!(
            "Reading: {}",
            field("file_path").map(shorten_path).unwrap_or_else(|| "file".into())
        ),
        "Write" => format!(
            "Creating: {}",
            field("file_path").map(shorten_path).unwrap_or_else(|| "file".into())
        ),
        "Edit" => format!(
            "Editing: {}",
            field("file_path").map(shorten_path).unwrap_or_else(|| "file".into())
        ),
        "Bash" => format!(
            "Running: {}",
            field("command")
                .map(|s| truncate_str(s, 40))
                .unwrap_or_else(|| "command".into())
        ),
        "Glob" => format!("Searching: {}", field("pattern").unwrap_or("*")),
        "Grep" => format!(
            "Grep: {}",
            field("pattern")
                .map(|s| truncate_str(s, 30))
                .unwrap_or_else(|| "pattern".into())
        ),
        _ => name.to_string(),
    }
}

/// Get an emoji for a tool
pub fn tool_emoji(name: &str) -> &'static str {
    match name {
        "Read" => "\u{1F4D6}",
        "Write" => "\u{1F4DD}",
        "Edit" => "\u{270F}\u{FE0F}",
        "Bash" => "\u{2699}\u{FE0F}",
        "Glob" => "\u{1F50D}",
        "Grep" => "\u{1F50E}",
        _ => "\u{1F527}",
    }
}

/// Shorten a file path to just the last 2 components
fn shorten_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() <= 2 {
        path.to_string()
    } else {
        parts[parts.len() - 2..].join("/")
    }
}

/// Truncate a string with ellipsis, respecting char boundaries
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

/// First line of a text fragment, truncated for narration
pub fn snippet(text: &str, max_len: usize) -> String {
    let first_line = text.lines().next().unwrap_or(text);
    truncate_str(first_line.trim(), max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_assistant_text_and_tool_use() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Looking around"},{"type":"tool_use","name":"Read","input":{"file_path":"/foo/src/bar.rs"},"id":"1"}]},"session_id":"abc"}"#;
        let events = decode_line(line);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], SessionEvent::Fragment("Looking around".into()));
        match &events[1] {
            SessionEvent::Progress { tool, description } => {
                assert_eq!(tool, "Read");
                assert_eq!(description, "Reading: src/bar.rs");
            }
            other => panic!("Expected Progress, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_result_success() {
        let line = r#"{"type":"result","subtype":"success","result":"done","is_error":false,"num_turns":4}"#;
        assert_eq!(
            decode_line(line),
            vec![SessionEvent::Finished {
                success: true,
                result: Some("done".into()),
                detail: "success".into(),
            }]
        );
    }

    #[test]
    fn test_decode_result_error() {
        let line = r#"{"type":"result","subtype":"error_max_turns","is_error":true}"#;
        match &decode_line(line)[0] {
            SessionEvent::Finished { success, detail, .. } => {
                assert!(!success);
                assert_eq!(detail, "error_max_turns");
            }
            other => panic!("Expected Finished, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_ignores_user_and_system_events() {
        assert!(decode_line(r#"{"type":"system","subtype":"init"}"#).is_empty());
        assert!(decode_line(r#"{"type":"user","message":{}}"#).is_empty());
        assert!(decode_line("   ").is_empty());
    }

    #[test]
    fn test_decode_non_json_is_fragment() {
        assert_eq!(
            decode_line("warning: something odd"),
            vec![SessionEvent::Fragment("warning: something odd".into())]
        );
    }

    #[test]
    fn test_decode_skips_unknown_content_blocks() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"thinking","thinking":"hmm"}]}}"#;
        assert!(decode_line(line).is_empty());
    }

    #[test]
    fn test_describe_tool_use() {
        let input = serde_json::json!({"file_path": "/Users/foo/project/src/main.rs"});
        assert_eq!(describe_tool_use("Read", &input), "Reading: src/main.rs");

        let input = serde_json::json!({"command": "cargo test --release"});
        assert_eq!(
            describe_tool_use("Bash", &input),
            "Running: cargo test --release"
        );
    }

    #[test]
    fn test_snippet_is_char_safe() {
        let text = "ééééééééééééééééééééé\nsecond line";
        let s = snippet(text, 10);
        assert!(s.ends_with("..."));
        assert_eq!(s.chars().count(), 10);
    }
}
