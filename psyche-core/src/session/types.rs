//! Typed message stream shared by every launcher implementation.
//!
//! Sessions emit newline-delimited JSON messages of three shapes: a system
//! init message, assistant messages carrying content blocks, and a final
//! result message. Each message projects to a flat `ProcessLogEntry` for
//! the observer callback.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionMessage {
    System {
        #[serde(default)]
        subtype: String,
    },
    Assistant {
        #[serde(default)]
        content: Vec<ContentBlock>,
    },
    Result {
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        is_error: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Thinking {
        thinking: String,
    },
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryKind {
    System,
    Thinking,
    Text,
    ToolUse,
    ToolResult,
    Result,
}

/// Flat projection of one stream message, handed to `on_log` observers.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessLogEntry {
    #[serde(rename = "type")]
    pub kind: LogEntryKind,
    pub content: String,
}

impl SessionMessage {
    /// Project this message into observer entries.
    pub fn log_entries(&self) -> Vec<ProcessLogEntry> {
        match self {
            SessionMessage::System { subtype } => vec![ProcessLogEntry {
                kind: LogEntryKind::System,
                content: subtype.clone(),
            }],
            SessionMessage::Assistant { content } => content
                .iter()
                .map(|block| match block {
                    ContentBlock::Thinking { thinking } => ProcessLogEntry {
                        kind: LogEntryKind::Thinking,
                        content: thinking.clone(),
                    },
                    ContentBlock::Text { text } => ProcessLogEntry {
                        kind: LogEntryKind::Text,
                        content: text.clone(),
                    },
                    ContentBlock::ToolUse { name, input, .. } => ProcessLogEntry {
                        kind: LogEntryKind::ToolUse,
                        content: format!("{name} {input}"),
                    },
                    ContentBlock::ToolResult { content, .. } => ProcessLogEntry {
                        kind: LogEntryKind::ToolResult,
                        content: content.to_string(),
                    },
                })
                .collect(),
            SessionMessage::Result { result, error, .. } => {
                let content = error
                    .clone()
                    .or_else(|| result.clone())
                    .unwrap_or_default();
                vec![ProcessLogEntry {
                    kind: LogEntryKind::Result,
                    content,
                }]
            }
        }
    }

    /// Concatenated text of assistant text blocks, empty otherwise.
    pub fn text(&self) -> String {
        match self {
            SessionMessage::Assistant { content } => content
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
            _ => String::new(),
        }
    }
}
