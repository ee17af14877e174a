use serde::{Deserialize, Serialize};

use crate::message::Role;

/// Body of the POST that opens a chat stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

/// One event carried by a `data:` frame of the response body.
///
/// The backend sends no per-call identifier, so `ToolResult` can only be
/// matched to its `ToolStart` by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    ToolStart {
        name: String,
        #[serde(default)]
        args: serde_json::Value,
    },
    ToolResult {
        name: String,
        #[serde(default)]
        result: serde_json::Value,
        #[serde(default)]
        success: bool,
    },
    TextDelta { content: String },
    Error { message: String },
    Done,
}

impl StreamEvent {
    /// Parses a raw frame. Anything that is not a `data:` frame holding a
    /// known event is dropped.
    pub fn from_frame(frame: &str) -> Option<Self> {
        let data = extract_sse_data(frame)?;
        match serde_json::from_str::<StreamEvent>(&data) {
            Ok(event) => Some(event),
            Err(err) => {
                tracing::debug!(error = %err, payload = %data, "dropping unparseable frame");
                None
            }
        }
    }
}

fn extract_sse_data(raw: &str) -> Option<String> {
    let mut data_lines = Vec::new();
    for line in raw.lines() {
        if let Some(data) = line.strip_prefix("data:") {
            data_lines.push(data.strip_prefix(' ').unwrap_or(data));
        }
    }

    if data_lines.is_empty() {
        tracing::debug!(frame = %raw, "dropping frame without data");
        None
    } else {
        Some(data_lines.join("\n"))
    }
}
