use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Lifecycle of a single message.
///
/// User messages are born `Complete`. An assistant placeholder starts at
/// `NotStarted` and ends in exactly one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    NotStarted,
    Streaming,
    Complete,
    Aborted,
    Failed,
}

impl MessageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Aborted | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Pending,
    Running,
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub(crate) name: String,
    pub(crate) args: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) success: Option<bool>,
    pub(crate) status: ToolCallStatus,
}

impl ToolCall {
    pub(crate) fn running(name: String, args: serde_json::Value) -> Self {
        Self {
            name,
            args,
            result: None,
            success: None,
            status: ToolCallStatus::Running,
        }
    }

    /// Records the outcome. Only a running call can resolve, and only once.
    pub(crate) fn resolve(&mut self, result: serde_json::Value, success: bool) -> bool {
        if self.status != ToolCallStatus::Running {
            return false;
        }
        self.result = Some(result);
        self.success = Some(success);
        self.status = if success {
            ToolCallStatus::Complete
        } else {
            ToolCallStatus::Error
        };
        true
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &serde_json::Value {
        &self.args
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        self.result.as_ref()
    }

    pub fn success(&self) -> Option<bool> {
        self.success
    }

    pub fn status(&self) -> ToolCallStatus {
        self.status
    }
}

/// A conversation entry. Only the session mutates messages, and `content`
/// only ever grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub(crate) id: u64,
    pub(crate) role: Role,
    pub(crate) content: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub(crate) tool_calls: Vec<ToolCall>,
    pub(crate) status: MessageStatus,
    pub(crate) timestamp: DateTime<Utc>,
}

impl Message {
    pub(crate) fn user(id: u64, content: String) -> Self {
        Self {
            id,
            role: Role::User,
            content,
            tool_calls: Vec::new(),
            status: MessageStatus::Complete,
            timestamp: Utc::now(),
        }
    }

    pub(crate) fn assistant_placeholder(id: u64) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: String::new(),
            tool_calls: Vec::new(),
            status: MessageStatus::NotStarted,
            timestamp: Utc::now(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        &self.tool_calls
    }

    pub fn status(&self) -> MessageStatus {
        self.status
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
