use crate::message::{ToolCall, ToolCallStatus};

/// Finds the call a `tool_result` named `name` belongs to: the oldest call
/// with that name that is still running.
///
/// Results for same-named calls that the backend finishes out of order are
/// attributed in start order; the wire format gives nothing better to go on.
pub fn match_result<'a>(calls: &'a mut [ToolCall], name: &str) -> Option<&'a mut ToolCall> {
    calls
        .iter_mut()
        .find(|call| call.status == ToolCallStatus::Running && call.name == name)
}
