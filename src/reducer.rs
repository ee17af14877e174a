use crate::correlator;
use crate::message::{Message, MessageStatus, ToolCall};
use crate::protocol::StreamEvent;

/// What applying one event did to the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reduction {
    /// Whether any observable state changed.
    pub changed: bool,
    /// Set once the backend signalled `done`; the read loop stops.
    pub finished: bool,
}

/// Applies one stream event to the assistant message of the active turn.
///
/// `error` is the session-level error slot. Nothing here ever removes text or
/// tool calls that were already applied.
pub fn reduce(message: &mut Message, error: &mut Option<String>, event: StreamEvent) -> Reduction {
    if message.status.is_terminal() {
        return Reduction {
            changed: false,
            finished: true,
        };
    }

    let changed = match event {
        StreamEvent::ToolStart { name, args } => {
            message.tool_calls.push(ToolCall::running(name, args));
            true
        }
        StreamEvent::ToolResult {
            name,
            result,
            success,
        } => match correlator::match_result(&mut message.tool_calls, &name) {
            Some(call) => call.resolve(result, success),
            None => {
                tracing::debug!(tool = %name, "dropping tool result with no running call");
                false
            }
        },
        StreamEvent::TextDelta { content } => {
            if content.is_empty() {
                false
            } else {
                message.content.push_str(&content);
                true
            }
        }
        StreamEvent::Error { message: text } => {
            tracing::warn!(error = %text, "backend reported an error");
            *error = Some(text);
            true
        }
        StreamEvent::Done => {
            message.status = MessageStatus::Complete;
            return Reduction {
                changed: true,
                finished: true,
            };
        }
    };

    if changed && message.status == MessageStatus::NotStarted {
        message.status = MessageStatus::Streaming;
    }

    Reduction {
        changed,
        finished: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCallStatus;
    use serde_json::json;

    fn start(name: &str, args: serde_json::Value) -> StreamEvent {
        StreamEvent::ToolStart {
            name: name.to_string(),
            args,
        }
    }

    fn result(name: &str, result: serde_json::Value, success: bool) -> StreamEvent {
        StreamEvent::ToolResult {
            name: name.to_string(),
            result,
            success,
        }
    }

    fn delta(text: &str) -> StreamEvent {
        StreamEvent::TextDelta {
            content: text.to_string(),
        }
    }

    fn run(events: Vec<StreamEvent>) -> (Message, Option<String>) {
        let mut message = Message::assistant_placeholder(2);
        let mut error = None;
        for event in events {
            reduce(&mut message, &mut error, event);
        }
        (message, error)
    }

    #[test]
    fn deltas_append_in_order() {
        let (message, _) = run(vec![delta("A"), delta("B")]);
        assert_eq!(message.content, "AB");
        assert_eq!(message.status, MessageStatus::Streaming);

        let mut message = Message::assistant_placeholder(2);
        let mut error = None;
        let mut seen = String::new();
        for piece in ["Found ", "", "2 ", "rows."] {
            reduce(&mut message, &mut error, delta(piece));
            assert!(message.content.starts_with(&seen));
            seen = message.content.clone();
        }
        assert_eq!(message.content, "Found 2 rows.");
    }

    #[test]
    fn results_resolve_same_named_calls_first_in_first_out() {
        for n in 1..=5 {
            let mut events: Vec<StreamEvent> =
                (0..n).map(|i| start("X", json!({ "i": i }))).collect();
            events.extend((0..n).map(|i| result("X", json!(i), i % 2 == 0)));

            let (message, _) = run(events);
            assert_eq!(message.tool_calls.len(), n);
            for (i, call) in message.tool_calls.iter().enumerate() {
                assert_eq!(call.args, json!({ "i": i }));
                assert_eq!(call.result, Some(json!(i)));
                let expected = if i % 2 == 0 {
                    ToolCallStatus::Complete
                } else {
                    ToolCallStatus::Error
                };
                assert_eq!(call.status, expected);
            }
        }
    }

    #[test]
    fn interleaved_names_resolve_independently() {
        let (message, _) = run(vec![
            start("query", json!(1)),
            start("search", json!(2)),
            result("search", json!("hits"), true),
            start("query", json!(3)),
            result("query", json!("rows"), true),
        ]);
        let statuses: Vec<_> = message.tool_calls.iter().map(|c| c.status).collect();
        assert_eq!(
            statuses,
            vec![
                ToolCallStatus::Complete,
                ToolCallStatus::Complete,
                ToolCallStatus::Running
            ]
        );
        assert_eq!(message.tool_calls[0].result, Some(json!("rows")));
        assert_eq!(message.tool_calls[2].result, None);
    }

    #[test]
    fn orphan_result_changes_nothing() {
        let (mut message, mut error) = run(vec![start("query", json!({})), delta("so far")]);
        let before = message.clone();

        let reduction = reduce(&mut message, &mut error, result("search", json!(1), true));
        assert!(!reduction.changed);
        assert_eq!(message, before);
        assert_eq!(error, None);

        reduce(&mut message, &mut error, result("query", json!(1), true));
        let before = message.clone();
        let reduction = reduce(&mut message, &mut error, result("query", json!(2), false));
        assert!(!reduction.changed);
        assert_eq!(message, before);
    }

    #[test]
    fn orphan_result_on_fresh_placeholder_keeps_it_not_started() {
        let (message, _) = run(vec![result("query", json!(1), true)]);
        assert_eq!(message.status, MessageStatus::NotStarted);
    }

    #[test]
    fn error_event_keeps_partial_progress() {
        let (message, error) = run(vec![
            start("query", json!({})),
            delta("partial"),
            StreamEvent::Error {
                message: "rate limited".to_string(),
            },
        ]);
        assert_eq!(error.as_deref(), Some("rate limited"));
        assert_eq!(message.content, "partial");
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].status, ToolCallStatus::Running);
    }

    #[test]
    fn done_completes_and_freezes_the_message() {
        let mut message = Message::assistant_placeholder(2);
        let mut error = None;
        reduce(&mut message, &mut error, delta("hi"));
        let reduction = reduce(&mut message, &mut error, StreamEvent::Done);
        assert_eq!(
            reduction,
            Reduction {
                changed: true,
                finished: true
            }
        );
        assert_eq!(message.status, MessageStatus::Complete);

        let reduction = reduce(&mut message, &mut error, delta(" again"));
        assert!(!reduction.changed);
        assert_eq!(message.content, "hi");
    }
}
