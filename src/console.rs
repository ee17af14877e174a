//! Plain-text rendering of a session for terminal hosts.

use crate::message::{MessageStatus, Role, ToolCallStatus};
use crate::session::ChatState;
use std::collections::HashMap;

const ARGS_LIMIT: usize = 200;
const RESULT_LIMIT: usize = 300;

#[derive(Debug, Default, Clone)]
struct Printed {
    text_len: usize,
    calls_started: usize,
    calls_resolved: Vec<bool>,
    finished: bool,
}

/// Turns successive snapshots into the text that appeared since the last one.
#[derive(Debug, Default)]
pub struct Transcript {
    printed: HashMap<u64, Printed>,
    error: Option<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, state: &ChatState) -> String {
        let mut out = String::new();
        self.printed
            .retain(|id, _| state.messages().iter().any(|m| m.id() == *id));

        for message in state.messages().iter().filter(|m| m.role() == Role::Assistant) {
            let printed = self.printed.entry(message.id()).or_default();
            if printed.finished {
                continue;
            }

            for call in &message.tool_calls()[printed.calls_started..] {
                let args = serde_json::to_string(call.args()).unwrap_or_default();
                out.push_str(&format!(
                    "\ntool: {}({})\n",
                    call.name(),
                    truncate(&args, ARGS_LIMIT, "...")
                ));
                printed.calls_resolved.push(false);
            }
            printed.calls_started = message.tool_calls().len();

            for (call, resolved) in message.tool_calls().iter().zip(&mut printed.calls_resolved) {
                if *resolved || call.status() == ToolCallStatus::Running {
                    continue;
                }
                *resolved = true;
                let result = call
                    .result()
                    .map(|value| serde_json::to_string(value).unwrap_or_default())
                    .unwrap_or_default();
                let label = if call.status() == ToolCallStatus::Error {
                    "failed"
                } else {
                    "result"
                };
                out.push_str(&format!(
                    "→ {} {}: {}\n",
                    call.name(),
                    label,
                    truncate(&result, RESULT_LIMIT, "...[output truncated]")
                ));
            }

            let content = message.content();
            if content.len() > printed.text_len {
                out.push_str(&content[printed.text_len..]);
                printed.text_len = content.len();
            }

            if message.status().is_terminal() {
                printed.finished = true;
                match message.status() {
                    MessageStatus::Aborted => out.push_str("\n[stopped]\n"),
                    _ => out.push('\n'),
                }
            }
        }

        if state.error() != self.error.as_deref() {
            self.error = state.error().map(str::to_string);
            if let Some(error) = &self.error {
                out.push_str(&format!("Error: {}\n", error));
            }
        }

        out
    }
}

fn truncate(value: &str, max: usize, suffix: &str) -> String {
    match value.char_indices().nth(max) {
        Some((end, _)) => format!("{}{}", &value[..end], suffix),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2, "..."), "hé...");
        assert_eq!(truncate("short", 10, "..."), "short");
    }

    #[test]
    fn forgets_messages_that_were_cleared() {
        let mut state = ChatState::default();
        let (first, _) = state.begin_turn("Hello".to_string()).unwrap();
        let mut transcript = Transcript::new();
        transcript.update(&state);
        assert!(transcript.printed.contains_key(&first));

        // Cleared and already streaming the next turn before the printer ran.
        state.clear();
        let (second, _) = state.begin_turn("Again".to_string()).unwrap();
        transcript.update(&state);
        assert_eq!(transcript.printed.keys().copied().collect::<Vec<_>>(), vec![second]);
    }

    #[test]
    fn empty_state_prints_nothing() {
        let mut transcript = Transcript::new();
        assert_eq!(transcript.update(&ChatState::default()), "");
    }
}
