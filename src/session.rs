use crate::client::{ChatClient, StreamEnd};
use crate::config::ChatConfig;
use crate::message::{Message, MessageStatus, Role};
use crate::protocol::{ChatRequest, StreamEvent, WireMessage};
use crate::reducer;
use serde::Serialize;
use std::ops::ControlFlow;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// The state a chat panel renders.
///
/// Serializes as `{messages, isStreaming, error}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatState {
    messages: Vec<Message>,
    is_streaming: bool,
    error: Option<String>,
    // Id of the assistant message the active turn writes to.
    #[serde(skip)]
    active: Option<u64>,
    #[serde(skip)]
    next_id: u64,
}

impl ChatState {
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Appends the user message and the assistant placeholder, returning the
    /// placeholder id and the history to send. `None` if a turn is running.
    pub(crate) fn begin_turn(&mut self, text: String) -> Option<(u64, Vec<WireMessage>)> {
        if self.is_streaming {
            return None;
        }

        let mut history: Vec<WireMessage> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::User || !m.content.is_empty())
            .map(|m| WireMessage {
                role: m.role,
                content: m.content.clone(),
            })
            .collect();
        history.push(WireMessage {
            role: Role::User,
            content: text.clone(),
        });

        let user_id = self.allocate_id();
        self.messages.push(Message::user(user_id, text));
        let assistant_id = self.allocate_id();
        self.messages.push(Message::assistant_placeholder(assistant_id));

        self.error = None;
        self.is_streaming = true;
        self.active = Some(assistant_id);
        Some((assistant_id, history))
    }

    /// Drops every message and the error. Ids keep counting from where they
    /// were.
    pub(crate) fn clear(&mut self) {
        self.messages.clear();
        self.error = None;
        self.active = None;
        self.is_streaming = false;
    }

    fn message_mut(&mut self, id: u64) -> Option<&mut Message> {
        self.messages.iter_mut().rev().find(|m| m.id == id)
    }

    fn status_of(&self, id: u64) -> Option<MessageStatus> {
        self.messages.iter().rev().find(|m| m.id == id).map(|m| m.status)
    }

    /// Closes `turn` if it is still the active one. A message that already
    /// reached a terminal state keeps it.
    fn end_turn(&mut self, turn: u64, status: MessageStatus, error: Option<String>) -> bool {
        if self.active != Some(turn) {
            return false;
        }
        if let Some(message) = self.message_mut(turn) {
            if !message.status.is_terminal() {
                message.status = status;
            }
        }
        if error.is_some() {
            self.error = error;
        }
        self.active = None;
        self.is_streaming = false;
        true
    }
}

/// How a `send_message` call ended. Failures are also visible in
/// [`ChatState::error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Completed,
    Cancelled,
    Failed,
    /// Empty text, or another response was still streaming.
    Rejected,
}

struct ActiveStream {
    turn: u64,
    cancel: CancellationToken,
}

/// One conversation, owned by one chat panel.
///
/// The session is the only writer of its [`ChatState`]; renderers observe it
/// through [`snapshot`](Self::snapshot), [`subscribe`](Self::subscribe) or
/// [`updates`](Self::updates). Dropping the session cancels its stream.
pub struct ChatSession {
    id: Uuid,
    initial_prompt: Option<String>,
    client: ChatClient,
    state: watch::Sender<ChatState>,
    active: Mutex<Option<ActiveStream>>,
}

impl ChatSession {
    pub fn new(config: ChatConfig) -> Self {
        let (state, _) = watch::channel(ChatState::default());
        Self {
            id: Uuid::new_v4(),
            initial_prompt: config.initial_prompt.clone(),
            client: ChatClient::new(&config),
            state,
            active: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn snapshot(&self) -> ChatState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    /// Current state first, then every change.
    pub fn updates(&self) -> WatchStream<ChatState> {
        WatchStream::new(self.state.subscribe())
    }

    /// Sends `text` and streams the reply into the session until it finishes,
    /// fails, or is stopped.
    pub async fn send_message(&self, text: impl Into<String>) -> SendOutcome {
        let text = text.into();
        if text.trim().is_empty() {
            tracing::debug!(session = %self.id, "ignoring empty message");
            return SendOutcome::Rejected;
        }

        let cancel = CancellationToken::new();
        let begun = {
            let mut active = self.lock_active();
            let mut begun = None;
            self.state.send_if_modified(|state| {
                begun = state.begin_turn(text);
                begun.is_some()
            });
            if let Some((turn, _)) = &begun {
                *active = Some(ActiveStream {
                    turn: *turn,
                    cancel: cancel.clone(),
                });
            }
            begun
        };

        let Some((turn, history)) = begun else {
            tracing::warn!(session = %self.id, "rejecting message while a response is streaming");
            return SendOutcome::Rejected;
        };

        let mut guard = TurnGuard {
            session: self,
            turn,
            armed: true,
        };
        let span = tracing::info_span!("turn", session = %self.id, turn);
        let outcome = self.drive(turn, history, &cancel).instrument(span).await;
        guard.armed = false;
        outcome
    }

    /// Aborts the active stream, if any. Text and tool calls received so far
    /// stay as they are.
    pub fn stop_streaming(&self) {
        self.abort(None);
    }

    /// Cancels any active stream, then empties the conversation and the error.
    pub fn clear_messages(&self) {
        let mut active = self.lock_active();
        if let Some(stream) = active.take() {
            stream.cancel.cancel();
        }
        self.state.send_modify(ChatState::clear);
        tracing::info!(session = %self.id, "cleared messages");
    }

    async fn drive(
        &self,
        turn: u64,
        history: Vec<WireMessage>,
        cancel: &CancellationToken,
    ) -> SendOutcome {
        let request = ChatRequest {
            messages: history,
            initial_prompt: self.initial_prompt.clone(),
        };
        tracing::info!(
            endpoint = self.client.endpoint(),
            history = request.messages.len(),
            "streaming response"
        );

        let result = self
            .client
            .stream_chat(&request, cancel, |event| self.apply(turn, event))
            .await;

        let status = match result {
            Ok(StreamEnd::Cancelled) => None,
            Ok(StreamEnd::Finished | StreamEnd::Eof) => {
                self.finish(turn, MessageStatus::Complete, None)
            }
            Err(err) => {
                tracing::warn!(error = %err, "chat stream failed");
                self.finish(turn, MessageStatus::Failed, Some(err.to_string()))
            }
        };
        self.release(turn);

        let outcome = match status {
            Some(MessageStatus::Complete) => SendOutcome::Completed,
            Some(MessageStatus::Failed) => SendOutcome::Failed,
            _ => SendOutcome::Cancelled,
        };
        tracing::info!(?outcome, "turn ended");
        outcome
    }

    fn apply(&self, turn: u64, event: StreamEvent) -> ControlFlow<()> {
        let mut flow = ControlFlow::Continue(());
        self.state.send_if_modified(|state| {
            if state.active != Some(turn) {
                flow = ControlFlow::Break(());
                return false;
            }
            let ChatState {
                messages, error, ..
            } = &mut *state;
            let Some(message) = messages.iter_mut().rev().find(|m| m.id == turn) else {
                flow = ControlFlow::Break(());
                return false;
            };

            let reduction = reducer::reduce(message, error, event);
            if reduction.finished {
                flow = ControlFlow::Break(());
                state.end_turn(turn, MessageStatus::Complete, None);
            }
            reduction.changed
        });
        flow
    }

    /// Ends `turn` if nothing else did, and reports the status its message
    /// finished in. `None` once the message has been cleared away.
    fn finish(
        &self,
        turn: u64,
        status: MessageStatus,
        error: Option<String>,
    ) -> Option<MessageStatus> {
        self.state
            .send_if_modified(|state| state.end_turn(turn, status, error));
        self.state.borrow().status_of(turn)
    }

    fn abort(&self, only: Option<u64>) {
        let mut active = self.lock_active();
        let Some(stream) = active.take_if(|s| only.is_none_or(|turn| s.turn == turn)) else {
            return;
        };
        stream.cancel.cancel();
        let stopped = self
            .state
            .send_if_modified(|state| state.end_turn(stream.turn, MessageStatus::Aborted, None));
        if stopped {
            tracing::info!(session = %self.id, turn = stream.turn, "stopped streaming");
        }
    }

    fn release(&self, turn: u64) {
        let mut active = self.lock_active();
        active.take_if(|s| s.turn == turn);
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveStream>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(stream) = self.lock_active().take() {
            stream.cancel.cancel();
        }
    }
}

// Aborts the turn if the `send_message` future is dropped mid-stream.
struct TurnGuard<'a> {
    session: &'a ChatSession,
    turn: u64,
    armed: bool,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.session.abort(Some(self.turn));
        }
    }
}
