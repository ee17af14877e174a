//! Client-side engine for the report assistant's streaming chat endpoint.
//!
//! A [`ChatSession`] posts the conversation, reads the `text/event-stream`
//! reply, and folds its events into an append-only [`ChatState`] that a UI
//! renders.

pub mod client;
pub mod config;
pub mod console;
pub mod correlator;
pub mod error;
pub mod frame;
pub mod message;
pub mod protocol;
pub mod reducer;
pub mod session;

pub use config::ChatConfig;
pub use error::{ChatError, ChatResult};
pub use message::{Message, MessageStatus, Role, ToolCall, ToolCallStatus};
pub use protocol::StreamEvent;
pub use session::{ChatSession, ChatState, SendOutcome};
