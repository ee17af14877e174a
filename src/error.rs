use std::time::Duration;

use thiserror::Error;

/// Transport-level failures that end a turn.
///
/// None of these escape the session API; they are rendered into the
/// session's `error` field.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Network error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Chat request failed: {status} - {body}")]
    Status { status: u16, body: String },

    #[error("Chat stream stalled: no data received for {0:?}")]
    Stalled(Duration),
}

pub type ChatResult<T> = Result<T, ChatError>;
