use crate::config::ChatConfig;
use crate::error::{ChatError, ChatResult};
use crate::frame::FrameReader;
use crate::protocol::{ChatRequest, StreamEvent};
use futures::{Stream, StreamExt};
use reqwest::Client as HttpClient;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Why a stream stopped without a transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The event callback asked to stop.
    Finished,
    /// The server closed the body.
    Eof,
    /// The cancellation token fired.
    Cancelled,
}

#[derive(Clone)]
pub struct ChatClient {
    endpoint: String,
    read_timeout: Option<Duration>,
    http: HttpClient,
}

impl ChatClient {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            read_timeout: config.read_timeout,
            http: HttpClient::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Posts `request` and feeds every parsed event to `on_event` until the
    /// body ends, the callback breaks, or `cancel` fires.
    ///
    /// `on_event` runs synchronously between reads, so no event is delivered
    /// once cancellation has been observed.
    pub async fn stream_chat<F>(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> ChatResult<StreamEnd>
    where
        F: FnMut(StreamEvent) -> ControlFlow<()>,
    {
        let send = self.http.post(&self.endpoint).json(request).send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            response = within(self.read_timeout, send) => response??,
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
                body = within(self.read_timeout, response.text()) => body?.unwrap_or_default(),
            };
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }
        tracing::debug!(status = %response.status(), "chat stream opened");

        let stream = response.bytes_stream();
        tokio::pin!(stream);
        let mut reader = FrameReader::new();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
                chunk = next_chunk(&mut stream, self.read_timeout) => chunk?,
            };

            let Some(chunk) = chunk else {
                reader.finish();
                return Ok(StreamEnd::Eof);
            };

            for frame in reader.push(&chunk) {
                let Some(event) = StreamEvent::from_frame(&frame) else {
                    continue;
                };
                if on_event(event).is_break() {
                    return Ok(StreamEnd::Finished);
                }
            }
        }
    }
}

async fn next_chunk<S, B>(stream: &mut S, timeout: Option<Duration>) -> ChatResult<Option<B>>
where
    S: Stream<Item = Result<B, reqwest::Error>> + Unpin,
{
    Ok(within(timeout, stream.next()).await?.transpose()?)
}

/// Awaits `future`, failing with `Stalled` if `timeout` passes first.
async fn within<F: Future>(timeout: Option<Duration>, future: F) -> ChatResult<F::Output> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| ChatError::Stalled(limit)),
        None => Ok(future.await),
    }
}
