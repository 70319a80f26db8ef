//! Completion orchestration: turns one [`CompletionRequest`] into the reply
//! sequence written to the connection.
//!
//! Non-streaming requests get exactly one [`CompletionReply`]. Streaming
//! requests get an acknowledgement chunk, one chunk per upstream delta and
//! end with exactly one `done=true` chunk. Failures to reach the provider are
//! returned to the caller, which answers with an error message; failures in
//! the middle of a stream end the stream with an error chunk.

use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use mito_ai_shared::{
    CompletionError, CompletionReply, CompletionRequest, CompletionStreamChunk, ErrorKind,
    ServerMessage,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::ProviderError;
use crate::provider::{CompletionClient, StreamDelta};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

pub type ReplySender = mpsc::UnboundedSender<ServerMessage>;

pub struct CompletionService {
    client: Arc<dyn CompletionClient>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl CompletionService {
    pub fn new(client: Arc<dyn CompletionClient>, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self { client, telemetry }
    }

    pub fn can_stream(&self) -> bool {
        self.client.can_stream()
    }

    /// Serves one request, writing replies to `tx`. `tx` is dropped on return.
    pub async fn handle(
        &self,
        request: &CompletionRequest,
        tx: ReplySender,
    ) -> Result<(), ProviderError> {
        let start = Instant::now();
        if request.stream && self.can_stream() {
            self.stream_completions(request, &tx).await?;
            info!(
                "Completion streaming completed in {} ms.",
                start.elapsed().as_millis()
            );
        } else {
            let reply = self.request_completions(request).await?;
            if tx.send(reply.into()).is_err() {
                warn!("Connection closed before reply {} was sent", request.message_id);
            }
            info!(
                "Completion handler resolved in {} ms.",
                start.elapsed().as_millis()
            );
        }
        Ok(())
    }

    pub async fn request_completions(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionReply, ProviderError> {
        let key_type = self.client.key_type();
        let completion = match self.client.complete(&request.messages).await {
            Ok(completion) => completion,
            Err(e) => {
                self.telemetry.log(TelemetryEvent::completion_error(key_type, &e));
                return Err(e);
            }
        };
        self.telemetry
            .log(TelemetryEvent::completion_success(key_type, completion.num_usages));

        let Some(choice) = completion.choices.into_iter().next() else {
            warn!("No completion returned for {}", request.message_id);
            return Ok(CompletionReply::failed(
                &request.message_id,
                CompletionError::new(
                    ErrorKind::NoCompletion,
                    format!("No completion returned from the {}.", self.client.name()),
                    "",
                ),
            ));
        };

        Ok(CompletionReply::single(
            &request.message_id,
            choice.content.unwrap_or_default(),
        ))
    }

    pub async fn stream_completions(
        &self,
        request: &CompletionRequest,
        tx: &ReplySender,
    ) -> Result<(), ProviderError> {
        let parent_id = request.message_id.as_str();
        if tx.send(CompletionStreamChunk::acknowledgement(parent_id).into()).is_err() {
            return Ok(());
        }

        let key_type = self.client.key_type();
        let mut deltas = match self.client.complete_stream(&request.messages).await {
            Ok(deltas) => {
                self.telemetry
                    .log(TelemetryEvent::completion_success(key_type, None));
                deltas
            }
            Err(e) => {
                self.telemetry.log(TelemetryEvent::completion_error(key_type, &e));
                return Err(e);
            }
        };

        while let Some(item) = deltas.next().await {
            let chunk = match item.and_then(|delta| content_chunk(parent_id, delta)) {
                Ok(chunk) => chunk,
                Err(e) => {
                    error!("Failed to parse chunk completion for {}: {}", parent_id, e);
                    let _ = tx.send(parse_failure_chunk(parent_id, &e).into());
                    return Ok(());
                }
            };

            let done = chunk.done;
            if tx.send(chunk.into()).is_err() {
                warn!("Connection closed during stream {}", parent_id);
                return Ok(());
            }
            if done {
                return Ok(());
            }
        }

        debug!("Upstream stream for {} ended without a finish reason", parent_id);
        let _ = tx.send(CompletionStreamChunk::content(parent_id, "", true).into());
        Ok(())
    }
}

pub(crate) fn content_chunk(
    parent_id: &str,
    delta: StreamDelta,
) -> Result<CompletionStreamChunk, ProviderError> {
    let choice = delta
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Parse("stream delta contained no choices".to_string()))?;
    let done = choice.finish_reason.is_some();
    Ok(CompletionStreamChunk::content(
        parent_id,
        choice.content.unwrap_or_default(),
        done,
    ))
}

fn parse_failure_chunk(parent_id: &str, e: &ProviderError) -> CompletionStreamChunk {
    let mut error = e.to_completion_error();
    error.title = format!("Failed to parse chunk completion: {}", e);
    CompletionStreamChunk::failed(parent_id, error)
}
