use anyhow::{anyhow, Result};
use futures_util::{SinkExt, StreamExt};
use mito_ai_shared::{CompletionReply, CompletionRequest, ServerMessage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, warn};

type PendingReplies = Arc<Mutex<HashMap<String, oneshot::Sender<CompletionReply>>>>;

/// Completion socket client.
///
/// Replies to [`send_message`](Self::send_message) are matched to their request
/// by `parent_id`. Everything else (stream chunks, replies nobody waits for)
/// goes to the receiver returned by [`connect`](Self::connect).
pub struct CompletionWebsocketClient {
    tx: mpsc::UnboundedSender<CompletionRequest>,
    pending: PendingReplies,
}

impl CompletionWebsocketClient {
    pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<ServerMessage>)> {
        let (ws_stream, _) = connect_async(url).await?;
        debug!("Connected to {}", url);

        let (tx, mut rx) = mpsc::unbounded_channel::<CompletionRequest>();
        let (message_tx, message_rx) = mpsc::unbounded_channel::<ServerMessage>();
        let pending: PendingReplies = Arc::default();
        let task_pending = pending.clone();

        tokio::spawn(async move {
            let (mut write, mut read) = ws_stream.split();

            loop {
                tokio::select! {
                    request = rx.recv() => {
                        let Some(request) = request else {
                            debug!("Client dropped, closing completion socket");
                            let _ = write.close().await;
                            break;
                        };
                        match serde_json::to_string(&request) {
                            Ok(json) => {
                                if let Err(e) = write.send(Message::Text(json)).await {
                                    error!("Failed to send request: {}", e);
                                    break;
                                }
                                debug!("Request {} sent", request.message_id);
                            }
                            Err(e) => {
                                error!("Failed to serialize request: {}", e);
                            }
                        }
                    }
                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                dispatch(&task_pending, &message_tx, &text).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                warn!("Completion websocket closed");
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error: {}", e);
                                break;
                            }
                            Some(Ok(_)) => {}
                        }
                    }
                }
            }

            // Fail everyone still waiting; later sends see a closed channel.
            rx.close();
            task_pending.lock().await.clear();
        });

        Ok((Self { tx, pending }, message_rx))
    }

    /// Sends a request and waits for its [`CompletionReply`].
    pub async fn send_message(&self, request: CompletionRequest) -> Result<CompletionReply> {
        let message_id = request.message_id.clone();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().await.insert(message_id.clone(), reply_tx);

        if self.tx.send(request).is_err() {
            self.pending.lock().await.remove(&message_id);
            return Err(anyhow!("completion websocket is closed"));
        }

        reply_rx
            .await
            .map_err(|_| anyhow!("completion websocket closed before reply {} arrived", message_id))
    }

    /// Sends a request whose answer is read from the message receiver.
    pub fn send_stream(&self, request: CompletionRequest) -> Result<()> {
        self.tx
            .send(request)
            .map_err(|_| anyhow!("completion websocket is closed"))
    }
}

pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

async fn dispatch(
    pending: &PendingReplies,
    message_tx: &mpsc::UnboundedSender<ServerMessage>,
    text: &str,
) {
    let message = match serde_json::from_str::<ServerMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            error!("Failed to parse server message: {}", e);
            error!("Raw text was: {}", text);
            return;
        }
    };
    if let Some(message) = resolve_pending(pending, message).await {
        if message_tx.send(message).is_err() {
            debug!("Message receiver dropped");
        }
    }
}

/// Hands a reply to its waiter; returns the message when nobody claims it.
async fn resolve_pending(
    pending: &PendingReplies,
    message: ServerMessage,
) -> Option<ServerMessage> {
    let ServerMessage::Reply(reply) = message else {
        return Some(message);
    };
    let waiter = pending.lock().await.remove(&reply.parent_id);
    match waiter {
        Some(waiter) => {
            if waiter.send(reply).is_err() {
                debug!("Reply waiter went away");
            }
            None
        }
        None => Some(ServerMessage::Reply(reply)),
    }
}
