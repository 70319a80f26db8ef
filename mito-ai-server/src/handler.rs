use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{
        header::{HOST, ORIGIN},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
};
use mito_ai_shared::{CompletionRequest, ServerMessage};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::auth::{token_from_headers, User, COMPLETION_ACTION, COMPLETION_RESOURCE};
use crate::completion::CompletionService;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AuthQuery {
    token: Option<String>,
}

/// Checks the origin, authenticates and authorizes the caller, then upgrades
/// to a completion socket.
pub(crate) async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let origin = headers.get(ORIGIN).and_then(|v| v.to_str().ok());
    let host = headers.get(HOST).and_then(|v| v.to_str().ok());
    if !state.origins.allows(origin, host) {
        warn!("Rejecting WebSocket connection from origin {:?}", origin);
        return StatusCode::FORBIDDEN.into_response();
    }

    let token = query.token.or_else(|| token_from_headers(&headers));
    let Some(user) = state.authenticator.authenticate(token.as_deref()) else {
        warn!("Couldn't authenticate WebSocket connection");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    if !state
        .authorizer
        .is_authorized(&user, COMPLETION_ACTION, COMPLETION_RESOURCE)
        .await
    {
        warn!("User {} is not allowed to {} {}", user.name, COMPLETION_ACTION, COMPLETION_RESOURCE);
        return StatusCode::FORBIDDEN.into_response();
    }

    let service = state.service.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, service, user))
}

async fn handle_socket(mut socket: WebSocket, service: Arc<CompletionService>, user: User) {
    info!("Completion websocket opened for {}", user.name);

    while let Some(msg) = socket.recv().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    error!("Invalid completion request: {}", e);
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("WebSocket read error (client closed?): {}", e);
                break;
            }
        };

        debug!("Message received: {}", text);
        // Malformed requests have no id to answer to; they are dropped.
        let request = match serde_json::from_str::<CompletionRequest>(&text) {
            Ok(request) => request,
            Err(e) => {
                error!("Invalid completion request: {}", e);
                continue;
            }
        };

        if let Err(e) = handle_request(&mut socket, &service, request).await {
            error!("Failed to send reply: {}", e);
            break;
        }
    }

    info!("Completion websocket closed for {}", user.name);
}

/// Runs one exchange, forwarding replies to the socket as they are produced.
/// Only socket write failures are returned.
async fn handle_request(
    socket: &mut WebSocket,
    service: &CompletionService,
    request: CompletionRequest,
) -> Result<(), axum::Error> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let forward = async {
        while let Some(message) = rx.recv().await {
            send_message(socket, &message).await?;
        }
        Ok::<(), axum::Error>(())
    };
    let (outcome, forwarded) = tokio::join!(service.handle(&request, tx), forward);
    forwarded?;

    if let Err(e) = outcome {
        error!("Completion {} failed: {:?}", request.message_id, e);
        let message = ServerMessage::error_for(&request, e.to_completion_error());
        send_message(socket, &message).await?;
    }
    Ok(())
}

async fn send_message(socket: &mut WebSocket, message: &ServerMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(message) {
        Ok(json) => socket.send(Message::Text(json)).await,
        Err(e) => {
            error!("Failed to serialize reply: {}", e);
            Ok(())
        }
    }
}
