//! Shared helpers for e2e tests. Received messages are logged with `[e2e] received: ...`.
//! Run tests with `--nocapture` to see them.

use futures_util::{SinkExt, StreamExt};
use mito_ai_server::{
    auth::{Authorizer, OriginPolicy, StaticAuthorizer, TokenAuthenticator},
    completion::CompletionService,
    mock::{MockCompletionClient, RecordingTelemetry},
    run_server_on_listener, AppState, COMPLETIONS_PATH,
};
use mito_ai_shared::ServerMessage;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ServerOptions {
    pub token: Option<String>,
    pub authorizer: Arc<dyn Authorizer>,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            token: None,
            authorizer: Arc::new(StaticAuthorizer::allow_all()),
            allowed_origins: Vec::new(),
        }
    }
}

/// Binds a random port and serves `client`. Returns the websocket URL.
pub async fn spawn_server(client: MockCompletionClient) -> String {
    spawn_server_with(client, ServerOptions::default()).await
}

pub async fn spawn_server_with(client: MockCompletionClient, options: ServerOptions) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(AppState {
        service: Arc::new(CompletionService::new(
            Arc::new(client),
            Arc::new(RecordingTelemetry::default()),
        )),
        authenticator: Arc::new(TokenAuthenticator::new(options.token)),
        authorizer: options.authorizer,
        origins: OriginPolicy::new(options.allowed_origins),
    });
    tokio::spawn(run_server_on_listener(listener, state));
    format!("ws://{}{}", addr, COMPLETIONS_PATH)
}

pub fn request_json(message_id: &str, content: &str, stream: bool) -> String {
    serde_json::json!({
        "message_id": message_id,
        "messages": [{"role": "user", "content": content}],
        "stream": stream,
    })
    .to_string()
}

pub async fn send_text<W>(write: &mut W, text: String)
where
    W: SinkExt<Message> + Unpin,
    W::Error: std::fmt::Debug,
{
    write.send(Message::Text(text)).await.unwrap();
}

/// Reads the next text frame; returns the parsed message and the raw JSON.
pub async fn recv<R>(read: &mut R) -> (ServerMessage, String)
where
    R: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = timeout(READ_TIMEOUT, read.next())
            .await
            .expect("timeout waiting for message")
            .expect("connection closed")
            .expect("ws error");
        if !msg.is_text() {
            continue;
        }
        let text = msg.to_text().unwrap().to_string();
        eprintln!("[e2e] received: {}", text);
        let parsed: ServerMessage = serde_json::from_str(&text).unwrap();
        return (parsed, text);
    }
}

/// Reads until the terminal message of one exchange.
pub async fn recv_exchange<R>(read: &mut R) -> Vec<ServerMessage>
where
    R: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let mut messages = Vec::new();
    loop {
        let (message, _) = recv(read).await;
        let terminal = message.is_terminal();
        messages.push(message);
        if terminal {
            return messages;
        }
    }
}
