use anyhow::{bail, Result};
use mito_ai_cli::client::{new_message_id, CompletionWebsocketClient};
use mito_ai_shared::{ChatMessage, CompletionError, CompletionRequest, ServerMessage};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use url::Url;

const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8888/mito-ai/chat-completions";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    // stdout carries the answers
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let url = ws_url(
        std::env::var("MITO_AI_WS_URL").ok().as_deref(),
        std::env::var("MITO_AI_TOKEN").ok().as_deref(),
    )?;
    let stream = std::env::var("MITO_AI_STREAM")
        .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no"))
        .unwrap_or(true);

    let (client, mut messages) = CompletionWebsocketClient::connect(url.as_str()).await?;
    debug!("Streaming: {}", stream);

    let mut history: Vec<ChatMessage> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            prompt()?;
            continue;
        }

        history.push(ChatMessage::user(line));
        let request = CompletionRequest {
            message_id: new_message_id(),
            messages: history.clone(),
            stream,
        };

        let answer = if stream {
            stream_answer(&client, &mut messages, request).await?
        } else {
            let reply = client.send_message(request).await?;
            if let Some(error) = &reply.error {
                print_error(error);
            }
            let text: String = reply.items.iter().map(|item| item.insert_text.as_str()).collect();
            println!("{}", text);
            text
        };

        // Failed exchanges leave the question unanswered in the history.
        if answer.is_empty() {
            history.pop();
        } else {
            history.push(ChatMessage::assistant(answer));
        }
        prompt()?;
    }

    Ok(())
}

/// Prints chunks for `request` as they arrive and returns the full text.
async fn stream_answer(
    client: &CompletionWebsocketClient,
    messages: &mut mpsc::UnboundedReceiver<ServerMessage>,
    request: CompletionRequest,
) -> Result<String> {
    let message_id = request.message_id.clone();
    client.send_stream(request)?;

    let mut answer = String::new();
    loop {
        let Some(message) = messages.recv().await else {
            bail!("completion websocket closed mid-answer");
        };
        if message.parent_id() != message_id {
            debug!("Ignoring message for {}", message.parent_id());
            continue;
        }

        match &message {
            ServerMessage::Stream(chunk) => {
                print!("{}", chunk.chunk.insert_text);
                answer.push_str(&chunk.chunk.insert_text);
                std::io::stdout().flush()?;
            }
            ServerMessage::Reply(reply) => {
                for item in &reply.items {
                    print!("{}", item.insert_text);
                    answer.push_str(&item.insert_text);
                }
            }
        }

        if let Some(error) = message.error() {
            println!();
            print_error(error);
            return Ok(answer);
        }
        if message.is_terminal() {
            println!();
            return Ok(answer);
        }
    }
}

fn ws_url(base: Option<&str>, token: Option<&str>) -> Result<Url> {
    let mut url = Url::parse(base.unwrap_or(DEFAULT_WS_URL))?;
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        url.query_pairs_mut().append_pair("token", token);
    }
    Ok(url)
}

fn print_error(error: &CompletionError) {
    eprintln!("error ({}): {}", error.r#type, error.title);
    if !error.traceback.is_empty() {
        debug!("{}", error.traceback);
    }
}

fn prompt() -> Result<()> {
    print!("> ");
    std::io::stdout().flush()?;
    Ok(())
}
