use futures_util::StreamExt;
use mito_ai_server::mock::{MockCompletionClient, MockDelta};
use mito_ai_shared::{CompletionStreamChunk, ServerMessage};
use tokio_tungstenite::connect_async;

use super::common;

fn into_chunks(messages: Vec<ServerMessage>) -> Vec<CompletionStreamChunk> {
    messages
        .into_iter()
        .map(|m| match m {
            ServerMessage::Stream(chunk) => chunk,
            other => panic!("expected stream chunk, got {:?}", other),
        })
        .collect()
}

#[tokio::test]
async fn e2e_stream_ack_then_two_deltas() {
    let url = common::spawn_server(MockCompletionClient::streaming(vec![
        MockDelta::Content("he".to_string()),
        MockDelta::Finished("llo".to_string()),
    ]))
    .await;
    let (ws, _) = connect_async(&url).await.unwrap();
    let (mut write, mut read) = ws.split();

    common::send_text(&mut write, common::request_json("1", "hi", true)).await;
    let (_, ack_raw) = common::recv(&mut read).await;
    let ack: serde_json::Value = serde_json::from_str(&ack_raw).unwrap();
    assert_eq!(ack["type"], "stream");
    assert_eq!(ack["chunk"]["insertText"], "");
    assert_eq!(ack["chunk"]["isIncomplete"], true);
    assert_eq!(ack["done"], false);
    assert_eq!(ack["parent_id"], "1");

    let chunks = into_chunks(common::recv_exchange(&mut read).await);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].chunk.insert_text, "he");
    assert!(!chunks[0].done);
    assert_eq!(chunks[1].chunk.insert_text, "llo");
    assert!(chunks[1].done);
}

#[tokio::test]
async fn e2e_parse_failure_ends_stream() {
    let url = common::spawn_server(MockCompletionClient::streaming(vec![
        MockDelta::Content("par".to_string()),
        MockDelta::NoChoices,
        MockDelta::Finished("never sent".to_string()),
    ]))
    .await;
    let (ws, _) = connect_async(&url).await.unwrap();
    let (mut write, mut read) = ws.split();

    common::send_text(&mut write, common::request_json("5", "hi", true)).await;
    let chunks = into_chunks(common::recv_exchange(&mut read).await);
    assert_eq!(chunks.len(), 3);
    let last = &chunks[2];
    assert!(last.done);
    assert_eq!(last.error.as_ref().unwrap().r#type, "ParseError");
    assert!(chunks.iter().all(|c| c.chunk.insert_text != "never sent"));

    // the connection is still usable afterwards
    common::send_text(&mut write, common::request_json("6", "again", true)).await;
    let chunks = into_chunks(common::recv_exchange(&mut read).await);
    assert!(chunks.iter().all(|c| c.parent_id == "6"));
}

#[tokio::test]
async fn e2e_stream_setup_failure_sends_error_chunk() {
    let url = common::spawn_server(MockCompletionClient::failing("connection refused")).await;
    let (ws, _) = connect_async(&url).await.unwrap();
    let (mut write, mut read) = ws.split();

    common::send_text(&mut write, common::request_json("7", "hi", true)).await;
    let chunks = into_chunks(common::recv_exchange(&mut read).await);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0], CompletionStreamChunk::acknowledgement("7"));
    assert!(chunks[1].done);
    let error = chunks[1].error.as_ref().unwrap();
    assert_eq!(error.r#type, "NetworkError");
    assert!(error.title.contains("connection refused"));
}
