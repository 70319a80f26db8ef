use futures_util::StreamExt;
use mito_ai_server::mock::{MockCompletionClient, MockDelta};
use mito_ai_shared::ServerMessage;
use tokio_tungstenite::connect_async;

use super::common;

#[tokio::test]
async fn e2e_single_completion_reply() {
    let url = common::spawn_server(MockCompletionClient::with_choices(["hello"])).await;
    let (ws, _) = connect_async(&url).await.unwrap();
    let (mut write, mut read) = ws.split();

    common::send_text(&mut write, common::request_json("1", "hi", false)).await;
    let (_, raw) = common::recv(&mut read).await;

    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "type": "inline_completion",
            "items": [{"insertText": "hello", "isIncomplete": false}],
            "parent_id": "1"
        })
    );
}

#[tokio::test]
async fn e2e_no_completion_error() {
    let url = common::spawn_server(MockCompletionClient::with_choices(Vec::<String>::new())).await;
    let (ws, _) = connect_async(&url).await.unwrap();
    let (mut write, mut read) = ws.split();

    common::send_text(&mut write, common::request_json("2", "hi", false)).await;
    let (message, _) = common::recv(&mut read).await;
    match message {
        ServerMessage::Reply(reply) => {
            assert!(reply.items.is_empty());
            assert_eq!(reply.parent_id, "2");
            assert_eq!(reply.error.unwrap().r#type, "NoCompletion");
        }
        other => panic!("expected reply, got {:?}", other),
    }
}

#[tokio::test]
async fn e2e_upstream_failure_becomes_error_reply() {
    let url = common::spawn_server(
        MockCompletionClient::failing("upstream unavailable").with_can_stream(false),
    )
    .await;
    let (ws, _) = connect_async(&url).await.unwrap();
    let (mut write, mut read) = ws.split();

    common::send_text(&mut write, common::request_json("3", "hi", false)).await;
    let (message, _) = common::recv(&mut read).await;
    match message {
        ServerMessage::Reply(reply) => {
            assert!(reply.items.is_empty());
            assert_eq!(reply.parent_id, "3");
            let error = reply.error.unwrap();
            assert_eq!(error.r#type, "NetworkError");
            assert!(error.title.contains("upstream unavailable"));
            assert!(!error.traceback.is_empty());
        }
        other => panic!("expected reply, got {:?}", other),
    }
}

#[tokio::test]
async fn e2e_sequential_requests_keep_their_ids() {
    let url = common::spawn_server(MockCompletionClient::streaming(vec![
        MockDelta::Content("a".to_string()),
        MockDelta::Finished("b".to_string()),
    ]))
    .await;
    let (ws, _) = connect_async(&url).await.unwrap();
    let (mut write, mut read) = ws.split();

    for (id, stream) in [("r1", false), ("r2", true), ("r3", false), ("r4", true)] {
        common::send_text(&mut write, common::request_json(id, "hi", stream)).await;
        let messages = common::recv_exchange(&mut read).await;
        assert!(messages.iter().all(|m| m.parent_id() == id), "{:?}", messages);
        assert_eq!(messages.iter().filter(|m| m.is_terminal()).count(), 1);
    }
}
