use futures_util::StreamExt;
use mito_ai_server::mock::MockCompletionClient;
use tokio_tungstenite::connect_async;

use super::common;

/// Malformed requests get no answer: the first message received belongs to
/// the valid request sent after them.
#[tokio::test]
async fn e2e_invalid_json_is_dropped() {
    let url = common::spawn_server(MockCompletionClient::with_choices(["hello"])).await;
    let (ws, _) = connect_async(&url).await.unwrap();
    let (mut write, mut read) = ws.split();

    common::send_text(&mut write, "not valid json".to_string()).await;
    common::send_text(&mut write, r#"{"messages": [], "stream": false}"#.to_string()).await;
    common::send_text(
        &mut write,
        r#"{"message_id": "x", "messages": [{"role": "robot", "content": "hi"}]}"#.to_string(),
    )
    .await;
    common::send_text(&mut write, common::request_json("valid", "hi", false)).await;

    let (message, raw) = common::recv(&mut read).await;
    assert_eq!(message.parent_id(), "valid", "unexpected message: {}", raw);
}
