use futures_util::StreamExt;
use mito_ai_server::{auth::StaticAuthorizer, mock::MockCompletionClient};
use std::sync::Arc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, handshake::client::Request, http::HeaderValue, Error},
};

use super::common::{self, ServerOptions};

fn with_token(token: &str) -> ServerOptions {
    ServerOptions {
        token: Some(token.to_string()),
        ..ServerOptions::default()
    }
}

fn with_origin(url: &str, origin: &str) -> Request {
    let mut request = url.into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_str(origin).unwrap());
    request
}

fn rejected_status(result: Result<impl Sized, Error>) -> u16 {
    match result {
        Err(Error::Http(response)) => response.status().as_u16(),
        Err(other) => panic!("expected http rejection, got {:?}", other),
        Ok(_) => panic!("expected the upgrade to be rejected"),
    }
}

#[tokio::test]
async fn e2e_missing_token_is_unauthorized() {
    let url =
        common::spawn_server_with(MockCompletionClient::with_choices(["x"]), with_token("secret"))
            .await;
    assert_eq!(rejected_status(connect_async(&url).await), 401);
    assert_eq!(
        rejected_status(connect_async(format!("{}?token=wrong", url)).await),
        401
    );
}

#[tokio::test]
async fn e2e_query_token_is_accepted() {
    let url =
        common::spawn_server_with(MockCompletionClient::with_choices(["ok"]), with_token("secret"))
            .await;
    let (ws, _) = connect_async(format!("{}?token=secret", url)).await.unwrap();
    let (mut write, mut read) = ws.split();
    common::send_text(&mut write, common::request_json("1", "hi", false)).await;
    let (message, _) = common::recv(&mut read).await;
    assert_eq!(message.parent_id(), "1");
}

#[tokio::test]
async fn e2e_header_token_is_accepted() {
    let url =
        common::spawn_server_with(MockCompletionClient::with_choices(["ok"]), with_token("secret"))
            .await;
    let mut request = url.into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Authorization", HeaderValue::from_static("token secret"));
    assert!(connect_async(request).await.is_ok());
}

#[tokio::test]
async fn e2e_denied_user_is_forbidden() {
    let options = ServerOptions {
        authorizer: Arc::new(StaticAuthorizer::deny_all()),
        ..ServerOptions::default()
    };
    let url = common::spawn_server_with(MockCompletionClient::with_choices(["x"]), options).await;
    assert_eq!(rejected_status(connect_async(&url).await), 403);
}

#[tokio::test]
async fn e2e_foreign_origin_is_forbidden_without_token() {
    let url = common::spawn_server(MockCompletionClient::with_choices(["x"])).await;
    let status = rejected_status(connect_async(with_origin(&url, "https://evil.example")).await);
    assert_eq!(status, 403);
}

#[tokio::test]
async fn e2e_same_host_origin_is_accepted() {
    let url = common::spawn_server(MockCompletionClient::with_choices(["ok"])).await;
    let host = url
        .trim_start_matches("ws://")
        .split('/')
        .next()
        .unwrap()
        .to_string();
    let (ws, _) = connect_async(with_origin(&url, &format!("http://{}", host)))
        .await
        .unwrap();
    let (mut write, mut read) = ws.split();
    common::send_text(&mut write, common::request_json("1", "hi", false)).await;
    let (message, _) = common::recv(&mut read).await;
    assert_eq!(message.parent_id(), "1");
}

#[tokio::test]
async fn e2e_listed_origin_is_accepted() {
    let options = ServerOptions {
        allowed_origins: vec!["http://localhost:3000".to_string()],
        ..ServerOptions::default()
    };
    let url = common::spawn_server_with(MockCompletionClient::with_choices(["ok"]), options).await;
    assert!(connect_async(with_origin(&url, "http://localhost:3000")).await.is_ok());
    assert_eq!(
        rejected_status(connect_async(with_origin(&url, "http://localhost:4000")).await),
        403
    );
}
