#![cfg(feature = "json")]
//! JSON convenience round trip against an in-process echo server, replacing
//! the base crate's tests against `reqres.in` (an external host this engine
//! no longer has TLS to reach).

use http2::{Handler, Request, Server, ServerConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct CreateUser {
    name: String,
    job: String,
}

async fn spawn_json_echo_server() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut server = Server::new(ServerConfig::default());
    let echo_json: Handler = Arc::new(|request| {
        Box::pin(async move {
            http2::Response::new(
                201,
                vec![("content-type".to_owned(), "application/json".to_owned())],
                request.body.clone(),
            )
        }) as http2::HandlerFuture
    });
    server.register_handler("/users", echo_json);

    tokio::spawn(async move {
        server.serve(listener).await.unwrap();
    });
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    addr
}

#[tokio::test]
async fn create_user_round_trips_through_json() {
    let addr = spawn_json_echo_server().await;
    let client = http2::Client::default();

    let payload = CreateUser {
        name: "morpheus".to_owned(),
        job: "leader".to_owned(),
    };
    let url = url::Url::parse(&format!("http://{addr}/users")).unwrap();
    let response = client
        .perform(Request::post_json(url, &payload).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    let decoded: CreateUser = response.json().unwrap();
    assert_eq!(decoded, payload);
}
