//! Connector against small in-process relay servers.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use hookrelay_client::{Connector, ConnectorError, ConnectorState};
use hookrelay_websocket::encode_request;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

const SECRET: &str = "acme:token";

async fn relay_server<F, Fut>(handler: F) -> SocketAddr
where
    F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let check = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let auth = request
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok());
            if auth == Some("Bearer acme:token") {
                Ok(response)
            } else {
                Err(http::Response::builder().status(403).body(None).unwrap())
            }
        };
        if let Ok(ws) = tokio_tungstenite::accept_hdr_async(socket, check).await {
            handler(ws).await;
        }
    });

    addr
}

/// Answers the upgrade with a canned HTTP response.
async fn raw_server(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    addr
}

fn hook_frame(path: &str, body: &'static str) -> Bytes {
    let request = http::Request::builder()
        .method("POST")
        .uri(path)
        .header("host", "relay.example.com")
        .header("content-type", "application/json")
        .body(Bytes::from_static(body.as_bytes()))
        .unwrap();
    encode_request(&request)
}

#[tokio::test]
async fn test_receives_relayed_requests() {
    let addr = relay_server(|mut ws| async move {
        ws.send(Message::Binary(hook_frame("/h/one", r#"{"x":1}"#)))
            .await
            .unwrap();
        ws.send(Message::Binary(Bytes::from_static(b"not http at all")))
            .await
            .unwrap();
        let text = String::from_utf8(hook_frame("/h/two", "").to_vec()).unwrap();
        ws.send(Message::text(text)).await.unwrap();
        ws.close(None).await.unwrap();
        while ws.next().await.is_some() {}
    })
    .await;

    let connector = Connector::builder(SECRET).build().unwrap();
    let mut requests = connector
        .connect("127.0.0.1", addr.port(), false)
        .await
        .unwrap();

    let first = requests.recv().await.unwrap();
    assert_eq!(first.method(), http::Method::POST);
    assert_eq!(first.uri().path(), "/h/one");
    assert_eq!(first.body().as_ref(), br#"{"x":1}"#);
    assert_eq!(first.headers()["content-type"], "application/json");

    let second = requests.recv().await.unwrap();
    assert_eq!(second.uri().path(), "/h/two");
    assert!(second.body().is_empty());

    assert!(requests.recv().await.is_none());
    assert_eq!(connector.state(), ConnectorState::Disconnected);
    assert_eq!(
        connector.endpoint().unwrap().connect_url(),
        format!("ws://127.0.0.1:{}/v1/connect", addr.port())
    );
}

#[tokio::test]
async fn test_wrong_secret_is_rejected() {
    let addr = relay_server(|_ws| async {}).await;

    let connector = Connector::builder("acme:wrong").build().unwrap();
    let result = connector.connect("127.0.0.1", addr.port(), false).await;

    assert!(matches!(
        result,
        Err(ConnectorError::CouldNotConnect { status: 403 })
    ));
    assert_eq!(connector.state(), ConnectorState::Disconnected);
    assert!(connector.endpoint().is_none());
}

#[tokio::test]
async fn test_only_temporary_redirects_are_followed() {
    let addr = raw_server(
        "HTTP/1.1 302 Found\r\nLocation: https://127.0.0.1:1/v1/connect\r\nContent-Length: 0\r\n\r\n",
    )
    .await;

    let connector = Connector::builder(SECRET).build().unwrap();
    let result = connector.connect("127.0.0.1", addr.port(), false).await;
    assert!(matches!(
        result,
        Err(ConnectorError::CouldNotConnect { status: 302 })
    ));
}

#[tokio::test]
async fn test_redirect_cap() {
    let addr = raw_server(
        "HTTP/1.1 307 Temporary Redirect\r\nLocation: https://127.0.0.1:1/v1/connect\r\nContent-Length: 0\r\n\r\n",
    )
    .await;

    let connector = Connector::builder(SECRET).max_redirects(0).build().unwrap();
    let result = connector.connect("127.0.0.1", addr.port(), false).await;
    assert!(matches!(result, Err(ConnectorError::TooManyRedirects(0))));
}

#[tokio::test]
async fn test_full_queue_drops_newest() {
    let addr = relay_server(|mut ws| async move {
        for path in ["/h/1", "/h/2", "/h/3"] {
            ws.send(Message::Binary(hook_frame(path, "payload")))
                .await
                .unwrap();
        }
        while ws.next().await.is_some() {}
    })
    .await;

    let connector = Connector::builder(SECRET)
        .queue_capacity(1)
        .build()
        .unwrap();
    let mut requests = connector
        .connect("127.0.0.1", addr.port(), false)
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while connector.dropped() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let kept = requests.recv().await.unwrap();
    assert_eq!(kept.uri().path(), "/h/1");
    assert!(requests.try_recv().is_none());
    assert_eq!(connector.state(), ConnectorState::Connected);
}

#[tokio::test]
async fn test_disconnect_closes_socket() {
    let (closed_tx, closed_rx) = tokio::sync::oneshot::channel();
    let addr = relay_server(|mut ws| async move {
        let mut saw_close = false;
        while let Some(Ok(message)) = ws.next().await {
            if message.is_close() {
                saw_close = true;
            }
        }
        let _ = closed_tx.send(saw_close);
    })
    .await;

    let connector = Connector::builder(SECRET).build().unwrap();
    let mut requests = connector
        .connect("127.0.0.1", addr.port(), false)
        .await
        .unwrap();
    assert_eq!(connector.state(), ConnectorState::Connected);

    let second = connector.connect("127.0.0.1", addr.port(), false).await;
    assert!(matches!(second, Err(ConnectorError::AlreadyConnected)));

    connector.disconnect().await;
    assert_eq!(connector.state(), ConnectorState::Disconnected);
    assert!(requests.recv().await.is_none());
    assert!(closed_rx.await.unwrap());
}

#[tokio::test]
async fn test_self_service_needs_endpoint() {
    let connector = Connector::builder(SECRET).build().unwrap();
    assert!(matches!(
        connector.list_hooks().await,
        Err(ConnectorError::NotConnected)
    ));
    assert!(matches!(
        connector.add_hook("orders").await,
        Err(ConnectorError::NotConnected)
    ));
}

#[tokio::test]
async fn test_abandoned_connect_resets_state() {
    // Accepts the TCP connection but never answers the upgrade.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let silent = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let connector = Connector::builder(SECRET).build().unwrap();
    let attempt = tokio::time::timeout(
        Duration::from_millis(100),
        connector.connect("127.0.0.1", silent.port(), false),
    )
    .await;
    assert!(attempt.is_err());
    assert_eq!(connector.state(), ConnectorState::Disconnected);

    let addr = relay_server(|mut ws| async move {
        let _ = ws.next().await;
    })
    .await;
    let _requests = connector
        .connect("127.0.0.1", addr.port(), false)
        .await
        .unwrap();
    assert_eq!(connector.state(), ConnectorState::Connected);
    connector.disconnect().await;
}
