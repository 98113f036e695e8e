//! End-to-end tests driving a real `Server` over TCP against a real
//! `Client`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use netkit_core::client::Client;
use netkit_core::config::{ClientConfig, ServerConfig};
use netkit_core::http::{HttpResponse, Method, StatusCode};
use netkit_core::server::Server;
use netkit_core::ws::WebSocketFrame;

/// Polls `read_ws` until a frame is available, since a single call can
/// return `None` while a large frame is still arriving across several
/// transport reads.
async fn recv_ws_frame(client: &mut Client) -> netkit_core::ws::WebSocketFrame {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(frame) = client.read_ws().await.unwrap() {
                return frame;
            }
        }
    })
    .await
    .expect("timed out waiting for a websocket frame")
}

async fn spawn_server(mut configure: impl FnMut(&mut Server)) -> (Arc<Server>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut server = Server::new(ServerConfig::new());
    configure(&mut server);
    let server = Arc::new(server);

    let server_for_run = server.clone();
    tokio::spawn(async move {
        let _ = server_for_run.start(addr).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    (server, addr)
}

#[tokio::test]
async fn routed_request_returns_200() {
    let (_server, addr) = spawn_server(|s| {
        s.route(Method::Get, "/hello", |_req, _ctx| {
            Ok(HttpResponse::new(StatusCode::Ok).with_body(b"hi".to_vec()))
        });
    })
    .await;

    let client = Client::connect(addr, "localhost", &ClientConfig::new())
        .await
        .unwrap();
    let response = client
        .request(Method::Get, "/hello", &[], Vec::new())
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"hi");
}

#[tokio::test]
async fn missing_route_returns_404() {
    let (_server, addr) = spawn_server(|_s| {}).await;

    let client = Client::connect(addr, "localhost", &ClientConfig::new())
        .await
        .unwrap();
    let response = client
        .request(Method::Post, "/x", &[], b"abc".to_vec())
        .await
        .unwrap();

    assert_eq!(response.status, 404);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn websocket_upgrade_and_echo_round_trip() {
    let (server, addr) = spawn_server(|s| {
        s.allow_upgrade("/ws");
    })
    .await;

    let mut client = Client::connect(addr, "localhost", &ClientConfig::new())
        .await
        .unwrap();
    client.upgrade("/ws").await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    // The server doesn't know the client's peer key ahead of time, so
    // broadcast to every connected WebSocket peer (there's exactly one).
    let frame = WebSocketFrame::text("hello from server".to_string());
    server.write_frame(&frame, None).await;

    let received = recv_ws_frame(&mut client).await;
    assert_eq!(received.payload, b"hello from server");
}

#[tokio::test]
async fn boundary_payload_sizes_round_trip_over_the_wire() {
    let (server, addr) = spawn_server(|s| {
        s.allow_upgrade("/ws");
    })
    .await;

    let mut client = Client::connect(addr, "localhost", &ClientConfig::new())
        .await
        .unwrap();
    client.upgrade("/ws").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    for len in [0usize, 125, 126, 65535, 65536] {
        let payload = vec![0xAB; len];
        let frame = WebSocketFrame::binary(payload.clone());
        server.write_frame(&frame, None).await;
        let received = recv_ws_frame(&mut client).await;
        assert_eq!(received.payload, payload);
    }
}

#[tokio::test]
async fn ping_is_answered_with_identical_payload_pong() {
    let (_server, addr) = spawn_server(|s| {
        s.allow_upgrade("/ws");
    })
    .await;

    let mut client = Client::connect(addr, "localhost", &ClientConfig::new())
        .await
        .unwrap();
    client.upgrade("/ws").await.unwrap();

    let ping = WebSocketFrame::ping(b"keepalive".to_vec());
    client.write_ws(&ping).await.unwrap();

    let received = recv_ws_frame(&mut client).await;
    assert_eq!(received.opcode, netkit_core::ws::Opcode::Pong);
    assert_eq!(received.payload, b"keepalive");
}

#[tokio::test]
async fn close_handshake_closes_the_connection() {
    let (_server, addr) = spawn_server(|s| {
        s.allow_upgrade("/ws");
    })
    .await;

    let mut client = Client::connect(addr, "localhost", &ClientConfig::new())
        .await
        .unwrap();
    client.upgrade("/ws").await.unwrap();

    let close = WebSocketFrame::close(1000, "");
    client.write_ws(&close).await.unwrap();

    let received = recv_ws_frame(&mut client).await;
    assert_eq!(received.opcode, netkit_core::ws::Opcode::Close);
    assert_eq!(received.close_code(), Some(1000));

    // The server shuts its side of the TCP connection down after replying;
    // the next read observes EOF.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match client.read_ws().await {
                Ok(None) => continue,
                Ok(Some(_)) => panic!("unexpected frame after server closed"),
                Err(_) => return,
            }
        }
    })
    .await
    .expect("server did not close the connection after the close handshake");
}

/// Per-connection read/write timeouts are transport-level configuration;
/// on timeout, the connection moves to `Closing` and is dropped.
#[tokio::test]
async fn idle_connection_past_read_timeout_is_closed() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = ServerConfig::new();
    config.read_timeout = Some(Duration::from_millis(100));
    let server = Arc::new(Server::new(config));
    let server_for_run = server.clone();
    tokio::spawn(async move {
        let _ = server_for_run.start(addr).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Connect directly over raw TCP and never send a request; the
    // server's read timeout should close the connection from its side.
    let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            stream.readable().await.unwrap();
            match stream.try_read(&mut buf) {
                Ok(n) => return n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) => panic!("unexpected read error: {e}"),
            }
        }
    })
    .await
    .expect("server did not close the idle connection within the read timeout");
    assert_eq!(n, 0, "expected EOF once the server's read timeout closed the connection");
}
