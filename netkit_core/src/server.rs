//! Server-side composition root: ties the transport, registry, dispatch,
//! upgrade, and event-loop components together behind a small public API
//! (`listen`, `route`, `on_error`, `allow_upgrade`, `add_websocket_handler`,
//! `write_frame`, `read_frame`, `start`, `close`).

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ServerConfig, TlsMode};
use crate::dispatch::{HandlerContext, HandlerTable};
use crate::error::{HttpError, TransportError};
use crate::eventloop::{self, ConnectionFuture};
use crate::http::{serializer, HttpResponse, RequestParser};
use crate::registry::{ConnState, Connection, ConnectionRegistry, PeerKey, ProtocolMode};
use crate::transport::{tcp::TcpTransport, tls::TlsTransport, Transport};
use crate::upgrade;
use crate::ws::{Delivery, FrameParser, MessageAssembler, Opcode, Role, WebSocketFrame};

/// Callback invoked for every completed inbound WebSocket message.
pub type WsHandler = Arc<dyn Fn(&PeerKey, Opcode, Vec<u8>) + Send + Sync>;

/// Ties every protocol-core component together for the server side.
pub struct Server {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    routes: HandlerTable,
    ws_handler: Option<WsHandler>,
    shutdown: CancellationToken,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(ConnectionRegistry::new()),
            routes: HandlerTable::new(),
            ws_handler: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn route(
        &mut self,
        method: crate::http::Method,
        path: impl Into<String>,
        handler: impl Fn(&crate::http::HttpRequest, &HandlerContext<'_>) -> crate::dispatch::HandlerResult
            + Send
            + Sync
            + 'static,
    ) {
        self.routes.route(method, path, handler);
    }

    pub fn on_error(
        &mut self,
        code: u16,
        handler: impl Fn(&crate::http::HttpRequest, u16) -> HttpResponse + Send + Sync + 'static,
    ) {
        self.routes.on_error(code, handler);
    }

    pub fn allow_upgrade(&mut self, path: impl Into<String>) {
        self.config.allow_upgrade_paths.allow(path);
    }

    pub fn add_websocket_handler(
        &mut self,
        handler: impl Fn(&PeerKey, Opcode, Vec<u8>) + Send + Sync + 'static,
    ) {
        self.ws_handler = Some(Arc::new(handler));
    }

    /// Signals the loop/workers to stop accepting and closes every
    /// registered connection.
    pub fn close(&self) {
        self.shutdown.cancel();
        self.registry.for_each(|conn| {
            conn.set_state(ConnState::Closing);
        });
    }

    /// Broadcasts to every WebSocket-connected peer, or targets one if
    /// `target` is given.
    pub async fn write_frame(&self, frame: &WebSocketFrame, target: Option<&PeerKey>) {
        let bytes = crate::ws::write_frame(frame, Role::Server);
        let mut targets = Vec::new();
        self.registry.for_each(|conn| {
            let matches_target = target.is_none_or(|key| *key == conn.key);
            if matches_target && conn.mode() == ProtocolMode::WebSocket {
                targets.push(conn.clone());
            }
        });
        for conn in targets {
            if self.write_bounded(&conn, &bytes).await.is_err() {
                warn!(peer = ?conn.key, "write_frame failed, closing connection");
                self.registry.remove(&conn.key);
            }
        }
    }

    /// Pops the next frame that finished arriving on `peer`'s connection,
    /// or `None` ("not finished yet") if nothing has completed.
    pub fn read_frame(&self, peer: &PeerKey) -> Option<WebSocketFrame> {
        self.registry.get(peer)?.pop_inbound()
    }

    /// Binds `addr` and runs the accept loop under the configured
    /// scheduling mode until `close()` is called.
    pub async fn start(self: Arc<Self>, addr: SocketAddr) -> Result<(), TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::from_io)?;
        info!(%addr, "listening");

        let acceptor = match &self.config.tls {
            TlsMode::Off => None,
            TlsMode::On { cert_file, key_file } => {
                let cfg = crate::transport::TlsAcceptorConfig {
                    cert_file: cert_file.clone(),
                    key_file: key_file.clone(),
                };
                Some(TlsTransport::acceptor_from_config(&cfg).map_err(|e| {
                    TransportError::System {
                        code: -1,
                        message: e.to_string(),
                    }
                })?)
            }
        };

        let mode = self.config.scheduling_mode;
        let shutdown = self.shutdown.clone();
        let server = self.clone();
        let listener = Arc::new(listener);

        let accept_next = move || -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Option<ConnectionFuture>> + Send>,
        > {
            let listener = listener.clone();
            let acceptor = acceptor.clone();
            let server = server.clone();
            Box::pin(async move {
                match listener.accept().await {
                    Ok((stream, _peer)) => {
                        let server = server.clone();
                        let fut: ConnectionFuture = match acceptor {
                            Some(acceptor) => Box::pin(async move {
                                match TlsTransport::accept(&acceptor, stream).await {
                                    Ok(transport) => {
                                        server.handle_connection(Arc::new(transport)).await
                                    }
                                    Err(e) => warn!(error = %e, "TLS accept failed"),
                                }
                            }),
                            None => match TcpTransport::new(stream) {
                                Ok(transport) => {
                                    Box::pin(server.handle_connection(Arc::new(transport)))
                                }
                                Err(e) => Box::pin(async move {
                                    warn!(error = %e, "failed to wrap accepted stream");
                                }),
                            },
                        };
                        Some(fut)
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        None
                    }
                }
            })
        };

        eventloop::run(mode, shutdown, accept_next).await;
        Ok(())
    }

    async fn handle_connection(self: Arc<Self>, transport: Arc<dyn Transport>) {
        let peer = transport.endpoints().peer;
        let key = PeerKey::from_addr(peer);
        let conn = Arc::new(Connection::new(key.clone(), transport.clone()));
        self.registry.insert(conn.clone());

        let mut http_parser = RequestParser::new();
        let mut ws_parser = FrameParser::new(Role::Server);
        let mut assembler = MessageAssembler::new();
        let mut read_buf = vec![0u8; self.config.buffer_size];

        loop {
            if conn.state() != ConnState::Connected {
                break;
            }
            let keep_going = match conn.mode() {
                ProtocolMode::Http => {
                    self.pump_http(&conn, &mut http_parser, &mut read_buf).await
                }
                ProtocolMode::WebSocket => {
                    self.pump_ws(&conn, &mut ws_parser, &mut assembler, &mut read_buf)
                        .await
                }
            };
            if !keep_going {
                break;
            }
        }
        self.registry.remove(&key);
    }

    /// Waits for read-readiness, bounded by the configured read timeout.
    /// Moves the connection to `Closing` and returns `false` on timeout.
    async fn wait_readable(&self, conn: &Arc<Connection>) -> bool {
        let wait = conn.transport.readable();
        let ready = match self.config.read_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, wait).await {
                Ok(result) => result,
                Err(_) => {
                    conn.set_state(ConnState::Closing);
                    return false;
                }
            },
            None => wait.await,
        };
        ready.is_ok()
    }

    /// Writes `bytes` in full, bounded by the configured write timeout.
    async fn write_bounded(&self, conn: &Arc<Connection>, bytes: &[u8]) -> Result<(), TransportError> {
        let write = conn.transport.write_all(bytes);
        match self.config.write_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, write).await {
                Ok(result) => result,
                Err(_) => {
                    conn.set_state(ConnState::Closing);
                    Err(TransportError::WouldBlock)
                }
            },
            None => write.await,
        }
    }

    /// Reads and dispatches HTTP requests on `conn`, returning `false` once
    /// the connection should close.
    async fn pump_http(
        &self,
        conn: &Arc<Connection>,
        parser: &mut RequestParser,
        read_buf: &mut [u8],
    ) -> bool {
        if !self.wait_readable(conn).await {
            return false;
        }
        let n = match conn.transport.try_read(read_buf) {
            Ok(n) => n,
            Err(TransportError::WouldBlock | TransportError::Interrupted) => return true,
            Err(_) => return false,
        };
        if n == 0 {
            return false;
        }

        let req = match parser.push(&read_buf[..n]) {
            Ok(Some(req)) => req,
            Ok(None) => return true,
            Err(err) => {
                self.write_http_error(conn, &err).await;
                return false;
            }
        };

        let wants_upgrade = self.config.allow_upgrade_paths.contains(&req.url)
            && req
                .headers
                .get("upgrade")
                .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));

        if wants_upgrade {
            match upgrade::negotiate_server_upgrade(&req, &self.config.allow_upgrade_paths) {
                Ok(response) => {
                    self.write_response(conn, &response).await;
                    conn.set_mode(ProtocolMode::WebSocket);
                    return true;
                }
                Err(err) => {
                    self.write_response(conn, &upgrade::rejection_response(&err)).await;
                    return true;
                }
            }
        }

        let ctx = HandlerContext {
            peer_ip: &conn.key.ip,
            peer_service: &conn.key.service,
        };
        let response = self.routes.dispatch(&req, &ctx);
        let requested_close = |headers: &crate::http::message::Headers| {
            headers
                .get("connection")
                .is_some_and(|v| v.eq_ignore_ascii_case("close"))
        };
        let close_after = requested_close(&req.headers) || requested_close(&response.headers);
        self.write_response(conn, &response).await;
        !close_after
    }

    async fn write_response(&self, conn: &Arc<Connection>, response: &HttpResponse) {
        let bytes = serializer::write_response(response);
        if self.write_bounded(conn, &bytes).await.is_err() {
            conn.set_state(ConnState::Closing);
        }
    }

    async fn write_http_error(&self, conn: &Arc<Connection>, _err: &HttpError) {
        self.write_response(conn, &HttpResponse::canned(400)).await;
    }

    /// Reads and delivers WebSocket frames on `conn`, returning `false`
    /// once the session should close.
    async fn pump_ws(
        &self,
        conn: &Arc<Connection>,
        parser: &mut FrameParser,
        assembler: &mut MessageAssembler,
        read_buf: &mut [u8],
    ) -> bool {
        if !self.wait_readable(conn).await {
            return false;
        }
        let n = match conn.transport.try_read(read_buf) {
            Ok(n) => n,
            Err(TransportError::WouldBlock | TransportError::Interrupted) => return true,
            Err(_) => return false,
        };
        if n == 0 {
            return false;
        }

        let frames = match parser.push(&read_buf[..n]) {
            Ok(frames) => frames,
            Err(err) => {
                self.close_with_error(conn, err.close_code(), &err.to_string()).await;
                return false;
            }
        };

        for frame in frames {
            if !self.handle_ws_frame(conn, assembler, frame).await {
                return false;
            }
        }
        true
    }

    /// Sends a CLOSE frame carrying `code`/`reason` and shuts the
    /// transport down, used whenever a protocol violation ends the session.
    async fn close_with_error(&self, conn: &Arc<Connection>, code: u16, reason: &str) {
        let close = WebSocketFrame::close(code, reason);
        let bytes = crate::ws::write_frame(&close, Role::Server);
        let _ = self.write_bounded(conn, &bytes).await;
        let _ = conn.transport.shutdown().await;
    }

    async fn handle_ws_frame(
        &self,
        conn: &Arc<Connection>,
        assembler: &mut MessageAssembler,
        frame: WebSocketFrame,
    ) -> bool {
        match assembler.accept(frame) {
            Ok(Delivery::Control(frame)) => self.handle_control_frame(conn, frame).await,
            Ok(Delivery::Message(opcode, payload)) => {
                conn.push_inbound(WebSocketFrame::new(opcode, payload.clone()));
                if let Some(handler) = &self.ws_handler {
                    handler(&conn.key, opcode, payload);
                }
                true
            }
            Ok(Delivery::Pending) => true,
            Err(err) => {
                self.close_with_error(conn, err.close_code(), &err.to_string()).await;
                false
            }
        }
    }

    async fn handle_control_frame(&self, conn: &Arc<Connection>, frame: WebSocketFrame) -> bool {
        match frame.opcode {
            Opcode::Ping => {
                let pong = WebSocketFrame::pong(frame.payload);
                let bytes = crate::ws::write_frame(&pong, Role::Server);
                let _ = self.write_bounded(conn, &bytes).await;
                true
            }
            Opcode::Pong => true,
            Opcode::Close => {
                let code = frame.close_code().unwrap_or(1000);
                let close = WebSocketFrame::close(code, "");
                let bytes = crate::ws::write_frame(&close, Role::Server);
                let _ = self.write_bounded(conn, &bytes).await;
                let _ = conn.transport.shutdown().await;
                false
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingTransport {
        written: Mutex<Vec<u8>>,
        shut_down: std::sync::atomic::AtomicBool,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                written: Mutex::new(Vec::new()),
                shut_down: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    #[async_trait::async_trait]
    impl Transport for RecordingTransport {
        fn try_read(&self, _out: &mut [u8]) -> Result<usize, TransportError> {
            Ok(0)
        }
        fn try_write(&self, buf: &[u8]) -> Result<usize, TransportError> {
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        async fn readable(&self) -> Result<(), TransportError> {
            Ok(())
        }
        async fn writable(&self) -> Result<(), TransportError> {
            Ok(())
        }
        fn endpoints(&self) -> crate::transport::Endpoints {
            crate::transport::Endpoints {
                local: "127.0.0.1:0".parse().unwrap(),
                peer: "127.0.0.1:0".parse().unwrap(),
            }
        }
        async fn shutdown(&self) -> Result<(), TransportError> {
            self.shut_down.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    fn connection_with(transport: Arc<RecordingTransport>) -> Arc<Connection> {
        let key = PeerKey {
            ip: "127.0.0.1".into(),
            service: "1".into(),
        };
        Arc::new(Connection::new(key, transport))
    }

    #[tokio::test]
    async fn ping_control_frame_gets_a_pong_with_the_same_payload() {
        let server = Server::new(ServerConfig::new());
        let transport = Arc::new(RecordingTransport::new());
        let conn = connection_with(transport.clone());

        let ping = WebSocketFrame::ping(b"abc".to_vec());
        let keep_going = server.handle_control_frame(&conn, ping).await;

        assert!(keep_going);
        let written = transport.written.lock().unwrap().clone();
        let mut parser = FrameParser::new(Role::Client);
        let frames = parser.push(&written).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].opcode, Opcode::Pong);
        assert_eq!(frames[0].payload, b"abc");
        assert!(!transport.shut_down.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn close_control_frame_echoes_the_code_and_shuts_the_transport_down() {
        let server = Server::new(ServerConfig::new());
        let transport = Arc::new(RecordingTransport::new());
        let conn = connection_with(transport.clone());

        let close = WebSocketFrame::close(1000, "bye");
        let keep_going = server.handle_control_frame(&conn, close).await;

        assert!(!keep_going);
        let written = transport.written.lock().unwrap().clone();
        let mut parser = FrameParser::new(Role::Client);
        let frames = parser.push(&written).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].opcode, Opcode::Close);
        assert_eq!(frames[0].close_code(), Some(1000));
        assert!(transport.shut_down.load(std::sync::atomic::Ordering::SeqCst));
    }
}
