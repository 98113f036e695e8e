//! Client-side API.
//!
//! One method-agnostic `request` covers every HTTP verb instead of a
//! per-method overload, plus an orthogonal `submit` wrapper — `submit` is
//! just `request` itself, since every client call in this crate is already
//! `async fn` and needs no second wrapper layer; it exists so callers who
//! want to fire a request and hold the join handle can do so explicitly
//! via `tokio::spawn(client.submit(..))`.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::{ClientConfig, TlsMode};
use crate::error::{HttpError, TransportError, UpgradeError};
use crate::http::{serializer, HttpRequest, HttpResponse, Method, ResponseParser};
use crate::transport::{tcp::TcpTransport, tls::TlsTransport, Transport};
use crate::upgrade;
use crate::ws::{FrameParser, Role, WebSocketFrame};

/// A connected client, HTTP-mode until [`Client::upgrade`] switches it.
pub struct Client {
    transport: Arc<dyn Transport>,
    host: String,
    ws_parser: Option<FrameParser>,
    /// Frames a transport read completed but `read_ws` hasn't handed out
    /// yet — one read can complete more than one frame.
    ws_pending: VecDeque<WebSocketFrame>,
}

impl Client {
    /// Connects to `addr`, optionally over TLS (`ClientConfig::tls`).
    pub async fn connect(
        addr: SocketAddr,
        host: impl Into<String>,
        config: &ClientConfig,
    ) -> Result<Self, TransportError> {
        let host = host.into();
        let transport: Arc<dyn Transport> = match &config.tls {
            TlsMode::Off => Arc::new(TcpTransport::connect(addr).await?),
            TlsMode::On { .. } => {
                let root_store =
                    rustls::RootCertStore::from_iter(webpki_roots_fallback_empty_iter());
                let tls_config = rustls::ClientConfig::builder()
                    .with_root_certificates(root_store)
                    .with_no_client_auth();
                let connector = tokio_rustls::TlsConnector::from(Arc::new(tls_config));
                let name = rustls_pki_types::ServerName::try_from(host.clone())
                    .map_err(|_| TransportError::System {
                        code: -1,
                        message: "invalid TLS server name".into(),
                    })?
                    .to_owned();
                Arc::new(TlsTransport::connect(&connector, name, addr).await?)
            }
        };
        Ok(Self {
            transport,
            host,
            ws_parser: None,
            ws_pending: VecDeque::new(),
        })
    }

    /// Method-agnostic request: serializes, sends, and reads back one
    /// complete response.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        headers: &[(&str, &str)],
        body: Vec<u8>,
    ) -> Result<HttpResponse, HttpError> {
        let mut req = HttpRequest::new(method, path)
            .with_header("Host", &self.host)
            .with_body(body);
        for (key, value) in headers {
            req = req.with_header(key, value);
        }
        let bytes = serializer::write_request(&req);
        self.transport
            .write_all(&bytes)
            .await
            .map_err(|_| HttpError::TruncatedBody)?;

        let mut parser = ResponseParser::new();
        parser.no_body_expected = method == Method::Head;
        let mut buf = [0u8; 4096];
        loop {
            if self.transport.readable().await.is_err() {
                return parser
                    .finish_on_eof()
                    .ok()
                    .flatten()
                    .ok_or(HttpError::TruncatedBody);
            }
            match self.transport.try_read(&mut buf) {
                Ok(0) => {
                    return parser
                        .finish_on_eof()
                        .ok()
                        .flatten()
                        .ok_or(HttpError::TruncatedBody)
                }
                Ok(n) => {
                    if let Some(res) = parser.push(&buf[..n])? {
                        return Ok(res);
                    }
                }
                Err(TransportError::WouldBlock | TransportError::Interrupted) => continue,
                Err(_) => return Err(HttpError::TruncatedBody),
            }
        }
    }

    /// Fire-and-hold wrapper: identical to `request`, exposed separately so
    /// callers can `tokio::spawn` it without changing call sites.
    pub async fn submit(
        self: Arc<Self>,
        method: Method,
        path: String,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    ) -> Result<HttpResponse, HttpError> {
        let header_refs: Vec<(&str, &str)> = headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        self.request(method, &path, &header_refs, body).await
    }

    /// Performs the client-side WebSocket handshake: sends the upgrade
    /// request, verifies `Sec-WebSocket-Accept`.
    pub async fn upgrade(&mut self, path: &str) -> Result<(), UpgradeError> {
        let (req, key) = upgrade::build_client_upgrade_request(path, &self.host);
        let bytes = serializer::write_request(&req);
        self.transport
            .write_all(&bytes)
            .await
            .map_err(|_| UpgradeError::MissingKey)?;

        let mut parser = ResponseParser::new();
        parser.no_body_expected = true;
        let mut buf = [0u8; 4096];
        let response = loop {
            if self.transport.readable().await.is_err() {
                return Err(UpgradeError::MissingKey);
            }
            match self.transport.try_read(&mut buf) {
                Ok(0) => return Err(UpgradeError::MissingKey),
                Ok(n) => {
                    if let Some(res) = parser
                        .push(&buf[..n])
                        .map_err(|_| UpgradeError::MissingKey)?
                    {
                        break res;
                    }
                }
                Err(TransportError::WouldBlock | TransportError::Interrupted) => continue,
                Err(_) => return Err(UpgradeError::MissingKey),
            }
        };

        upgrade::verify_server_accept(&key, &response)?;
        self.ws_parser = Some(FrameParser::new(Role::Client));
        Ok(())
    }

    /// Sends a frame masked per the client role.
    pub async fn write_ws(&self, frame: &WebSocketFrame) -> Result<(), TransportError> {
        let bytes = crate::ws::write_frame(frame, Role::Client);
        self.transport.write_all(&bytes).await
    }

    /// Reads and returns the next available WebSocket frame, or
    /// `Ok(None)` if nothing has finished arriving yet.
    ///
    /// One transport read can complete more than one frame; any frame
    /// beyond the first is queued in `ws_pending` and drained on
    /// subsequent calls before a new transport read is attempted.
    pub async fn read_ws(&mut self) -> Result<Option<WebSocketFrame>, TransportError> {
        if let Some(frame) = self.ws_pending.pop_front() {
            return Ok(Some(frame));
        }
        let parser = self
            .ws_parser
            .as_mut()
            .expect("read_ws called before upgrade()");
        self.transport.readable().await?;
        let mut buf = [0u8; 4096];
        match self.transport.try_read(&mut buf) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => {
                let frames = parser
                    .push(&buf[..n])
                    .map_err(|_| TransportError::Closed)?;
                self.ws_pending.extend(frames);
                Ok(self.ws_pending.pop_front())
            }
            Err(TransportError::WouldBlock | TransportError::Interrupted) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn close(&self) -> Result<(), TransportError> {
        self.transport.shutdown().await
    }
}

/// No bundled CA roots ship with this crate; callers who need public CA
/// validation should supply their own
/// `rustls::RootCertStore` — this empty iterator is the explicit "bring
/// your own roots" seam.
fn webpki_roots_fallback_empty_iter() -> impl Iterator<Item = rustls_pki_types::TrustAnchor<'static>>
{
    std::iter::empty()
}
