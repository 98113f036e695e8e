//! Error kinds produced by the protocol core.
//!
//! Each concern gets its own `thiserror` enum; nothing in
//! this crate panics or throws across a public API boundary, every
//! fallible operation returns one of these.

use thiserror::Error;

/// Errors surfaced by a [`crate::transport::Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error("operation would block")]
    WouldBlock,
    #[error("operation interrupted")]
    Interrupted,
    #[error("system error ({code}): {message}")]
    System { code: i32, message: String },
}

impl TransportError {
    pub(crate) fn from_io(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::WouldBlock => TransportError::WouldBlock,
            ErrorKind::Interrupted => TransportError::Interrupted,
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                TransportError::Closed
            }
            _ => TransportError::System {
                code: err.raw_os_error().unwrap_or(-1),
                message: err.to_string(),
            },
        }
    }
}

/// TLS-specific failures, layered under [`TransportError`] by the TLS transport.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("TLS handshake failed: {0}")]
    HandshakeFailed(String),
    #[error("failed to load certificate: {0}")]
    CertLoadFailed(String),
    #[error("private key does not match certificate")]
    KeyMismatch,
}

/// HTTP/1.1 parse failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HttpError {
    #[error("malformed start line")]
    BadStartLine,
    #[error("unknown method: {0}")]
    UnknownMethod(String),
    #[error("unsupported HTTP version: {0}")]
    UnsupportedVersion(String),
    #[error("header line without colon: {0}")]
    MalformedHeader(String),
    #[error("non-numeric Content-Length: {0}")]
    BadContentLength(String),
    #[error("connection closed with body not fully received")]
    TruncatedBody,
}

/// WebSocket frame parse failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WsError {
    #[error("reserved bit set")]
    ReservedBitSet,
    #[error("unknown opcode: {0:#x}")]
    UnknownOpcode(u8),
    #[error("mask policy violated for this connection role")]
    MaskPolicyViolation,
    #[error("control frame payload exceeds 125 bytes")]
    ControlFrameTooLarge,
    #[error("control frame was fragmented (fin=0)")]
    FragmentedControlFrame,
    #[error("text frame payload is not valid UTF-8")]
    InvalidUtf8,
}

impl WsError {
    /// RFC 6455 close code to send back when this error tears down a session.
    pub fn close_code(&self) -> u16 {
        1002
    }
}

/// Dispatch-layer failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no route registered for method+path")]
    RouteNotFound,
    #[error("handler raised response code {0}")]
    HandlerRaised(u16),
}

/// Failures while performing the WebSocket upgrade handshake.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpgradeError {
    #[error("path is not registered for upgrade")]
    PathNotAllowed,
    #[error("missing or invalid Upgrade header")]
    MissingUpgradeHeader,
    #[error("missing or invalid Connection header")]
    MissingConnectionHeader,
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,
    #[error("server's Sec-WebSocket-Accept did not match the expected digest")]
    AcceptMismatch,
}
