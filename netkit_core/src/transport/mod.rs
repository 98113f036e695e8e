//! Byte-stream transport abstraction.
//!
//! A [`Transport`] is a non-blocking byte stream: plain TCP or TLS-over-TCP,
//! behind the same trait so the event loop and dispatch layers never know
//! which one they're holding.

pub mod tcp;
pub mod tls;

pub use tcp::TcpTransport;
pub use tls::{TlsAcceptorConfig, TlsTransport};

use crate::error::TransportError;

/// Local and peer socket addresses for an accepted or connected stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub local: std::net::SocketAddr,
    pub peer: std::net::SocketAddr,
}

/// A non-blocking byte stream, plain or TLS-wrapped.
///
/// Implementations wrap a [`tokio::net::TcpStream`] directly rather than
/// reinventing readiness polling: `try_read`/`try_write` are
/// non-allocating, non-blocking attempts, and `readable`/`writable` are the
/// readiness-notification primitive the event loop awaits on.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Non-blocking read attempt; `WouldBlock` means "try again once
    /// `readable()` resolves".
    fn try_read(&self, out: &mut [u8]) -> Result<usize, TransportError>;

    /// Non-blocking write attempt; `WouldBlock` means "try again once
    /// `writable()` resolves".
    fn try_write(&self, buf: &[u8]) -> Result<usize, TransportError>;

    /// Resolves once the stream is readable without blocking.
    async fn readable(&self) -> Result<(), TransportError>;

    /// Resolves once the stream is writable without blocking.
    async fn writable(&self) -> Result<(), TransportError>;

    fn endpoints(&self) -> Endpoints;

    async fn shutdown(&self) -> Result<(), TransportError>;

    /// Writes the whole buffer, parking on `writable()` whenever a partial
    /// or `WouldBlock` write leaves bytes unsent.
    async fn write_all(&self, mut buf: &[u8]) -> Result<(), TransportError> {
        while !buf.is_empty() {
            match self.try_write(buf) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => buf = &buf[n..],
                Err(TransportError::WouldBlock | TransportError::Interrupted) => {
                    self.writable().await?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
