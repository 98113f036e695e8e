//! TLS transport decorator over [`TcpTransport`].
//!
//! Certificates are loaded once (PEM, PKCS8 with an RSA/PKCS1 fallback for
//! keys that aren't PKCS8) and shared across every accepted connection via
//! the `Arc<ServerConfig>` rustls already hands out.

use std::io::BufReader;
use std::sync::Arc;

use rustls_pki_types::PrivateKeyDer;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::error::{TlsError, TransportError};
use crate::transport::{Endpoints, Transport};

/// Cert/key file pair used to build a server-side TLS acceptor.
pub struct TlsAcceptorConfig {
    pub cert_file: std::path::PathBuf,
    pub key_file: std::path::PathBuf,
}

fn load_server_config(cfg: &TlsAcceptorConfig) -> Result<rustls::ServerConfig, TlsError> {
    let cert_file = std::fs::File::open(&cfg.cert_file)
        .map_err(|e| TlsError::CertLoadFailed(e.to_string()))?;
    let mut cert_reader = BufReader::new(cert_file);
    let cert_chain = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::CertLoadFailed(e.to_string()))?;

    let key_file = std::fs::File::open(&cfg.key_file)
        .map_err(|e| TlsError::CertLoadFailed(e.to_string()))?;
    let mut key_reader = BufReader::new(key_file);
    let mut keys: Vec<PrivateKeyDer> = rustls_pemfile::pkcs8_private_keys(&mut key_reader)
        .map(|k| k.map(PrivateKeyDer::Pkcs8))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::CertLoadFailed(e.to_string()))?;

    if keys.is_empty() {
        let key_file = std::fs::File::open(&cfg.key_file)
            .map_err(|e| TlsError::CertLoadFailed(e.to_string()))?;
        let mut key_reader = BufReader::new(key_file);
        keys = rustls_pemfile::rsa_private_keys(&mut key_reader)
            .map(|k| k.map(PrivateKeyDer::Pkcs1))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TlsError::CertLoadFailed(e.to_string()))?;
    }

    let key = keys.into_iter().next().ok_or(TlsError::KeyMismatch)?;

    rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|e| TlsError::CertLoadFailed(e.to_string()))
}

type TlsReadHalf = tokio::io::ReadHalf<tokio_rustls::TlsStream<TcpStream>>;
type TlsWriteHalf = tokio::io::WriteHalf<tokio_rustls::TlsStream<TcpStream>>;

/// A TLS-wrapped stream. Handshake happens once, inside `accept`/`connect`;
/// afterward reads/writes are transparently encrypted/decrypted.
///
/// Read and write halves are split into their own locks:
/// `tokio_rustls::TlsStream` only offers `poll_read`/`poll_write` (no
/// `try_read`/`try_write`/`readable` the way `TcpStream` does), so some
/// locking is unavoidable here — but a single lock guarding both
/// directions would let a reader parked in `readable()` starve a
/// concurrent writer, exactly the bug a split avoids.
pub struct TlsTransport {
    read_half: tokio::sync::Mutex<TlsReadHalf>,
    write_half: tokio::sync::Mutex<TlsWriteHalf>,
    endpoints: Endpoints,
}

impl TlsTransport {
    fn from_stream(tls_stream: tokio_rustls::TlsStream<TcpStream>, endpoints: Endpoints) -> Self {
        let (read_half, write_half) = tokio::io::split(tls_stream);
        Self {
            read_half: tokio::sync::Mutex::new(read_half),
            write_half: tokio::sync::Mutex::new(write_half),
            endpoints,
        }
    }

    /// Server-side: performs the handshake over an already-accepted TCP
    /// stream using a shared, pre-built acceptor.
    pub async fn accept(
        acceptor: &TlsAcceptor,
        stream: TcpStream,
    ) -> Result<Self, TransportError> {
        let local = stream.local_addr().map_err(TransportError::from_io)?;
        let peer = stream.peer_addr().map_err(TransportError::from_io)?;
        let tls_stream = acceptor
            .accept(stream)
            .await
            .map_err(|e| TransportError::System {
                code: -1,
                message: format!("TLS handshake failed: {e}"),
            })?;
        Ok(Self::from_stream(
            tokio_rustls::TlsStream::Server(tls_stream),
            Endpoints { local, peer },
        ))
    }

    /// Client-side: performs the handshake after connecting to `addr`.
    pub async fn connect(
        connector: &TlsConnector,
        server_name: rustls_pki_types::ServerName<'static>,
        addr: std::net::SocketAddr,
    ) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(TransportError::from_io)?;
        let local = stream.local_addr().map_err(TransportError::from_io)?;
        let peer = stream.peer_addr().map_err(TransportError::from_io)?;
        let tls_stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| TransportError::System {
                code: -1,
                message: format!("TLS handshake failed: {e}"),
            })?;
        Ok(Self::from_stream(
            tokio_rustls::TlsStream::Client(tls_stream),
            Endpoints { local, peer },
        ))
    }

    pub fn acceptor_from_config(cfg: &TlsAcceptorConfig) -> Result<TlsAcceptor, TlsError> {
        let server_config = load_server_config(cfg)?;
        Ok(TlsAcceptor::from(Arc::new(server_config)))
    }
}

#[async_trait::async_trait]
impl Transport for TlsTransport {
    fn try_read(&self, out: &mut [u8]) -> Result<usize, TransportError> {
        let mut guard = self.read_half.try_lock().map_err(|_| TransportError::WouldBlock)?;
        match guard.try_read(out) {
            Ok(0) if !out.is_empty() => Err(TransportError::Closed),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(TransportError::WouldBlock),
            Err(e) => Err(TransportError::from_io(e)),
        }
    }

    fn try_write(&self, buf: &[u8]) -> Result<usize, TransportError> {
        let mut guard = self.write_half.try_lock().map_err(|_| TransportError::WouldBlock)?;
        match guard.try_write(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(TransportError::WouldBlock),
            Err(e) => Err(TransportError::from_io(e)),
        }
    }

    async fn readable(&self) -> Result<(), TransportError> {
        // tokio-rustls streams don't expose a separate readiness primitive;
        // a zero-length peek via `try_read` loop is what the underlying
        // TcpStream gives us, so we poll with a short yield instead.
        let mut guard = self.read_half.lock().await;
        let mut probe = [0u8; 0];
        match guard.try_read(&mut probe) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                drop(guard);
                tokio::task::yield_now().await;
                Ok(())
            }
            Err(e) => Err(TransportError::from_io(e)),
        }
    }

    async fn writable(&self) -> Result<(), TransportError> {
        let mut guard = self.write_half.lock().await;
        std::future::poll_fn(|cx| {
            use std::task::Poll;
            match std::pin::Pin::new(&mut *guard).poll_write(cx, &[]) {
                Poll::Ready(Ok(_)) => Poll::Ready(Ok(())),
                Poll::Ready(Err(e)) => Poll::Ready(Err(TransportError::from_io(e))),
                Poll::Pending => Poll::Pending,
            }
        })
        .await
    }

    fn endpoints(&self) -> Endpoints {
        self.endpoints.clone()
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        let mut guard = self.write_half.lock().await;
        guard.shutdown().await.map_err(TransportError::from_io)
    }
}

trait TryRead {
    fn try_read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

impl<T: tokio::io::AsyncRead + Unpin> TryRead for T {
    fn try_read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        use std::task::{Context, Poll};
        let waker = futures_util::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut read_buf = tokio::io::ReadBuf::new(buf);
        match std::pin::Pin::new(self).poll_read(&mut cx, &mut read_buf) {
            Poll::Ready(Ok(())) => Ok(read_buf.filled().len()),
            Poll::Ready(Err(e)) => Err(e),
            Poll::Pending => Err(std::io::Error::from(std::io::ErrorKind::WouldBlock)),
        }
    }
}

trait TryWrite {
    fn try_write(&mut self, buf: &[u8]) -> std::io::Result<usize>;
}

impl<T: tokio::io::AsyncWrite + Unpin> TryWrite for T {
    fn try_write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        use std::task::{Context, Poll};
        let waker = futures_util::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        match std::pin::Pin::new(self).poll_write(&mut cx, buf) {
            Poll::Ready(result) => result,
            Poll::Pending => Err(std::io::Error::from(std::io::ErrorKind::WouldBlock)),
        }
    }
}
