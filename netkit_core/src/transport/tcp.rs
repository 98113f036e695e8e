//! Plain TCP realization of [`Transport`].

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::error::TransportError;
use crate::transport::{Endpoints, Transport};

/// A connected, non-blocking TCP stream, split into owned halves.
///
/// `OwnedReadHalf`/`OwnedWriteHalf` mirror `TcpStream`'s own
/// `try_read`/`try_write`/`readable`/`writable` as `&self` methods, so
/// normal traffic needs no locking at all. Only `shutdown` — the one
/// operation `AsyncWriteExt` insists on `&mut self` for — needs a lock,
/// and it gets its own on the write half alone: a reader parked in
/// `readable()` never blocks a concurrent writer, or vice versa, the way
/// a single mutex over the whole stream would.
pub struct TcpTransport {
    read_half: OwnedReadHalf,
    write_half: tokio::sync::Mutex<OwnedWriteHalf>,
    endpoints: Endpoints,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Result<Self, TransportError> {
        let local = stream.local_addr().map_err(TransportError::from_io)?;
        let peer = stream.peer_addr().map_err(TransportError::from_io)?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            read_half,
            write_half: tokio::sync::Mutex::new(write_half),
            endpoints: Endpoints { local, peer },
        })
    }

    pub async fn connect(addr: std::net::SocketAddr) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(TransportError::from_io)?;
        Self::new(stream)
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    fn try_read(&self, out: &mut [u8]) -> Result<usize, TransportError> {
        match self.read_half.try_read(out) {
            Ok(0) if !out.is_empty() => Err(TransportError::Closed),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(TransportError::WouldBlock),
            Err(e) => Err(TransportError::from_io(e)),
        }
    }

    fn try_write(&self, buf: &[u8]) -> Result<usize, TransportError> {
        let guard = self
            .write_half
            .try_lock()
            .map_err(|_| TransportError::WouldBlock)?;
        match guard.try_write(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(TransportError::WouldBlock),
            Err(e) => Err(TransportError::from_io(e)),
        }
    }

    async fn readable(&self) -> Result<(), TransportError> {
        self.read_half.readable().await.map_err(TransportError::from_io)
    }

    async fn writable(&self) -> Result<(), TransportError> {
        let guard = self.write_half.lock().await;
        guard.writable().await.map_err(TransportError::from_io)
    }

    fn endpoints(&self) -> Endpoints {
        self.endpoints.clone()
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        let mut guard = self.write_half.lock().await;
        guard.shutdown().await.map_err(TransportError::from_io)
    }
}
