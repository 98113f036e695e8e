//! Connection registry: owns every live peer record keyed by [`PeerKey`].
//!
//! A plain `Arc<Mutex<HashMap<..>>>` behind a small API (`insert`/`get`/
//! `remove`/`for_each`), with removal clearing the connection's state to
//! `Closed` so anyone still holding the `Arc` observes the teardown.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::transport::Transport;
use crate::ws::WebSocketFrame;

/// `(ip, service)` identity of a remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerKey {
    pub ip: String,
    pub service: String,
}

impl PeerKey {
    pub fn from_addr(addr: std::net::SocketAddr) -> Self {
        Self {
            ip: addr.ip().to_string(),
            service: addr.port().to_string(),
        }
    }
}

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connected,
    Closing,
    Closed,
}

/// Whether a connection has switched from HTTP framing to WebSocket framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolMode {
    Http,
    WebSocket,
}

/// An owned record per accepted peer.
pub struct Connection {
    pub key: PeerKey,
    pub transport: Arc<dyn Transport>,
    pub state: Mutex<ConnState>,
    pub mode: Mutex<ProtocolMode>,
    /// Completed WebSocket messages waiting to be consumed via
    /// `Server::read_frame`.
    inbox: Mutex<VecDeque<WebSocketFrame>>,
}

impl Connection {
    pub fn new(key: PeerKey, transport: Arc<dyn Transport>) -> Self {
        Self {
            key,
            transport,
            state: Mutex::new(ConnState::Connected),
            mode: Mutex::new(ProtocolMode::Http),
            inbox: Mutex::new(VecDeque::new()),
        }
    }

    /// Queues a completed inbound WebSocket frame for `read_frame` to pop.
    pub fn push_inbound(&self, frame: WebSocketFrame) {
        self.inbox
            .lock()
            .expect("connection inbox lock poisoned")
            .push_back(frame);
    }

    /// Pops the next available inbound frame, or `None` if nothing has
    /// finished arriving yet.
    pub fn pop_inbound(&self) -> Option<WebSocketFrame> {
        self.inbox
            .lock()
            .expect("connection inbox lock poisoned")
            .pop_front()
    }

    pub fn state(&self) -> ConnState {
        *self.state.lock().expect("connection state lock poisoned")
    }

    pub fn set_state(&self, state: ConnState) {
        *self.state.lock().expect("connection state lock poisoned") = state;
    }

    pub fn mode(&self) -> ProtocolMode {
        *self.mode.lock().expect("connection mode lock poisoned")
    }

    pub fn set_mode(&self, mode: ProtocolMode) {
        *self.mode.lock().expect("connection mode lock poisoned") = mode;
    }
}

/// Single source of truth for the connection set, keyed for O(1) average
/// lookup.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<PeerKey, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, conn: Arc<Connection>) {
        let mut guard = self.connections.lock().expect("registry lock poisoned");
        guard.insert(conn.key.clone(), conn);
    }

    pub fn get(&self, key: &PeerKey) -> Option<Arc<Connection>> {
        self.connections
            .lock()
            .expect("registry lock poisoned")
            .get(key)
            .cloned()
    }

    /// Closes and deletes the connection. Only valid from the event-loop
    /// context — callers outside it race the loop thread.
    pub fn remove(&self, key: &PeerKey) -> Option<Arc<Connection>> {
        let removed = self
            .connections
            .lock()
            .expect("registry lock poisoned")
            .remove(key);
        if let Some(conn) = &removed {
            conn.set_state(ConnState::Closed);
        }
        removed
    }

    /// Iterates a snapshot of the live connection set.
    pub fn for_each(&self, mut f: impl FnMut(&Arc<Connection>)) {
        let snapshot: Vec<Arc<Connection>> = self
            .connections
            .lock()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect();
        for conn in &snapshot {
            f(conn);
        }
    }

    pub fn len(&self) -> usize {
        self.connections.lock().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u16) -> PeerKey {
        PeerKey {
            ip: "127.0.0.1".into(),
            service: n.to_string(),
        }
    }

    struct NullTransport;

    #[async_trait::async_trait]
    impl Transport for NullTransport {
        fn try_read(&self, _out: &mut [u8]) -> Result<usize, crate::error::TransportError> {
            Ok(0)
        }
        fn try_write(&self, _buf: &[u8]) -> Result<usize, crate::error::TransportError> {
            Ok(0)
        }
        async fn readable(&self) -> Result<(), crate::error::TransportError> {
            Ok(())
        }
        async fn writable(&self) -> Result<(), crate::error::TransportError> {
            Ok(())
        }
        fn endpoints(&self) -> crate::transport::Endpoints {
            crate::transport::Endpoints {
                local: "127.0.0.1:0".parse().unwrap(),
                peer: "127.0.0.1:0".parse().unwrap(),
            }
        }
        async fn shutdown(&self) -> Result<(), crate::error::TransportError> {
            Ok(())
        }
    }

    #[test]
    fn insert_get_remove_round_trip() {
        let registry = ConnectionRegistry::new();
        let conn = Arc::new(Connection::new(key(1), Arc::new(NullTransport)));
        registry.insert(conn.clone());
        assert!(registry.get(&key(1)).is_some());
        assert_eq!(registry.len(), 1);

        let removed = registry.remove(&key(1)).unwrap();
        assert_eq!(removed.state(), ConnState::Closed);
        assert!(registry.get(&key(1)).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn for_each_iterates_a_snapshot() {
        let registry = ConnectionRegistry::new();
        for n in 0..3 {
            registry.insert(Arc::new(Connection::new(key(n), Arc::new(NullTransport))));
        }
        let mut seen = Vec::new();
        registry.for_each(|c| seen.push(c.key.service.clone()));
        seen.sort();
        assert_eq!(seen, vec!["0", "1", "2"]);
    }
}
