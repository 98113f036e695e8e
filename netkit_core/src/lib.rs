//! Transport, HTTP/1.1, and WebSocket protocol core, plus the
//! connection/event-loop engine that drives them (components C1–C7).

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod eventloop;
pub mod http;
pub mod logging;
pub mod registry;
pub mod server;
pub mod transport;
pub mod upgrade;
pub mod ws;

pub use client::Client;
pub use config::{ClientConfig, SchedulingMode, ServerConfig, TlsMode};
pub use registry::{ConnState, Connection, ConnectionRegistry, PeerKey, ProtocolMode};
pub use server::Server;
