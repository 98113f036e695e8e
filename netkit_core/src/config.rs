//! Server/client configuration. Builder-style setters over a `Default` impl,
//! matching the `rustls::ServerConfig::builder()` shape used throughout
//! this crate's TLS setup.

use std::time::Duration;

use crate::dispatch::AllowedUpgradePaths;

/// Which thread/task model the server runs connections under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingMode {
    EventLoop,
    WorkerPool(usize),
}

/// Off, or on with a cert/key file pair.
#[derive(Debug, Clone)]
pub enum TlsMode {
    Off,
    On {
        cert_file: std::path::PathBuf,
        key_file: std::path::PathBuf,
    },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub buffer_size: usize,
    pub scheduling_mode: SchedulingMode,
    pub tls: TlsMode,
    pub allow_upgrade_paths: AllowedUpgradePaths,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            scheduling_mode: SchedulingMode::EventLoop,
            tls: TlsMode::Off,
            allow_upgrade_paths: AllowedUpgradePaths::new(),
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_scheduling_mode(mut self, mode: SchedulingMode) -> Self {
        self.scheduling_mode = mode;
        self
    }

    pub fn with_tls(mut self, cert_file: impl Into<std::path::PathBuf>, key_file: impl Into<std::path::PathBuf>) -> Self {
        self.tls = TlsMode::On {
            cert_file: cert_file.into(),
            key_file: key_file.into(),
        };
        self
    }

    pub fn allow_upgrade(mut self, path: impl Into<String>) -> Self {
        self.allow_upgrade_paths.allow(path);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub buffer_size: usize,
    pub tls: TlsMode,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            tls: TlsMode::Off,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }
}
