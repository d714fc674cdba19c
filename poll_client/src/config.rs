//! Client configuration.
//!
//! The only externally configurable value is the backend base address; the
//! timeouts have sensible defaults and exist mostly so tests can shorten them.
use std::time::Duration;

use poll_common::Result;
use poll_common::net::{DEFAULT_BASE_URL, Endpoints};

/// Socket read timeout of the live-results reader, in milliseconds.
///
/// Bounds how long a closed subscription's reader keeps the socket after `close`.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 200;
/// Timeout applied to every HTTP request, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
/// Upper bound for establishing the live-results socket, TCP connect and
/// WebSocket upgrade each, in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Resolved client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend endpoints derived from the base address.
    pub endpoints: Endpoints,
    /// Read timeout of the live-results socket.
    pub read_timeout: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Bound on connecting and upgrading the live-results socket.
    pub connect_timeout: Duration,
}

impl ClientConfig {
    /// Configuration for the backend at `base_url` with default timeouts.
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(ClientConfig {
            endpoints: Endpoints::new(base_url)?,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        })
    }

    /// Configuration for the default local backend.
    pub fn local() -> Result<Self> {
        Self::new(DEFAULT_BASE_URL)
    }

    /// Override the live-results read timeout. Zero is bumped to one millisecond,
    /// since a zero socket timeout is rejected by the OS.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    /// Override the live-results connect timeout, clamped like the read timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout.max(Duration::from_millis(1));
        self
    }
}
