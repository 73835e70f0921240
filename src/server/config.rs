//! Server configuration.

use std::net::SocketAddr;

use serde::Deserialize;

/// HTTP server configuration, the `[server]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// The address to bind to.
    pub addr: SocketAddr,
    /// The maximum number of concurrent connections.
    pub max_connections: usize,
    /// The read buffer size.
    pub read_buffer_size: usize,
    /// Largest accepted request body, in bytes.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            max_connections: 1024,
            read_buffer_size: 8192,
            max_body_size: 1_000_000,
        }
    }
}
