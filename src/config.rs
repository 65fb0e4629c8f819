//! Server configuration.
//!
//! Everything here is fixed before the server starts and shared read-only by
//! all channels. Nothing is read from the environment.

use std::path::PathBuf;

use crate::protocol::{DEFAULT_MAX_MESSAGE_SIZE, MIN_MAX_MESSAGE_SIZE};
use crate::writer::{WriterConfig, DEFAULT_CHANNEL_CAPACITY};

/// Directory holding sockets and server-info files by default.
pub const DEFAULT_SOCKET_DIR: &str = "/var/run/numaflow";

/// Configuration for one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Largest frame payload accepted or written, in bytes.
    pub max_message_size: usize,
    /// Unix socket the server listens on.
    pub socket_path: PathBuf,
    /// Side-channel file the engine reads before connecting.
    pub server_info_path: PathBuf,
    /// Capacity of each channel's writer queue and group input queue.
    pub channel_capacity: usize,
}

impl ServerConfig {
    /// Defaults with the given socket and server-info paths.
    pub fn new(socket_path: impl Into<PathBuf>, server_info_path: impl Into<PathBuf>) -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            socket_path: socket_path.into(),
            server_info_path: server_info_path.into(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Set the maximum message size; values under 512 bytes are raised to 512.
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size.max(MIN_MAX_MESSAGE_SIZE);
        self
    }

    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = path.into();
        self
    }

    pub fn with_server_info_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.server_info_path = path.into();
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub(crate) fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            channel_capacity: self.channel_capacity,
            max_message_size: self.max_message_size,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(
            format!("{DEFAULT_SOCKET_DIR}/map.sock"),
            format!("{DEFAULT_SOCKET_DIR}/mapper-server-info"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.max_message_size, 64 * 1024 * 1024);
        assert_eq!(config.channel_capacity, 1024);
        assert_eq!(config.socket_path, PathBuf::from("/var/run/numaflow/map.sock"));
    }

    #[test]
    fn test_max_message_size_floor() {
        let config = ServerConfig::default().with_max_message_size(10);
        assert_eq!(config.max_message_size, 512);

        let config = ServerConfig::default().with_max_message_size(4096);
        assert_eq!(config.max_message_size, 4096);
    }

    #[test]
    fn test_writer_config_follows_limits() {
        let writer = ServerConfig::default()
            .with_channel_capacity(0)
            .with_max_message_size(1000)
            .writer_config();
        assert_eq!(writer.channel_capacity, 1);
        assert_eq!(writer.max_message_size, 1000);
    }
}
