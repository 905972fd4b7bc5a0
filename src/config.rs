//! Address and buffer configuration for the binaries
//!
//! The relay core reads no files; the binaries resolve an address from
//! the first CLI argument, then `GROUP_RELAY_ADDR`, then the default.

use std::time::Duration;

use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8000";

/// Environment variable overriding the address
pub const ADDR_ENV: &str = "GROUP_RELAY_ADDR";

/// Channel buffer size for server commands
pub const CHANNEL_BUFFER_SIZE: usize = 256;

/// Largest frame or message accepted on either end (256 MiB)
///
/// Attachments travel base64-encoded inside one text frame, and group
/// edits carry the whole history, so tungstenite's 16 MiB frame default
/// is too small.
pub const MAX_MESSAGE_SIZE: usize = 256 << 20;

/// How long shutdown waits for connection handlers to flush and close
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// WebSocket settings shared by the server and the client
pub fn websocket_config() -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(MAX_MESSAGE_SIZE);
    config.max_frame_size = Some(MAX_MESSAGE_SIZE);
    config
}

/// Server settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind the listener to
    pub bind_addr: String,
    /// Capacity of the RelayServer command channel
    pub command_buffer: usize,
}

impl ServerConfig {
    /// Build from process arguments and environment
    pub fn from_env() -> Self {
        Self {
            bind_addr: resolve_addr(std::env::args().nth(1), std::env::var(ADDR_ENV).ok()),
            command_buffer: CHANNEL_BUFFER_SIZE,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.to_string(),
            command_buffer: CHANNEL_BUFFER_SIZE,
        }
    }
}

/// Client settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// `host:port` of the relay server
    pub server_addr: String,
}

impl ClientConfig {
    /// Build from process arguments and environment
    pub fn from_env() -> Self {
        Self {
            server_addr: resolve_addr(std::env::args().nth(1), std::env::var(ADDR_ENV).ok()),
        }
    }

    /// WebSocket URL of the server
    pub fn url(&self) -> String {
        format!("ws://{}", self.server_addr)
    }
}

fn resolve_addr(arg: Option<String>, env: Option<String>) -> String {
    arg.or(env)
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string())
}
