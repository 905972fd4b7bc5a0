//! Error types for the relay
//!
//! Defines application-level errors and message send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::types::GroupId;

/// Application-level errors
///
/// Connection-level failures end only the affected connection; the
/// group errors are returned to the local caller of a client session.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Stream ended before the server assigned a client id
    #[error("Connection closed before identifier assignment")]
    HandshakeIncomplete,

    /// No local replica with the given id
    #[error("Unknown group: {0}")]
    UnknownGroup(GroupId),

    /// Deregistration requested while not in the registered set
    #[error("Not registered")]
    NotRegistered,

    /// Outbound request issued after this session deregistered
    #[error("Session has deregistered")]
    Deregistered,
}

/// Message send errors
///
/// Occurs when attempting to send messages through closed channels.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}

impl From<SendError> for AppError {
    fn from(_: SendError) -> Self {
        AppError::ChannelSend
    }
}
