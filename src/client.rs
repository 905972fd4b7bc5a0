//! Active connection record
//!
//! Server-side view of one connected client: its id and the channel
//! feeding its WebSocket writer.

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::types::ClientId;

/// Outbound channel carrying already-encoded text frames
///
/// Unbounded so that broadcasting never waits on a slow peer. The cost is
/// memory: frames for a peer that stops reading pile up until its socket
/// errors out or it disconnects.
pub type FrameSender = mpsc::UnboundedSender<String>;

/// Connected client information
///
/// Dropping the record drops the sender, which ends the writer task and
/// closes the socket.
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for this client
    pub id: ClientId,
    /// Server → Client frame channel
    sender: FrameSender,
}

impl Client {
    /// Create a new client with the given ID and sender channel
    pub fn new(id: ClientId, sender: FrameSender) -> Self {
        Self { id, sender }
    }

    /// Queue an encoded frame for this client
    ///
    /// Never blocks; frames are delivered in the order they are queued.
    /// Returns an error if the channel is closed (client disconnected).
    pub fn send(&self, frame: String) -> Result<(), SendError> {
        self.sender.send(frame).map_err(|_| SendError::ChannelClosed)
    }

    /// Check whether the writer side is still alive
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}
