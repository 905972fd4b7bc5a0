//! RelayServer Actor implementation
//!
//! The central actor that owns all shared server state: active connections,
//! the registered user set and the id allocator. Uses the Actor pattern with
//! mpsc channels for message passing, so every read-modify-write sequence
//! runs to completion before the next command is looked at.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::allocator::IdAllocator;
use crate::client::{Client, FrameSender};
use crate::group::{ChatMessage, Group};
use crate::message::{self, ServerMessage};
use crate::types::{ClientId, GroupId};

/// Commands sent from handlers to the RelayServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// New connection accepted; reply carries the allocated id
    Connect {
        sender: FrameSender,
        reply: oneshot::Sender<ClientId>,
    },
    /// Connection stream ended
    Disconnect {
        client_id: ClientId,
    },
    /// Registration toggle received from `from`
    Registration {
        from: ClientId,
        client_id: ClientId,
    },
    /// Group create or edit request
    GroupUpdate {
        from: ClientId,
        group: Group,
    },
    /// Chat message to relay
    Chat {
        from: ClientId,
        message: ChatMessage,
    },
    /// Close every active connection and stop the actor
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// The main RelayServer actor
///
/// Holds no canonical group state; groups and messages are only relayed.
pub struct RelayServer {
    /// Active connections: ClientId -> Client
    clients: HashMap<ClientId, Client>,
    /// Registered users in registration order
    registered: Vec<ClientId>,
    /// Client and group id counters
    ids: IdAllocator,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl RelayServer {
    /// Create a new RelayServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>) -> Self {
        Self {
            clients: HashMap::new(),
            registered: Vec::new(),
            ids: IdAllocator::new(),
            receiver,
        }
    }

    /// Run the RelayServer event loop
    ///
    /// Processes commands until a shutdown is requested or all senders are dropped.
    pub async fn run(mut self) {
        info!("RelayServer started");

        while let Some(cmd) = self.receiver.recv().await {
            if !self.handle_command(cmd) {
                break;
            }
        }

        info!("RelayServer shutting down");
    }

    /// Process a single command, returning false once the actor should stop
    fn handle_command(&mut self, cmd: ServerCommand) -> bool {
        match cmd {
            ServerCommand::Connect { sender, reply } => {
                let client_id = self.handle_connect(sender);
                if reply.send(client_id).is_err() {
                    // Handler went away before hearing back
                    self.clients.remove(&client_id);
                }
            }
            ServerCommand::Disconnect { client_id } => {
                self.handle_disconnect(client_id);
            }
            ServerCommand::Registration { from, client_id } => {
                self.handle_registration(from, client_id);
            }
            ServerCommand::GroupUpdate { from, group } => {
                self.handle_group_update(from, group);
            }
            ServerCommand::Chat { from, message } => {
                self.handle_chat(from, message);
            }
            ServerCommand::Shutdown { done } => {
                self.handle_shutdown();
                let _ = done.send(());
                return false;
            }
        }
        true
    }

    /// Handle new connection: allocate an id and queue its assignment
    ///
    /// The assignment is queued before the client becomes visible to
    /// `broadcast`, so it is always the first frame on the connection.
    fn handle_connect(&mut self, sender: FrameSender) -> ClientId {
        let client_id = self.ids.allocate_client();
        let client = Client::new(client_id, sender);

        match message::encode(&ServerMessage::IdentifierAssignment { client_id }) {
            Ok(frame) => {
                let _ = client.send(frame);
            }
            Err(e) => error!("Failed to encode assignment for {}: {}", client_id, e),
        }

        self.clients.insert(client_id, client);
        info!("Client {} connected", client_id);
        debug!("Active connections: {}", self.clients.len());
        client_id
    }

    /// Handle stream end
    ///
    /// Only the connection entry goes away; registration is untouched.
    fn handle_disconnect(&mut self, client_id: ClientId) {
        if self.clients.remove(&client_id).is_some() {
            info!("Client {} disconnected", client_id);
        }
        debug!("Active connections: {}", self.clients.len());
    }

    /// Handle the registration toggle
    fn handle_registration(&mut self, from: ClientId, client_id: ClientId) {
        if let Some(pos) = self.registered.iter().position(|id| *id == client_id) {
            self.registered.remove(pos);
            // Dropping the record closes its writer and socket
            self.clients.remove(&client_id);
            info!("Client {} deregistered (requested by {})", client_id, from);
        } else {
            self.registered.push(client_id);
            info!("Client {} registered (requested by {})", client_id, from);
        }

        self.broadcast(&ServerMessage::RegisteredUsers {
            users: self.registered.clone(),
        });
    }

    /// Handle group create/edit
    ///
    /// Only the exact sentinel asks for a new id; any other id is relayed as is.
    fn handle_group_update(&mut self, from: ClientId, mut group: Group) {
        if group.id == GroupId::UNASSIGNED {
            group.id = self.ids.allocate_group();
            info!("Client {} created group {}", from, group);
        } else {
            debug!("Client {} updated group {}", from, group);
        }

        self.broadcast(&ServerMessage::GroupUpdate { group });
    }

    /// Handle chat message: relayed verbatim, membership is not checked
    fn handle_chat(&mut self, from: ClientId, message: ChatMessage) {
        debug!("Client {} sent message to group {}", from, message.target_group);
        self.broadcast(&ServerMessage::Chat { message });
    }

    /// Drop every active connection
    fn handle_shutdown(&mut self) {
        info!("Closing {} active connections", self.clients.len());
        self.clients.clear();
    }

    /// Queue one envelope on every active connection
    ///
    /// The envelope is encoded once so every destination gets the same bytes.
    fn broadcast(&self, msg: &ServerMessage) {
        let frame = match message::encode(msg) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to serialize broadcast: {}", e);
                return;
            }
        };

        for client in self.clients.values() {
            if client.send(frame.clone()).is_err() {
                debug!("Client {} channel closed, skipping", client.id);
            }
        }
    }
}
