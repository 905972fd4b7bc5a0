//! Client session
//!
//! Owns one WebSocket connection to the relay. A reader task feeds every
//! server envelope into the local [`Reconciler`] and reports deltas to a
//! [`SessionObserver`]; a single writer task serializes every locally
//! originated envelope onto the socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::config::websocket_config;
use crate::error::{AppError, SendError};
use crate::group::{ChatMessage, Group};
use crate::message::{self, ClientMessage, ServerMessage};
use crate::reconciler::{Delta, Reconciler};
use crate::types::{ClientId, GroupId};

/// Callbacks for the presentation layer
///
/// Invoked from the reader task after the local mirror has been updated.
/// Implementations should hand work off to their own event loop rather
/// than block.
pub trait SessionObserver: Send + Sync + 'static {
    /// Own id received during the handshake
    fn on_identifier_assigned(&self, _client_id: ClientId) {}

    /// Registered user set replaced
    fn on_registered_users_changed(&self, _users: &[ClientId]) {}

    /// Group joined, edited or left; `still_member` is false when the replica was dropped
    fn on_group_changed(&self, _group: &Group, _still_member: bool) {}

    /// Message appended to a local replica
    fn on_message_received(&self, _group: &Group) {}

    /// Connection to the server ended
    fn on_disconnected(&self) {}
}

impl SessionObserver for () {}

/// Owned copy of what an observer needs, taken while the state lock is held
enum Notification {
    RegisteredUsers(Vec<ClientId>),
    Group(Group, bool),
    Message(Group),
}

/// Handle to a connected client
///
/// All outbound requests go through one channel, so they reach the server
/// in the order they were made.
pub struct Session {
    client_id: ClientId,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    state: Arc<RwLock<Reconciler>>,
    leaving: AtomicBool,
    closed: watch::Receiver<bool>,
}

impl Session {
    /// Connect to the relay at `url` and wait for the identifier assignment
    ///
    /// Returns only once the server has assigned this client an id, so no
    /// envelope can be sent before then.
    pub async fn connect<O: SessionObserver>(url: &str, observer: O) -> Result<Self, AppError> {
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(url, Some(websocket_config()), false)
                .await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let observer: Arc<dyn SessionObserver> = Arc::new(observer);

        let mut reconciler = Reconciler::new();
        let client_id = loop {
            match ws_receiver.next().await {
                Some(Ok(Message::Text(text))) => {
                    let msg: ServerMessage = message::decode(&text)?;
                    match reconciler.apply(msg) {
                        Delta::IdentifierAssigned(id) => break id,
                        delta => debug!("Pre-assignment envelope: {:?}", delta),
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Err(AppError::HandshakeIncomplete),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        };
        info!("Assigned client id {}", client_id);
        observer.on_identifier_assigned(client_id);

        let state = Arc::new(RwLock::new(reconciler));
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (closed_tx, closed) = watch::channel(false);

        // Spawn write task (ClientMessage -> WebSocket)
        let write_task = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                match message::encode(&msg) {
                    Ok(frame) => {
                        if ws_sender.send(Message::Text(frame)).await.is_err() {
                            debug!("WebSocket send failed, ending write task");
                            break;
                        }
                    }
                    Err(e) => error!("Failed to serialize message: {}", e),
                }
            }
            let _ = ws_sender.close().await;
        });

        // Spawn read task (WebSocket -> Reconciler -> observer)
        let reader_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(msg_result) = ws_receiver.next().await {
                let text = match msg_result {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => {
                        debug!("Server sent close frame");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                };

                let msg: ServerMessage = match message::decode(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!("Undecodable frame from server: {}", e);
                        break;
                    }
                };

                let notification = {
                    let mut state = reader_state.write().await;
                    apply(&mut state, msg)
                };
                if let Some(notification) = notification {
                    notify(observer.as_ref(), notification);
                }
            }

            info!("Connection to server closed");
            write_task.abort();
            let _ = closed_tx.send(true);
            observer.on_disconnected();
        });

        Ok(Self {
            client_id,
            outbound,
            state,
            leaving: AtomicBool::new(false),
            closed,
        })
    }

    /// Own server-assigned id
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Announce availability for invitations
    pub fn request_register(&self) -> Result<(), AppError> {
        self.send(ClientMessage::Registration {
            client_id: self.client_id,
        })
    }

    /// Leave: the server drops this connection after removing it from the registered set
    ///
    /// Refused with `AppError::NotRegistered` unless the local registered
    /// set contains this client, since the server would otherwise read the
    /// same envelope as a registration.
    pub async fn request_deregister(&self) -> Result<(), AppError> {
        if !self.state.read().await.is_registered() {
            return Err(AppError::NotRegistered);
        }
        self.send(ClientMessage::Registration {
            client_id: self.client_id,
        })?;
        self.leaving.store(true, Ordering::Release);
        Ok(())
    }

    /// Ask the server to create a group; this client is always a member
    pub fn request_create_group(
        &self,
        name: impl Into<String>,
        members: impl IntoIterator<Item = ClientId>,
    ) -> Result<(), AppError> {
        let group = Group::new(name, std::iter::once(self.client_id).chain(members));
        self.send(ClientMessage::GroupUpdate { group })
    }

    /// Rename a group and replace its members
    ///
    /// The local history travels with the update so that newly added
    /// members receive it.
    pub async fn request_edit_group(
        &self,
        id: GroupId,
        name: impl Into<String>,
        members: impl IntoIterator<Item = ClientId>,
    ) -> Result<(), AppError> {
        let mut group = self
            .state
            .read()
            .await
            .group(id)
            .cloned()
            .ok_or(AppError::UnknownGroup(id))?;
        group.name = name.into();
        group.set_members(members);
        self.send(ClientMessage::GroupUpdate { group })
    }

    /// Send a chat message to a group
    pub fn send_message(
        &self,
        group: GroupId,
        text: impl Into<String>,
        attachments: Vec<Vec<u8>>,
    ) -> Result<(), AppError> {
        let message = ChatMessage::new(group, self.client_id, text, attachments);
        self.send(ClientMessage::Chat { message })
    }

    /// Run `f` against the current local mirror
    pub async fn with_state<R>(&self, f: impl FnOnce(&Reconciler) -> R) -> R {
        f(&*self.state.read().await)
    }

    /// Snapshot of the local group replicas
    pub async fn groups(&self) -> Vec<Group> {
        self.with_state(|s| s.groups().to_vec()).await
    }

    /// Snapshot of the registered user set
    pub async fn registered_users(&self) -> Vec<ClientId> {
        self.with_state(|s| s.registered_users().to_vec()).await
    }

    /// Whether the connection has ended
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Wait until the server connection ends
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        let _ = closed.wait_for(|c| *c).await;
    }

    fn send(&self, msg: ClientMessage) -> Result<(), AppError> {
        if self.leaving.load(Ordering::Acquire) {
            return Err(AppError::Deregistered);
        }
        self.outbound
            .send(msg)
            .map_err(|_| SendError::ChannelClosed)?;
        Ok(())
    }
}

/// Apply one envelope and capture what the observer should hear about
fn apply(state: &mut Reconciler, msg: ServerMessage) -> Option<Notification> {
    let incoming = match &msg {
        ServerMessage::GroupUpdate { group } => Some(group.clone()),
        _ => None,
    };

    match state.apply(msg) {
        Delta::RegisteredUsersChanged => Some(Notification::RegisteredUsers(
            state.registered_users().to_vec(),
        )),
        Delta::GroupJoined(id) | Delta::GroupUpdated(id) => state
            .group(id)
            .cloned()
            .map(|g| Notification::Group(g, true)),
        Delta::GroupLeft(_) => incoming.map(|g| Notification::Group(g, false)),
        Delta::MessageAppended(id) => state.group(id).cloned().map(Notification::Message),
        Delta::IdentifierAssigned(_) | Delta::Unchanged => None,
    }
}

fn notify(observer: &dyn SessionObserver, notification: Notification) {
    match notification {
        Notification::RegisteredUsers(users) => observer.on_registered_users_changed(&users),
        Notification::Group(group, still_member) => observer.on_group_changed(&group, still_member),
        Notification::Message(group) => observer.on_message_received(&group),
    }
}
