//! Client-side reconciliation
//!
//! Merges server broadcasts into a local mirror limited to the groups this
//! client belongs to. This is the only place client group and message state
//! is mutated; presentation code reads from it.

use tracing::debug;

use crate::group::{ChatMessage, Group};
use crate::message::ServerMessage;
use crate::types::{ClientId, GroupId};

/// What changed after applying one envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delta {
    /// Own id recorded for the first time
    IdentifierAssigned(ClientId),
    /// Registered user cache replaced with a different set
    RegisteredUsersChanged,
    /// New local replica added
    GroupJoined(GroupId),
    /// Existing replica's name or members changed
    GroupUpdated(GroupId),
    /// Replica dropped because this client is no longer a member
    GroupLeft(GroupId),
    /// Message appended to a replica
    MessageAppended(GroupId),
    /// Envelope was irrelevant or already reflected
    Unchanged,
}

impl Delta {
    /// Whether anything visible changed
    pub fn is_change(&self) -> bool {
        !matches!(self, Delta::Unchanged)
    }
}

/// Local mirror of the relay state relevant to one client
#[derive(Debug, Default)]
pub struct Reconciler {
    client_id: Option<ClientId>,
    registered_users: Vec<ClientId>,
    groups: Vec<Group>,
}

impl Reconciler {
    /// Create an empty reconciler with no id assigned
    pub fn new() -> Self {
        Self::default()
    }

    /// Own id, once assigned
    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    /// Latest registered user set received
    pub fn registered_users(&self) -> &[ClientId] {
        &self.registered_users
    }

    /// Whether this client currently appears in the registered set
    pub fn is_registered(&self) -> bool {
        self.client_id
            .is_some_and(|id| self.registered_users.contains(&id))
    }

    /// Local group replicas, in the order they were joined
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Look up a replica by id
    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    /// Apply one server envelope
    pub fn apply(&mut self, msg: ServerMessage) -> Delta {
        match msg {
            ServerMessage::IdentifierAssignment { client_id } => self.apply_assignment(client_id),
            ServerMessage::RegisteredUsers { users } => self.apply_registered_users(users),
            ServerMessage::GroupUpdate { group } => self.apply_group(group),
            ServerMessage::Chat { message } => self.apply_message(message),
        }
    }

    fn apply_assignment(&mut self, client_id: ClientId) -> Delta {
        if self.client_id.is_some() {
            debug!("Ignoring repeated identifier assignment {}", client_id);
            return Delta::Unchanged;
        }
        self.client_id = Some(client_id);
        Delta::IdentifierAssigned(client_id)
    }

    fn apply_registered_users(&mut self, users: Vec<ClientId>) -> Delta {
        if self.registered_users == users {
            return Delta::Unchanged;
        }
        self.registered_users = users;
        Delta::RegisteredUsersChanged
    }

    fn apply_group(&mut self, group: Group) -> Delta {
        let member = self.client_id.is_some_and(|id| group.contains(id));
        let pos = self.groups.iter().position(|g| g.id == group.id);

        match (pos, member) {
            (Some(pos), false) => {
                self.groups.remove(pos);
                Delta::GroupLeft(group.id)
            }
            (Some(pos), true) => {
                let mine = &mut self.groups[pos];
                if mine.name == group.name && mine.members == group.members {
                    return Delta::Unchanged;
                }
                // History is kept; only name and members come from the update
                mine.name = group.name;
                mine.set_members(group.members);
                Delta::GroupUpdated(mine.id)
            }
            (None, true) => {
                let id = group.id;
                let mut replica = group;
                let members = std::mem::take(&mut replica.members);
                replica.set_members(members);
                self.groups.push(replica);
                Delta::GroupJoined(id)
            }
            (None, false) => Delta::Unchanged,
        }
    }

    fn apply_message(&mut self, message: ChatMessage) -> Delta {
        let target = message.target_group;
        match self.groups.iter_mut().find(|g| g.id == target) {
            Some(group) => {
                group.add_message(message);
                Delta::MessageAppended(target)
            }
            None => {
                debug!("Discarding message for group {} (not a member)", target);
                Delta::Unchanged
            }
        }
    }
}
