//! Group and chat message records
//!
//! The server never keeps a canonical `Group`; every member client holds
//! its own replica, reconciled from broadcasts.

use serde::{Deserialize, Serialize};

use crate::types::{ClientId, GroupId};

/// A chat message addressed to one group
///
/// Immutable once created. Attachments are opaque blobs carried as
/// base64 strings on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Group this message is addressed to
    pub target_group: GroupId,
    /// Client that wrote the message
    pub sender: ClientId,
    /// Message text (may be empty when only attachments are sent)
    #[serde(default)]
    pub text: String,
    /// Opaque binary attachments, in send order
    #[serde(default, with = "attachments")]
    pub attachments: Vec<Vec<u8>>,
}

impl ChatMessage {
    /// Create a new message
    pub fn new(
        target_group: GroupId,
        sender: ClientId,
        text: impl Into<String>,
        attachments: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            target_group,
            sender,
            text: text.into(),
            attachments,
        }
    }

    /// Short one-line preview, used for group listings
    pub fn preview(&self) -> &str {
        let text = self.text.trim();
        if text.is_empty() && !self.attachments.is_empty() {
            "[Attachment]"
        } else {
            text
        }
    }
}

/// A chat group replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Server-assigned id, or `GroupId::UNASSIGNED` for a create request
    pub id: GroupId,
    /// Display name
    pub name: String,
    /// Members in insertion order, without duplicates
    pub members: Vec<ClientId>,
    /// Append-only message history
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl Group {
    /// Create an unassigned group with empty history
    pub fn new(name: impl Into<String>, members: impl IntoIterator<Item = ClientId>) -> Self {
        let mut group = Self {
            id: GroupId::UNASSIGNED,
            name: name.into(),
            members: Vec::new(),
            messages: Vec::new(),
        };
        group.set_members(members);
        group
    }

    /// Check if a client is a member of this group
    pub fn contains(&self, client_id: ClientId) -> bool {
        self.members.contains(&client_id)
    }

    /// Replace the member list, dropping repeated ids but keeping first-seen order
    pub fn set_members(&mut self, members: impl IntoIterator<Item = ClientId>) {
        self.members.clear();
        for id in members {
            if !self.members.contains(&id) {
                self.members.push(id);
            }
        }
    }

    /// Append a delivered message
    pub fn add_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Most recent message, if any
    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({}) has {:?}", self.name, self.id, self.members)
    }
}

/// Serde adapter encoding each attachment blob as a base64 string
mod attachments {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::de::Error as _;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(blobs: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(blobs.len()))?;
        for blob in blobs {
            seq.serialize_element(&STANDARD.encode(blob))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error> {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|s| STANDARD.decode(s).map_err(D::Error::custom))
            .collect()
    }
}
