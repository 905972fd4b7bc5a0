//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enum
//! for type-safe serialization/deserialization. Every envelope kind is
//! explicitly tagged, so receivers dispatch with an exhaustive `match`.
//!
//! Encoding is stateless: each call serializes the current field values
//! of the value it is given. Nothing is cached between sends.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::group::{ChatMessage, Group};
use crate::types::ClientId;

/// Client → Server message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Toggle registration for a client id
    ///
    /// Adds the id to the registered set, or removes it (and tears down
    /// its connection) if it is already registered.
    Registration { client_id: ClientId },
    /// Create (unassigned id) or edit (existing id) a group
    GroupUpdate { group: Group },
    /// Send a chat message
    Chat { message: ChatMessage },
}

/// Server → Client message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Client id issued right after the connection is accepted
    IdentifierAssignment { client_id: ClientId },
    /// Full registered user set, sent whenever it changes
    RegisteredUsers { users: Vec<ClientId> },
    /// Authoritative group state
    GroupUpdate { group: Group },
    /// Relayed chat message
    Chat { message: ChatMessage },
}

/// Encode an envelope into a single text frame
pub fn encode<T: Serialize>(envelope: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(envelope)
}

/// Decode a single text frame into an envelope
pub fn decode<T: DeserializeOwned>(frame: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GroupId;

    #[test]
    fn test_client_message_deserialize() {
        let json = r#"{"type": "registration", "client_id": 5}"#;
        let msg: ClientMessage = decode(json).unwrap();
        match msg {
            ClientMessage::Registration { client_id } => assert_eq!(client_id, ClientId(5)),
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_server_message_serialize() {
        let msg = ServerMessage::IdentifierAssignment {
            client_id: ClientId(0),
        };
        let json = encode(&msg).unwrap();
        assert!(json.contains("\"type\":\"identifier_assignment\""));
        assert!(json.contains("\"client_id\":0"));
    }

    #[test]
    fn test_group_create_request_carries_sentinel() {
        let msg = ClientMessage::GroupUpdate {
            group: Group::new("Team", [ClientId(0), ClientId(1)]),
        };
        let json = encode(&msg).unwrap();
        assert!(json.contains("\"type\":\"group_update\""));
        assert!(json.contains("\"id\":-1"));
    }

    #[test]
    fn test_encode_reflects_current_field_values() {
        let mut group = Group::new("Before", [ClientId(0)]);
        group.id = GroupId(2);
        let first = encode(&ClientMessage::GroupUpdate { group: group.clone() }).unwrap();

        group.name = "After".to_string();
        group.set_members([ClientId(0), ClientId(1)]);
        let second = encode(&ClientMessage::GroupUpdate { group: group.clone() }).unwrap();

        assert_ne!(first, second);
        match decode::<ClientMessage>(&second).unwrap() {
            ClientMessage::GroupUpdate { group: decoded } => {
                assert_eq!(decoded.name, "After");
                assert_eq!(decoded.members, vec![ClientId(0), ClientId(1)]);
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let json = r#"{"type": "presence"}"#;
        assert!(decode::<ClientMessage>(json).is_err());
        assert!(decode::<ServerMessage>("not json").is_err());
    }
}
