//! Basic type definitions for the relay
//!
//! Provides newtype wrappers for type safety:
//! - `ClientId`: server-assigned sequential client identifier
//! - `GroupId`: server-assigned sequential group identifier with an unassigned sentinel

use serde::{Deserialize, Serialize};

/// Unique client identifier (newtype pattern)
///
/// Allocated by the server in connection order. Never reused, even after
/// the client disconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Group identifier
///
/// A group created by a client carries [`GroupId::UNASSIGNED`] until the
/// server allocates a real one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub i64);

impl GroupId {
    /// Sentinel meaning "not yet allocated"
    pub const UNASSIGNED: GroupId = GroupId(-1);

    /// Check whether this is anything other than the sentinel
    pub fn is_assigned(&self) -> bool {
        *self != Self::UNASSIGNED
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::UNASSIGNED
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_assigned() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "unassigned")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_id_sentinel() {
        assert!(!GroupId::UNASSIGNED.is_assigned());
        assert!(GroupId(0).is_assigned());
        assert!(GroupId(-2).is_assigned());
        assert_eq!(GroupId::default(), GroupId::UNASSIGNED);
        assert_eq!(GroupId::UNASSIGNED.to_string(), "unassigned");
    }

    #[test]
    fn test_ids_serialize_as_bare_numbers() {
        assert_eq!(serde_json::to_string(&ClientId(7)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&GroupId::UNASSIGNED).unwrap(), "-1");
        let id: GroupId = serde_json::from_str("3").unwrap();
        assert_eq!(id, GroupId(3));
    }
}
