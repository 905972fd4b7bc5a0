//! Identifier allocation
//!
//! Two independent monotonic counters. The allocator is owned by the
//! `RelayServer` actor, so every call is already serialized.

use crate::types::{ClientId, GroupId};

/// Sequential client and group id allocator
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_client: u64,
    next_group: i64,
}

impl IdAllocator {
    /// Create an allocator with both counters at 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the next client id and advance the counter
    pub fn allocate_client(&mut self) -> ClientId {
        let id = ClientId(self.next_client);
        self.next_client += 1;
        id
    }

    /// Return the next group id and advance the counter
    pub fn allocate_group(&mut self) -> GroupId {
        let id = GroupId(self.next_group);
        self.next_group += 1;
        id
    }
}
