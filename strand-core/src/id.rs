//! Identifier types shared by every layer.

use std::fmt;

/// The logical actor (a chat, a user) whose events must be processed in order.
///
/// Owner ids are opaque to the engine: they are only hashed and compared.
/// An id must not name two different actors at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OwnerId(pub i64);

impl OwnerId {
    /// Create an owner id from its raw value.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// The raw value.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for OwnerId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl From<i32> for OwnerId {
    fn from(raw: i32) -> Self {
        Self(i64::from(raw))
    }
}

impl From<u32> for OwnerId {
    fn from(raw: u32) -> Self {
        Self(i64::from(raw))
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a processing lane.
///
/// Lane ids are dense, start at zero and are never reused by a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LaneId(pub usize);

impl LaneId {
    /// The lane's position in its pool.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lane-{}", self.0)
    }
}
