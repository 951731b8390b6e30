//! Connection Handles

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for one logical connection in a [`SocketBridge`](super::SocketBridge).
///
/// Handles are issued in increasing order starting at 0 and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionHandle(u32);

impl ConnectionHandle {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Raw integer value handed to foreign callers
    pub const fn value(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    /// Handle for registry slot `index`, if it fits the handle range.
    pub(crate) fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index).ok().map(Self)
    }
}

impl From<u32> for ConnectionHandle {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<ConnectionHandle> for u32 {
    fn from(handle: ConnectionHandle) -> Self {
        handle.0
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_index_round_trips_slot() {
        let handle = ConnectionHandle::from_index(42).unwrap();
        assert_eq!(handle.value(), 42);
        assert_eq!(handle.index(), 42);
        assert_eq!(
            ConnectionHandle::from_index(u32::MAX as usize),
            Some(ConnectionHandle::new(u32::MAX))
        );
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_from_index_rejects_slots_past_u32() {
        assert_eq!(ConnectionHandle::from_index(u32::MAX as usize + 1), None);
        assert_eq!(ConnectionHandle::from_index(usize::MAX), None);
    }
}
