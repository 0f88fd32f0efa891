//! Opaque handles for registered owners.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of one animated object, assigned at registration.
/// Survives renames; never reused while the allocator lives.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(pub u32);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

/// Monotonic allocator for OwnerId.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_owner: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_owner(&mut self) -> OwnerId {
        let id = OwnerId(self.next_owner);
        self.next_owner = self.next_owner.wrapping_add(1);
        id
    }

    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_monotonic() {
        let mut alloc = IdAllocator::new();
        assert_eq!(alloc.alloc_owner(), OwnerId(0));
        assert_eq!(alloc.alloc_owner(), OwnerId(1));
        alloc.reset();
        assert_eq!(alloc.alloc_owner(), OwnerId(0));
        assert_eq!(OwnerId(7).to_string(), "owner#7");
    }
}
