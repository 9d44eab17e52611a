//! Broker-wide outbound packet identifier sequence
//!
//! Identifiers are a wrapping counter over `1..=65535`, not reservations:
//! after 65535 the sequence starts over at 1. Wrapping is the normal steady
//! state, never an error.

use std::sync::atomic::{AtomicU16, Ordering};

use crate::protocol::PacketId;

/// Lock-free packet identifier allocator
#[derive(Debug)]
pub struct PacketIdAllocator {
    next: AtomicU16,
}

impl PacketIdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU16::new(1),
        }
    }

    /// Take the next identifier
    ///
    /// The read, increment and wrap happen in one compare-and-swap, so
    /// concurrent callers never observe the same value from one pass over
    /// the range and never observe 0.
    pub fn next_id(&self) -> PacketId {
        match self
            .next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |id| Some(successor(id)))
        {
            Ok(id) | Err(id) => id,
        }
    }

    /// The identifier the next call to [`next_id`](Self::next_id) would return
    pub fn peek(&self) -> PacketId {
        self.next.load(Ordering::Acquire)
    }
}

impl Default for PacketIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

fn successor(id: PacketId) -> PacketId {
    if id == PacketId::MAX {
        1
    } else {
        id + 1
    }
}
