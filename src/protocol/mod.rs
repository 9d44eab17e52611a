//! Protocol-level types shared by the dispatch core
//!
//! Wire encoding lives in the protocol layer above this crate; these are the
//! decoded shapes that flow in (publishes) and out (per-recipient publishes).

mod message;

pub use message::{Message, OutboundPublish};

/// Packet identifier carried by outbound PUBLISH frames
///
/// Always in `1..=65535`; zero is never handed out.
pub type PacketId = u16;

/// Quality of Service levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum QoS {
    /// At most once delivery
    #[default]
    AtMostOnce = 0,
    /// At least once delivery
    AtLeastOnce = 1,
    /// Exactly once delivery
    ExactlyOnce = 2,
}

impl QoS {
    /// Returns the lower of two QoS levels
    pub fn min(self, other: Self) -> Self {
        if (self as u8) < (other as u8) {
            self
        } else {
            other
        }
    }
}
