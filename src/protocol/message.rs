//! Inbound and outbound publish shapes

use std::sync::Arc;

use bytes::Bytes;

use super::{PacketId, QoS};

/// A publish as decoded from a publisher's PUBLISH frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: Arc<str>,
    pub payload: Bytes,
    /// QoS requested by the publisher
    pub qos: QoS,
    pub retain: bool,
}

impl Message {
    pub fn new(topic: impl Into<Arc<str>>, payload: impl Into<Bytes>, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain: false,
        }
    }

    /// Mark this message as retained
    pub fn retained(mut self) -> Self {
        self.retain = true;
        self
    }
}

/// A publish built for exactly one recipient
///
/// The protocol layer serializes this into a PUBLISH frame. The payload is
/// owned by this value alone, never shared with other recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPublish {
    pub topic: Arc<str>,
    pub payload: Bytes,
    /// Reconciled delivery QoS
    pub qos: QoS,
    pub packet_id: PacketId,
    /// Set when replaying a retained message on subscribe
    pub retain: bool,
}
