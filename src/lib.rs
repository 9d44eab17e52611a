//! Broke - dispatch core of an MQTT-style publish/subscribe broker
//!
//! Maintains live topic subscriptions, matches inbound publishes against
//! them, assigns outbound packet identifiers, reconciles QoS and fans each
//! message out to subscriber sessions. Wire encoding and connection handling
//! belong to the layers around this crate.

pub mod broker;
pub mod config;
pub mod logging;
pub mod packet_id;
pub mod protocol;
pub mod retained;
pub mod topic;

#[cfg(test)]
mod test_support;

pub use broker::{
    DeliveryError, DispatchError, Dispatcher, MpscChannel, QosPolicy, SubscriberChannel,
};
pub use config::{Config, DispatchConfig};
pub use packet_id::PacketIdAllocator;
pub use protocol::{Message, OutboundPublish, PacketId, QoS};
pub use retained::{RetainedMessage, RetainedStore};
pub use topic::{Subscription, SubscriptionRegistry, UnsubscribeMode};
