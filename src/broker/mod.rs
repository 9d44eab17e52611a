//! Publish fan-out
//!
//! The [`Dispatcher`] ties the subscription registry, the retained store and
//! the packet identifier allocator together. For every inbound publish it
//! snapshots the matching subscriptions, builds one outbound publish per
//! recipient and hands each to its channel. Recipients are independent: a
//! slow, failed or disconnected subscriber never affects the others, and no
//! outcome is reported back to the publisher.

mod channel;

pub use channel::{DeliveryError, MpscChannel, SubscriberChannel};

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::FutureExt;
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::config::DispatchConfig;
use crate::packet_id::PacketIdAllocator;
use crate::protocol::{Message, OutboundPublish, QoS};
use crate::retained::RetainedStore;
use crate::topic::{
    validate_topic_filter_with_max_levels, validate_topic_name_with_max_levels, Subscription,
    SubscriptionRegistry,
};

/// How the outbound QoS is derived for a recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QosPolicy {
    /// Deliver at the subscription's QoS, ignoring the publisher's
    Subscription,
    /// Deliver at the lower of the publisher's and the subscription's QoS
    #[default]
    Minimum,
}

impl QosPolicy {
    pub fn reconcile(self, publisher: QoS, subscription: QoS) -> QoS {
        match self {
            QosPolicy::Subscription => subscription,
            QosPolicy::Minimum => publisher.min(subscription),
        }
    }
}

/// Errors returned to session-layer callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Subscribe request carried a malformed topic filter
    InvalidTopicFilter(&'static str),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTopicFilter(reason) => write!(f, "invalid topic filter: {}", reason),
        }
    }
}

impl std::error::Error for DispatchError {}

/// One prepared send
struct Delivery {
    channel: Arc<dyn SubscriberChannel>,
    publish: OutboundPublish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Delivered,
    Skipped,
    Failed,
}

#[derive(Debug, Default)]
struct Tally {
    delivered: usize,
    skipped: usize,
    failed: usize,
}

impl Tally {
    fn record(mut self, outcome: Outcome) -> Self {
        match outcome {
            Outcome::Delivered => self.delivered += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed => self.failed += 1,
        }
        self
    }
}

/// Fan-out engine
pub struct Dispatcher {
    config: DispatchConfig,
    registry: Arc<SubscriptionRegistry>,
    retained: Arc<RetainedStore>,
    packet_ids: Arc<PacketIdAllocator>,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            registry: Arc::new(SubscriptionRegistry::with_mode(config.unsubscribe_mode)),
            retained: Arc::new(RetainedStore::new()),
            packet_ids: Arc::new(PacketIdAllocator::new()),
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn retained(&self) -> &Arc<RetainedStore> {
        &self.retained
    }

    pub fn packet_ids(&self) -> &Arc<PacketIdAllocator> {
        &self.packet_ids
    }

    /// Handle a SUBSCRIBE for one filter
    ///
    /// Registers the subscription, then replays every retained message the
    /// filter matches to the new subscriber.
    pub async fn subscribe(
        &self,
        filter: &str,
        qos: QoS,
        group_id: u32,
        channel: Arc<dyn SubscriberChannel>,
    ) -> Result<Subscription, DispatchError> {
        validate_topic_filter_with_max_levels(filter, self.config.max_topic_levels)
            .map_err(DispatchError::InvalidTopicFilter)?;

        let subscription = self.registry.register(filter, qos, group_id, channel);

        if self.config.retain_available {
            let replay: Vec<Delivery> = self
                .retained
                .matching(filter)
                .into_iter()
                .map(|m| self.prepare(&subscription, &m.topic, &m.payload, m.qos, true))
                .collect();
            if !replay.is_empty() {
                let tally = self.deliver_all(replay).await;
                debug!(
                    "Replayed retained messages for {}: {} delivered, {} skipped, {} failed",
                    filter, tally.delivered, tally.skipped, tally.failed
                );
            }
        }

        Ok(subscription)
    }

    /// Handle an UNSUBSCRIBE for one filter
    ///
    /// A malformed filter can't have been subscribed, so it removes nothing.
    pub fn unsubscribe(&self, filter: &str, channel: &Arc<dyn SubscriberChannel>) -> usize {
        if let Err(e) = validate_topic_filter_with_max_levels(filter, self.config.max_topic_levels)
        {
            debug!("Ignoring unsubscribe from invalid filter {:?}: {}", filter, e);
            return 0;
        }
        self.registry.unregister(filter, channel)
    }

    /// Drop every subscription of a session that went away
    pub fn disconnect(&self, channel: &Arc<dyn SubscriberChannel>) -> usize {
        self.registry.unregister_channel(channel)
    }

    /// Fan a publish out to every matching subscriber
    ///
    /// Never fails from the publisher's point of view: invalid topics are
    /// dropped, disconnected subscribers are skipped and send errors are
    /// logged.
    pub async fn publish(&self, message: Message) {
        if let Err(e) =
            validate_topic_name_with_max_levels(&message.topic, self.config.max_topic_levels)
        {
            warn!("Dropping publish to invalid topic {:?}: {}", message.topic, e);
            return;
        }

        if message.retain && self.config.retain_available {
            if message.payload.is_empty() {
                self.retained.remove(&message.topic);
            } else {
                self.retained
                    .put_with_qos(&message.topic, message.payload.clone(), message.qos);
            }
        }

        // The registry lock is released once the snapshot is taken
        let deliveries: SmallVec<[Delivery; 16]> = self
            .registry
            .matching_subscriptions(&message.topic)
            .map(|sub| {
                self.prepare(&sub, &message.topic, &message.payload, message.qos, false)
            })
            .collect();

        if deliveries.is_empty() {
            trace!("No subscribers for {}", message.topic);
            return;
        }

        let matched = deliveries.len();
        let tally = self.deliver_all(deliveries).await;
        debug!(
            "PUBLISH {} fanned out to {} subscription(s): {} delivered, {} skipped, {} failed",
            message.topic, matched, tally.delivered, tally.skipped, tally.failed
        );
    }

    /// Build the outbound publish for one recipient
    fn prepare(
        &self,
        subscription: &Subscription,
        topic: &Arc<str>,
        payload: &Bytes,
        publisher_qos: QoS,
        retain: bool,
    ) -> Delivery {
        let publish = OutboundPublish {
            topic: topic.clone(),
            // Each recipient owns its own buffer
            payload: Bytes::copy_from_slice(payload),
            qos: self.config.qos_policy.reconcile(publisher_qos, subscription.qos),
            packet_id: self.packet_ids.next_id(),
            retain,
        };
        Delivery {
            channel: subscription.channel.clone(),
            publish,
        }
    }

    async fn deliver_all<I>(&self, deliveries: I) -> Tally
    where
        I: IntoIterator<Item = Delivery>,
    {
        let limit = match self.config.max_concurrent_sends {
            0 => usize::MAX,
            n => n,
        };

        stream::iter(deliveries)
            .map(|delivery| self.deliver(delivery))
            .buffer_unordered(limit)
            .fold(Tally::default(), |tally, outcome| async move {
                tally.record(outcome)
            })
            .await
    }

    async fn deliver(&self, delivery: Delivery) -> Outcome {
        let Delivery { channel, publish } = delivery;

        if !channel.is_connected() {
            trace!(
                "Skipping disconnected subscriber for {} (packet id {})",
                publish.topic,
                publish.packet_id
            );
            return Outcome::Skipped;
        }

        let topic = publish.topic.clone();
        let packet_id = publish.packet_id;
        let send = AssertUnwindSafe(channel.send(publish)).catch_unwind();

        let result = match self.config.send_timeout_bound() {
            Some(limit) => match tokio::time::timeout(limit, send).await {
                Ok(result) => result,
                Err(_) => Ok(Err(DeliveryError::Timeout(limit))),
            },
            None => send.await,
        };

        match result {
            Ok(Ok(())) => {
                trace!("Delivered {} (packet id {})", topic, packet_id);
                Outcome::Delivered
            }
            Ok(Err(e)) => {
                warn!("Failed to deliver {} (packet id {}): {}", topic, packet_id, e);
                Outcome::Failed
            }
            Err(_) => {
                warn!(
                    "Subscriber channel panicked delivering {} (packet id {})",
                    topic, packet_id
                );
                Outcome::Failed
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatchConfig::default())
    }
}
