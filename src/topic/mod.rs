//! Topic matching and subscription management
//!
//! Topic name/filter rules live in [`validation`]; [`SubscriptionRegistry`]
//! indexes live subscriptions in a [`TopicTrie`] so a publish only visits the
//! branches its topic can reach.
//!
//! Locking discipline: the trie sits behind a single `RwLock`. Register and
//! unregister take the write lock. Matching takes the read lock just long
//! enough to clone the matching entries into a snapshot; callers iterate and
//! deliver with no lock held.

mod trie;
pub mod validation;

pub use trie::TopicTrie;
pub use validation::{
    topic_matches_filter, validate_topic_filter, validate_topic_filter_with_max_levels,
    validate_topic_name, validate_topic_name_with_max_levels,
};

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use smallvec::SmallVec;
use tracing::debug;

use crate::broker::SubscriberChannel;
use crate::protocol::QoS;

/// A registered interest in a topic filter
///
/// Immutable once created. The channel is shared with the transport layer,
/// which owns the connection's real lifecycle.
#[derive(Clone)]
pub struct Subscription {
    /// Topic filter, possibly containing wildcards
    pub filter: Arc<str>,
    /// QoS requested by the subscriber
    pub qos: QoS,
    /// Consumer group identifier
    pub group_id: u32,
    /// Delivery capability of the subscriber's session
    pub channel: Arc<dyn SubscriberChannel>,
}

impl Subscription {
    pub fn new(
        filter: impl Into<Arc<str>>,
        qos: QoS,
        group_id: u32,
        channel: Arc<dyn SubscriberChannel>,
    ) -> Self {
        Self {
            filter: filter.into(),
            qos,
            group_id,
            channel,
        }
    }

    /// Whether this subscription delivers through `channel`
    pub fn is_owned_by(&self, channel: &Arc<dyn SubscriberChannel>) -> bool {
        Arc::ptr_eq(&self.channel, channel)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("filter", &self.filter)
            .field("qos", &self.qos)
            .field("group_id", &self.group_id)
            .field("connected", &self.channel.is_connected())
            .finish()
    }
}

/// Which subscriptions an unsubscribe removes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsubscribeMode {
    /// Every subscription on the filter, whichever channel registered it
    ByTopic,
    /// Only subscriptions on the filter registered by the same channel
    #[default]
    ByTopicAndChannel,
}

/// Snapshot of the subscriptions matching one topic
///
/// Most topics have fewer than 16 subscribers, so this rarely allocates.
pub type Matches = smallvec::IntoIter<[Subscription; 16]>;

/// Thread-safe set of live subscriptions
pub struct SubscriptionRegistry {
    trie: RwLock<TopicTrie<Vec<Subscription>>>,
    mode: UnsubscribeMode,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::with_mode(UnsubscribeMode::default())
    }

    pub fn with_mode(mode: UnsubscribeMode) -> Self {
        Self {
            trie: RwLock::new(TopicTrie::new()),
            mode,
        }
    }

    pub fn mode(&self) -> UnsubscribeMode {
        self.mode
    }

    /// Add a subscription
    ///
    /// Duplicates of an existing filter/channel pair are kept as separate entries.
    pub fn register(
        &self,
        filter: &str,
        qos: QoS,
        group_id: u32,
        channel: Arc<dyn SubscriberChannel>,
    ) -> Subscription {
        let subscription = Subscription::new(filter, qos, group_id, channel);

        self.trie
            .write()
            .get_or_insert_with(filter, Vec::new)
            .push(subscription.clone());

        debug!("Registered subscription on {} (QoS {:?})", filter, qos);
        subscription
    }

    /// Remove subscriptions on `filter` according to the configured mode
    ///
    /// Returns how many were removed; removing nothing is not an error.
    pub fn unregister(&self, filter: &str, channel: &Arc<dyn SubscriberChannel>) -> usize {
        let mut trie = self.trie.write();

        let removed = match self.mode {
            UnsubscribeMode::ByTopic => trie.remove(filter).map_or(0, |subs| subs.len()),
            UnsubscribeMode::ByTopicAndChannel => {
                let Some(subs) = trie.get_mut(filter) else {
                    return 0;
                };
                let before = subs.len();
                subs.retain(|s| !s.is_owned_by(channel));
                let removed = before - subs.len();
                if subs.is_empty() {
                    trie.remove(filter);
                }
                removed
            }
        };

        debug!("Unregistered {} subscription(s) on {}", removed, filter);
        removed
    }

    /// Remove every subscription delivering through `channel`
    pub fn unregister_channel(&self, channel: &Arc<dyn SubscriberChannel>) -> usize {
        let mut removed = 0;
        self.trie.write().retain(|subs| {
            let before = subs.len();
            subs.retain(|s| !s.is_owned_by(channel));
            removed += before - subs.len();
            !subs.is_empty()
        });

        debug!("Unregistered {} subscription(s) for closed channel", removed);
        removed
    }

    /// Snapshot the subscriptions whose filter matches `topic`
    ///
    /// The returned iterator owns its entries: later register/unregister calls
    /// do not affect it, and it can be consumed only once.
    pub fn matching_subscriptions(&self, topic: &str) -> Matches {
        let mut snapshot: SmallVec<[Subscription; 16]> = SmallVec::new();
        self.trie
            .read()
            .matches(topic, |subs| snapshot.extend(subs.iter().cloned()));
        snapshot.into_iter()
    }

    /// Total number of live subscriptions
    pub fn len(&self) -> usize {
        let mut count = 0;
        self.trie.read().for_each(|subs| count += subs.len());
        count
    }

    pub fn is_empty(&self) -> bool {
        self.trie.read().is_empty()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
