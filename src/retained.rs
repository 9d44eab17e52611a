//! Retained message store
//!
//! Last value per topic. Every write replaces the whole entry under the
//! shard lock, so readers see either the previous message or the new one.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use dashmap::DashMap;

use crate::protocol::QoS;
use crate::topic::topic_matches_filter;

/// Retained message
#[derive(Debug, Clone)]
pub struct RetainedMessage {
    pub topic: Arc<str>,
    pub payload: Bytes,
    /// QoS the message was published with
    pub qos: QoS,
    pub stored_at: Instant,
}

/// Topic -> last retained message
#[derive(Debug, Default)]
pub struct RetainedStore {
    messages: DashMap<Arc<str>, RetainedMessage>,
}

impl RetainedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the retained payload for `topic`
    pub fn put(&self, topic: &str, payload: impl Into<Bytes>) {
        self.put_with_qos(topic, payload, QoS::AtMostOnce);
    }

    pub fn put_with_qos(&self, topic: &str, payload: impl Into<Bytes>, qos: QoS) {
        let topic: Arc<str> = Arc::from(topic);
        self.messages.insert(
            topic.clone(),
            RetainedMessage {
                topic,
                payload: payload.into(),
                qos,
                stored_at: Instant::now(),
            },
        );
    }

    /// Latest retained payload for `topic`, if any
    pub fn get(&self, topic: &str) -> Option<Bytes> {
        self.messages.get(topic).map(|m| m.payload.clone())
    }

    pub fn get_message(&self, topic: &str) -> Option<RetainedMessage> {
        self.messages.get(topic).map(|m| m.clone())
    }

    pub fn remove(&self, topic: &str) -> Option<RetainedMessage> {
        self.messages.remove(topic).map(|(_, m)| m)
    }

    /// All retained messages whose topic matches `filter`
    pub fn matching(&self, filter: &str) -> Vec<RetainedMessage> {
        self.messages
            .iter()
            .filter(|entry| topic_matches_filter(entry.key(), filter))
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let store = RetainedStore::new();
        store.put("foo", "bar");
        assert_eq!(store.get("foo"), Some(Bytes::from_static(b"bar")));
    }

    #[test]
    fn test_last_write_wins() {
        let store = RetainedStore::new();
        store.put("t", "v1");
        store.put("t", "v2");

        assert_eq!(store.get("t"), Some(Bytes::from_static(b"v2")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_missing_topic() {
        let store = RetainedStore::new();
        assert_eq!(store.get("nothing/here"), None);
        assert!(store.remove("nothing/here").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_matching_filter() {
        let store = RetainedStore::new();
        store.put_with_qos("sensors/a/temp", "21", QoS::AtLeastOnce);
        store.put("sensors/b/temp", "19");
        store.put("sensors/b/humidity", "40");
        store.put("$SYS/uptime", "1");

        let mut topics: Vec<_> = store
            .matching("sensors/+/temp")
            .into_iter()
            .map(|m| m.topic.to_string())
            .collect();
        topics.sort();
        assert_eq!(topics, vec!["sensors/a/temp", "sensors/b/temp"]);

        assert_eq!(store.matching("#").len(), 3);
        assert_eq!(
            store.get_message("sensors/a/temp").map(|m| m.qos),
            Some(QoS::AtLeastOnce)
        );
    }

    #[test]
    fn test_concurrent_puts_leave_one_whole_value() {
        let store = Arc::new(RetainedStore::new());
        let handles: Vec<_> = (0..8u8)
            .map(|n| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        store.put("t", vec![n; 64]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let payload = store.get("t").unwrap();
        assert_eq!(payload.len(), 64);
        assert!(payload.iter().all(|b| *b == payload[0]));
    }
}
