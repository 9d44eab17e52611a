//! Subscriber channel doubles shared by unit tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::broker::{DeliveryError, SubscriberChannel};
use crate::protocol::OutboundPublish;

/// Records every publish it is handed
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<OutboundPublish>>,
    disconnected: AtomicBool,
    fail: AtomicBool,
    panic: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn disconnected() -> Arc<Self> {
        let channel = Self::new();
        channel.disconnected.store(true, Ordering::SeqCst);
        channel
    }

    pub fn failing() -> Arc<Self> {
        let channel = Self::new();
        channel.fail.store(true, Ordering::SeqCst);
        channel
    }

    pub fn panicking() -> Arc<Self> {
        let channel = Self::new();
        channel.panic.store(true, Ordering::SeqCst);
        channel
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        let channel = Self::new();
        *channel.delay.lock() = Some(delay);
        channel
    }

    pub fn sent(&self) -> Vec<OutboundPublish> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl SubscriberChannel for RecordingChannel {
    fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
    }

    async fn send(&self, publish: OutboundPublish) -> Result<(), DeliveryError> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic.load(Ordering::SeqCst) {
            panic!("transport blew up");
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeliveryError::Transport("connection reset".to_string()));
        }
        self.sent.lock().push(publish);
        Ok(())
    }
}

/// Upcast for registry/dispatcher calls
pub fn as_channel(channel: &Arc<RecordingChannel>) -> Arc<dyn SubscriberChannel> {
    channel.clone()
}
