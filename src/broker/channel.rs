//! Subscriber delivery capability
//!
//! The dispatcher only ever asks a session two things: is it still
//! connected, and please send this publish. Anything that can answer both
//! can receive messages, which keeps the core independent of the transport.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::protocol::OutboundPublish;

/// Errors raised while handing a publish to a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The session went away before or during the send
    Disconnected,
    /// The send did not complete within the configured bound
    Timeout(Duration),
    /// The transport rejected the write
    Transport(String),
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "subscriber disconnected"),
            Self::Timeout(d) => write!(f, "send timed out after {:?}", d),
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

impl std::error::Error for DeliveryError {}

impl<T> From<mpsc::error::SendError<T>> for DeliveryError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        Self::Disconnected
    }
}

/// Delivery capability of one subscriber session
#[async_trait]
pub trait SubscriberChannel: Send + Sync {
    /// Whether the session can still accept frames
    fn is_connected(&self) -> bool;

    /// Hand a publish to the transport
    ///
    /// Completes once the transport has accepted the frame.
    async fn send(&self, publish: OutboundPublish) -> Result<(), DeliveryError>;
}

/// Channel backed by a connection task's outbound queue
///
/// The connection task owns the receiver and writes each publish to its
/// socket. The channel reports disconnected once that receiver is dropped.
#[derive(Debug, Clone)]
pub struct MpscChannel {
    sender: mpsc::Sender<OutboundPublish>,
}

impl MpscChannel {
    pub fn new(sender: mpsc::Sender<OutboundPublish>) -> Self {
        Self { sender }
    }

    /// Create a channel together with the receiving end of its queue
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<OutboundPublish>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl SubscriberChannel for MpscChannel {
    fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }

    async fn send(&self, publish: OutboundPublish) -> Result<(), DeliveryError> {
        self.sender.send(publish).await?;
        Ok(())
    }
}
