//! Queue subscription interface.
//!
//! The worker loop only needs "give me the next message" and "acknowledge it"; connection,
//! redelivery and consumer bookkeeping stay with the broker client.

#[cfg(feature = "pulsar")]
mod pulsar;

#[cfg(feature = "pulsar")]
pub use self::pulsar::connect_pulsar;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("connecting to queue failed: {0}")]
    Connect(String),
    #[error("receiving from queue failed: {0}")]
    Receive(String),
    #[error("subscription closed")]
    Closed,
    #[error("acknowledging message failed: {0}")]
    Acknowledge(String),
}

/// A received message; the body is UTF-8 JSON.
pub trait QueueMessage: Send + Sync {
    fn payload(&self) -> &[u8];
}

/// One subscription on one topic, consumed sequentially.
#[async_trait]
pub trait Subscription: Send {
    type Message: QueueMessage;

    /// Wait for the next message. `None` means the subscription has ended.
    async fn next_message(&mut self) -> Result<Option<Self::Message>, QueueError>;

    async fn acknowledge(&mut self, message: &Self::Message) -> Result<(), QueueError>;
}
