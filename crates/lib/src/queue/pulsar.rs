//! Pulsar-backed subscription (feature `pulsar`).

use async_trait::async_trait;
use pulsar_queue::{PulsarMessage, PulsarOptions, PulsarSubscription};

use crate::config::Settings;
use crate::queue::{QueueError, QueueMessage, Subscription};

impl QueueMessage for PulsarMessage {
    fn payload(&self) -> &[u8] {
        PulsarMessage::payload(self)
    }
}

#[async_trait]
impl Subscription for PulsarSubscription {
    type Message = PulsarMessage;

    async fn next_message(&mut self) -> Result<Option<PulsarMessage>, QueueError> {
        self.recv()
            .await
            .map_err(|e| QueueError::Receive(e.to_string()))
    }

    async fn acknowledge(&mut self, message: &PulsarMessage) -> Result<(), QueueError> {
        self.ack(message)
            .await
            .map_err(|e| QueueError::Acknowledge(e.to_string()))
    }
}

/// Connect to the configured broker and subscribe to the topic (shared subscription).
pub async fn connect_pulsar(settings: &Settings) -> Result<PulsarSubscription, QueueError> {
    let options = PulsarOptions {
        url: settings.queue_url.clone(),
        token: settings.queue_token.clone(),
        topic: settings.topic.clone(),
        subscription: settings.subscription.clone(),
    };
    PulsarSubscription::connect(&options)
        .await
        .map_err(|e| QueueError::Connect(e.to_string()))
}
