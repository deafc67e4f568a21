//! Pulsar adapter for the relay worker.
//!
//! Connects to a broker, subscribes once to a topic and hands out raw message payloads.
//! Kept free of relay types so `relay` can depend on it behind its `pulsar` feature.

use futures_util::TryStreamExt;
use pulsar::consumer::Message;
use pulsar::{Authentication, Consumer, Pulsar, SubType, TokioExecutor};

pub use pulsar::error::ConsumerError;
pub use pulsar::Error as PulsarError;

/// Connection and subscription settings.
#[derive(Debug, Clone)]
pub struct PulsarOptions {
    /// Broker URL, e.g. `pulsar://localhost:6650`.
    pub url: String,
    /// JWT for token authentication; none means anonymous.
    pub token: Option<String>,
    pub topic: String,
    pub subscription: String,
}

/// One received message; keep it until it has been acknowledged.
pub struct PulsarMessage {
    inner: Message<Vec<u8>>,
}

impl PulsarMessage {
    pub fn payload(&self) -> &[u8] {
        &self.inner.payload.data
    }
}

/// A shared subscription on one topic. Several workers may attach to the same subscription;
/// the broker hands each message to exactly one of them.
pub struct PulsarSubscription {
    consumer: Consumer<Vec<u8>, TokioExecutor>,
    // The client owns the broker connections; drop it only with the consumer.
    _client: Pulsar<TokioExecutor>,
}

impl PulsarSubscription {
    /// Connect to the broker and subscribe. Fails when the broker is unreachable or the
    /// subscription is rejected.
    pub async fn connect(options: &PulsarOptions) -> Result<Self, PulsarError> {
        let mut builder = Pulsar::builder(options.url.as_str(), TokioExecutor);
        if let Some(token) = options.token.as_deref().filter(|t| !t.is_empty()) {
            builder = builder.with_auth(Authentication {
                name: "token".to_string(),
                data: token.as_bytes().to_vec(),
            });
        }
        let client: Pulsar<TokioExecutor> = builder.build().await?;
        log::info!("pulsar client connected to {}", options.url);

        let consumer: Consumer<Vec<u8>, TokioExecutor> = client
            .consumer()
            .with_topic(options.topic.as_str())
            .with_subscription(options.subscription.as_str())
            .with_subscription_type(SubType::Shared)
            .build()
            .await?;
        log::info!(
            "subscribed to topic {} as {}",
            options.topic,
            options.subscription
        );
        Ok(Self {
            consumer,
            _client: client,
        })
    }

    /// Wait for the next message. `None` when the consumer stream has ended.
    pub async fn recv(&mut self) -> Result<Option<PulsarMessage>, PulsarError> {
        let next = self.consumer.try_next().await?;
        Ok(next.map(|inner| PulsarMessage { inner }))
    }

    pub async fn ack(&mut self, message: &PulsarMessage) -> Result<(), ConsumerError> {
        self.consumer.ack(&message.inner).await
    }
}
