//! Downstream delivery.
//!
//! A channel is opened per inbound request from its delivery mode: a WebSocket that receives
//! every chunk as one text frame, or a one-shot HTTP callback for the aggregated result.
//! Sends are never retried; callers log failures and move on.

mod callback;
mod stream;

pub use callback::CallbackChannel;
pub use stream::StreamChannel;

use crate::message::{DeliveryMode, ResponseChunk};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ChannelOpenError {
    #[error("cannot connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("encoding chunk failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("websocket send failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("callback request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("callback rejected: {status} {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("channel is closed")]
    Closed,
    #[error("callback was already sent")]
    AlreadySent,
}

/// Where the chunks of one request go.
#[async_trait]
pub trait DeliveryChannel: Send {
    async fn send(&mut self, chunk: &ResponseChunk) -> Result<(), DeliveryError>;

    /// Release the channel. Idempotent; failures are only logged.
    async fn close(&mut self);
}

/// Opens a channel for a delivery mode.
#[async_trait]
pub trait DeliveryConnector: Send + Sync {
    async fn open(&self, mode: &DeliveryMode) -> Result<Box<dyn DeliveryChannel>, ChannelOpenError>;
}

/// Default connector: tokio-tungstenite for streams, a shared reqwest client for callbacks.
#[derive(Clone, Default)]
pub struct Relay {
    http: reqwest::Client,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeliveryConnector for Relay {
    async fn open(&self, mode: &DeliveryMode) -> Result<Box<dyn DeliveryChannel>, ChannelOpenError> {
        match mode {
            DeliveryMode::Stream(endpoint) => {
                let channel = StreamChannel::connect(endpoint).await?;
                Ok(Box::new(channel))
            }
            DeliveryMode::Callback(endpoint) => {
                let channel = CallbackChannel::new(self.http.clone(), endpoint)?;
                Ok(Box::new(channel))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn callback_endpoint_must_be_http() {
        let relay = Relay::new();
        for bad in ["not a url", "ws://host/res", "ftp://host/res"] {
            let err = relay
                .open(&DeliveryMode::Callback(bad.to_string()))
                .await
                .err()
                .expect("open should fail");
            assert!(matches!(err, ChannelOpenError::InvalidEndpoint(_)), "{}", bad);
        }
        assert!(relay
            .open(&DeliveryMode::Callback("http://127.0.0.1:8080/res".to_string()))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn unreachable_stream_endpoint_fails_to_open() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
            listener.local_addr().expect("local_addr").port()
        };
        let err = Relay::new()
            .open(&DeliveryMode::Stream(format!("ws://127.0.0.1:{}/res/ws", port)))
            .await
            .err()
            .expect("open should fail");
        assert!(matches!(err, ChannelOpenError::Connect { .. }));
    }
}
