//! HTTP callback delivery: a single POST of `{request_id, data}`.

use async_trait::async_trait;

use crate::delivery::{ChannelOpenError, DeliveryChannel, DeliveryError};
use crate::message::{CallbackPayload, ResponseChunk};

/// Fire-once callback to an HTTP(S) endpoint.
pub struct CallbackChannel {
    client: reqwest::Client,
    url: reqwest::Url,
    sent: bool,
}

impl CallbackChannel {
    /// Validates the endpoint; no request is made until `send`.
    pub fn new(client: reqwest::Client, endpoint: &str) -> Result<Self, ChannelOpenError> {
        let url = reqwest::Url::parse(endpoint)
            .map_err(|_| ChannelOpenError::InvalidEndpoint(endpoint.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ChannelOpenError::InvalidEndpoint(endpoint.to_string()));
        }
        Ok(Self {
            client,
            url,
            sent: false,
        })
    }
}

#[async_trait]
impl DeliveryChannel for CallbackChannel {
    async fn send(&mut self, chunk: &ResponseChunk) -> Result<(), DeliveryError> {
        if self.sent {
            return Err(DeliveryError::AlreadySent);
        }
        self.sent = true;
        let null = serde_json::Value::Null;
        let body = CallbackPayload {
            request_id: &chunk.request_id,
            data: chunk.data.as_ref().unwrap_or(&null),
        };
        let res = self.client.post(self.url.clone()).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected { status, body });
        }
        log::debug!("callback delivered to {}", self.url);
        Ok(())
    }

    async fn close(&mut self) {}
}
