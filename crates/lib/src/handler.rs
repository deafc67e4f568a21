//! One inbound message end to end: parse, open the downstream channel, dispatch upstream, relay.
//!
//! Every per-message error stops here and becomes [`Outcome::Failed`]; the worker loop
//! acknowledges either way.

use futures_util::StreamExt;

use crate::delivery::{ChannelOpenError, DeliveryConnector, DeliveryError};
use crate::llm::{CompletionBackend, UpstreamError};
use crate::message::{DeliveryMode, InboundRequest, ParseError, ResponseChunk};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    ChannelOpen(#[from] ChannelOpenError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Terminal state of one message.
#[derive(Debug)]
pub enum Outcome {
    Delivered,
    Failed(RelayError),
}

impl Outcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Outcome::Delivered)
    }
}

pub struct MessageHandler<B, C> {
    backend: B,
    connector: C,
}

impl<B: CompletionBackend, C: DeliveryConnector> MessageHandler<B, C> {
    pub fn new(backend: B, connector: C) -> Self {
        Self { backend, connector }
    }

    /// Handle one queue payload to a terminal state.
    pub async fn handle(&self, body: &[u8]) -> Outcome {
        let request = match InboundRequest::parse(body) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("dropping unparseable message: {}", e);
                return Outcome::Failed(e.into());
            }
        };
        let mode = request.delivery_mode();
        log::info!(
            "request {}: received ({} to {})",
            request.request_id,
            if mode.is_stream() { "stream" } else { "callback" },
            mode.endpoint()
        );

        let result = match mode {
            DeliveryMode::Stream(_) => self.relay_stream(&request, &mode).await,
            DeliveryMode::Callback(_) => self.relay_callback(&request, &mode).await,
        };
        match result {
            Ok(()) => {
                log::info!("request {}: delivered", request.request_id);
                Outcome::Delivered
            }
            Err(e) => {
                log::warn!("request {}: failed: {}", request.request_id, e);
                Outcome::Failed(e)
            }
        }
    }

    /// Channel first, so an unreachable consumer costs no upstream call.
    async fn relay_stream(
        &self,
        request: &InboundRequest,
        mode: &DeliveryMode,
    ) -> Result<(), RelayError> {
        let mut channel = self.connector.open(mode).await?;
        let mut chunks = match self.backend.stream(&request.request_id, &request.data).await {
            Ok(chunks) => chunks,
            Err(e) => {
                // The consumer is waiting on this connection; end it explicitly.
                if let Err(send_err) = channel.send(&ResponseChunk::end(&request.request_id)).await
                {
                    log::debug!(
                        "request {}: terminal frame not delivered: {}",
                        request.request_id,
                        send_err
                    );
                }
                channel.close().await;
                return Err(e.into());
            }
        };

        let mut sent = 0usize;
        let mut dropped = 0usize;
        while let Some(chunk) = chunks.next().await {
            match channel.send(&chunk).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    dropped += 1;
                    log::warn!("request {}: frame not delivered: {}", request.request_id, e);
                }
            }
        }
        channel.close().await;
        if dropped > 0 {
            log::warn!(
                "request {}: {} of {} frame(s) not delivered",
                request.request_id,
                dropped,
                sent + dropped
            );
        } else {
            log::debug!("request {}: relayed {} frame(s)", request.request_id, sent);
        }
        Ok(())
    }

    async fn relay_callback(
        &self,
        request: &InboundRequest,
        mode: &DeliveryMode,
    ) -> Result<(), RelayError> {
        let mut channel = self.connector.open(mode).await?;
        let chunk = self
            .backend
            .complete(&request.request_id, &request.data)
            .await?;
        let result = channel.send(&chunk).await;
        channel.close().await;
        result?;
        Ok(())
    }
}
