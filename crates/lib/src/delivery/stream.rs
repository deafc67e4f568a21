//! WebSocket delivery: one text frame per chunk.

use async_trait::async_trait;
use futures_util::SinkExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::delivery::{ChannelOpenError, DeliveryChannel, DeliveryError};
use crate::message::ResponseChunk;

/// Persistent connection to one request's stream endpoint. Sole writer for that request.
///
/// The socket is never read, so pings from the peer are not answered until `close`.
pub struct StreamChannel {
    endpoint: String,
    ws: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

impl StreamChannel {
    /// Complete the WebSocket handshake with `endpoint`.
    pub async fn connect(endpoint: &str) -> Result<Self, ChannelOpenError> {
        let (ws, _) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|source| ChannelOpenError::Connect {
                endpoint: endpoint.to_string(),
                source,
            })?;
        log::debug!("stream channel open: {}", endpoint);
        Ok(Self {
            endpoint: endpoint.to_string(),
            ws: Some(ws),
        })
    }
}

#[async_trait]
impl DeliveryChannel for StreamChannel {
    async fn send(&mut self, chunk: &ResponseChunk) -> Result<(), DeliveryError> {
        let ws = self.ws.as_mut().ok_or(DeliveryError::Closed)?;
        let text = serde_json::to_string(chunk)?;
        ws.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut ws) = self.ws.take() {
            if let Err(e) = ws.close(None).await {
                log::debug!("stream channel {}: close failed: {}", self.endpoint, e);
            } else {
                log::debug!("stream channel closed: {}", self.endpoint);
            }
        }
    }
}
