//! Upstream completion API.
//!
//! A backend issues one completion request per inbound message, either as a lazy stream of
//! response chunks (SSE upstream) or as a single chunk holding the full body.

mod chunks;
mod openai;

pub use chunks::chunk_stream;
pub use openai::{OpenAiClient, DEFAULT_COMPLETIONS_URL};

use crate::message::ResponseChunk;
use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// Lazy, finite, non-restartable sequence of chunks ending in exactly one `end = true` chunk.
pub type ChunkStream = BoxStream<'static, ResponseChunk>;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("upstream api error: {status} {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("upstream returned an invalid body: {0}")]
    InvalidBody(String),
}

/// Completion dispatcher seam; the handler only talks to this trait.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Start a streaming completion. Fails only if the request cannot be started
    /// (transport error or non-success status); later read errors end the stream.
    async fn stream(
        &self,
        request_id: &str,
        data: &serde_json::Value,
    ) -> Result<ChunkStream, UpstreamError>;

    /// Run a batch completion and wrap the full body as one terminal chunk.
    async fn complete(
        &self,
        request_id: &str,
        data: &serde_json::Value,
    ) -> Result<ResponseChunk, UpstreamError>;
}
