//! OpenAI-compatible chat completions client (`POST /v1/chat/completions`).
//!
//! The request body is the caller's `data` as-is; whether the upstream streams is decided by
//! that body (`"stream": true`), the client only picks how to read the response.

use async_trait::async_trait;

use crate::llm::{chunk_stream, ChunkStream, CompletionBackend, UpstreamError};
use crate::message::ResponseChunk;

pub const DEFAULT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Client for an OpenAI-compatible completions endpoint with bearer-token auth.
#[derive(Clone)]
pub struct OpenAiClient {
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(url: Option<String>, api_key: impl Into<String>) -> Self {
        let url = url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_COMPLETIONS_URL.to_string());
        Self {
            url,
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST `data`; any non-success status becomes `UpstreamError::Api` with the upstream's body.
    async fn post(
        &self,
        data: &serde_json::Value,
        stream: bool,
    ) -> Result<reqwest::Response, UpstreamError> {
        let mut req = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(data);
        if stream {
            req = req.header(reqwest::header::ACCEPT, "text/event-stream");
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(UpstreamError::Api { status, body });
        }
        Ok(res)
    }
}

/// A streaming reply must be an event stream; a plain JSON body means the request did not
/// ask the upstream to stream (`"stream": true` missing from `data`).
fn is_event_stream(headers: &reqwest::header::HeaderMap) -> bool {
    headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| mime.trim().eq_ignore_ascii_case("text/event-stream"))
        .unwrap_or(false)
}

#[async_trait]
impl CompletionBackend for OpenAiClient {
    async fn stream(
        &self,
        request_id: &str,
        data: &serde_json::Value,
    ) -> Result<ChunkStream, UpstreamError> {
        let res = self.post(data, true).await?;
        if !is_event_stream(res.headers()) {
            let content_type = res
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("none")
                .to_string();
            let body = res.text().await.unwrap_or_default();
            return Err(UpstreamError::InvalidBody(format!(
                "expected text/event-stream, got {}: {}",
                content_type, body
            )));
        }
        log::debug!("request {}: upstream stream opened ({})", request_id, res.status());
        Ok(chunk_stream(request_id.to_string(), res.bytes_stream()))
    }

    async fn complete(
        &self,
        request_id: &str,
        data: &serde_json::Value,
    ) -> Result<ResponseChunk, UpstreamError> {
        let res = self.post(data, false).await?;
        let body = res.bytes().await?;
        let value: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| UpstreamError::InvalidBody(e.to_string()))?;
        Ok(ResponseChunk::complete(request_id, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(content_type: Option<&'static str>) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(
                reqwest::header::CONTENT_TYPE,
                reqwest::header::HeaderValue::from_static(ct),
            );
        }
        headers
    }

    #[test]
    fn event_stream_content_type() {
        assert!(is_event_stream(&headers_with(Some("text/event-stream"))));
        assert!(is_event_stream(&headers_with(Some(
            "text/event-stream; charset=utf-8"
        ))));
        assert!(!is_event_stream(&headers_with(Some("application/json"))));
        assert!(!is_event_stream(&headers_with(None)));
    }

    #[test]
    fn default_url_when_unset_or_blank() {
        assert_eq!(OpenAiClient::new(None, "k").url(), DEFAULT_COMPLETIONS_URL);
        assert_eq!(
            OpenAiClient::new(Some("  ".to_string()), "k").url(),
            DEFAULT_COMPLETIONS_URL
        );
        assert_eq!(
            OpenAiClient::new(Some("http://127.0.0.1:9/v1/chat/completions".to_string()), "k")
                .url(),
            "http://127.0.0.1:9/v1/chat/completions"
        );
    }
}
