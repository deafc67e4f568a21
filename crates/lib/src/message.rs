//! Wire types: the inbound queue message and the response chunks relayed downstream.

use serde::{Deserialize, Serialize};

/// A completion request decoded from one queue message body.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundRequest {
    /// Stream the response over a WebSocket instead of one callback POST.
    pub stream: bool,
    /// WebSocket URI when streaming, HTTP callback URL otherwise.
    pub endpoint: String,
    /// Upstream request body, forwarded untouched.
    pub data: serde_json::Value,
    /// Caller-assigned correlation token, echoed on every frame.
    pub request_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("request message is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("request message has no {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Deserialize)]
struct RawRequest {
    #[serde(default)]
    stream: Option<bool>,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    request_id: Option<String>,
}

impl InboundRequest {
    /// Decode a UTF-8 JSON queue payload. `endpoint` and `request_id` must be present and non-empty.
    pub fn parse(body: &[u8]) -> Result<Self, ParseError> {
        let raw: RawRequest = serde_json::from_slice(body)?;
        let endpoint = raw
            .endpoint
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ParseError::MissingField("endpoint"))?;
        let request_id = raw
            .request_id
            .filter(|s| !s.is_empty())
            .ok_or(ParseError::MissingField("request_id"))?;
        Ok(Self {
            stream: raw.stream.unwrap_or(false),
            endpoint,
            data: raw.data,
            request_id,
        })
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        if self.stream {
            DeliveryMode::Stream(self.endpoint.clone())
        } else {
            DeliveryMode::Callback(self.endpoint.clone())
        }
    }
}

/// Where and how the response goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Incremental frames over a WebSocket at this URI.
    Stream(String),
    /// One aggregated POST to this URL.
    Callback(String),
}

impl DeliveryMode {
    pub fn endpoint(&self) -> &str {
        match self {
            DeliveryMode::Stream(e) | DeliveryMode::Callback(e) => e,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, DeliveryMode::Stream(_))
    }
}

/// One unit of upstream output. Serializes as the stream frame `{request_id, data, end}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseChunk {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub end: bool,
}

impl ResponseChunk {
    /// A non-terminal streaming chunk.
    pub fn partial(request_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            request_id: request_id.into(),
            data: Some(data),
            end: false,
        }
    }

    /// The terminal streaming chunk; carries no data.
    pub fn end(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            data: None,
            end: true,
        }
    }

    /// The single batch-mode chunk: full body, implicitly terminal.
    pub fn complete(request_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            request_id: request_id.into(),
            data: Some(data),
            end: true,
        }
    }
}

/// Callback POST body: `{request_id, data}`.
#[derive(Debug, Serialize)]
pub struct CallbackPayload<'a> {
    pub request_id: &'a str,
    pub data: &'a serde_json::Value,
}
