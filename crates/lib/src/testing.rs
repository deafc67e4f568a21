//! In-memory doubles for the backend, connector and subscription seams.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::delivery::{ChannelOpenError, DeliveryChannel, DeliveryConnector, DeliveryError};
use crate::llm::{chunk_stream, ChunkStream, CompletionBackend, UpstreamError};
use crate::message::{DeliveryMode, ResponseChunk};
use crate::queue::{QueueError, QueueMessage, Subscription};

/// Scripted upstream behavior.
#[derive(Clone)]
pub enum Upstream {
    /// SSE body, delivered in these pieces.
    Sse(Vec<&'static str>),
    /// Batch JSON body.
    Body(Value),
    /// Non-success status with this body.
    Fail(u16, &'static str),
}

pub struct FakeBackend {
    script: Upstream,
    pub calls: Arc<AtomicUsize>,
}

impl FakeBackend {
    pub fn new(script: Upstream) -> Self {
        Self {
            script,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn api_error(status: u16, body: &str) -> UpstreamError {
        UpstreamError::Api {
            status: reqwest::StatusCode::from_u16(status).unwrap(),
            body: body.to_string(),
        }
    }
}

#[async_trait]
impl CompletionBackend for FakeBackend {
    async fn stream(&self, request_id: &str, _data: &Value) -> Result<ChunkStream, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Upstream::Sse(parts) => {
                let body = futures_util::stream::iter(
                    parts.clone().into_iter().map(Ok::<_, String>),
                );
                Ok(chunk_stream(request_id.to_string(), body))
            }
            Upstream::Body(_) => Err(UpstreamError::InvalidBody("not an event stream".into())),
            Upstream::Fail(status, body) => Err(Self::api_error(*status, body)),
        }
    }

    async fn complete(&self, request_id: &str, _data: &Value) -> Result<ResponseChunk, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Upstream::Body(value) => Ok(ResponseChunk::complete(request_id, value.clone())),
            Upstream::Sse(_) => Err(UpstreamError::InvalidBody("event stream".into())),
            Upstream::Fail(status, body) => Err(Self::api_error(*status, body)),
        }
    }
}

/// What one opened channel saw.
#[derive(Debug, Clone)]
pub struct Opened {
    pub mode: DeliveryMode,
    pub frames: Vec<ResponseChunk>,
    pub closed: bool,
}

/// Records every channel it opens. Clones share the record.
#[derive(Clone, Default)]
pub struct RecordingConnector {
    log: Arc<Mutex<Vec<Opened>>>,
    /// Refuse every open.
    refuse: bool,
    /// Zero-based send attempts (per channel) that fail.
    fail_sends: Vec<usize>,
}

impl RecordingConnector {
    /// A connector whose every open fails.
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    /// A connector whose channels fail these zero-based send attempts.
    pub fn failing_sends(attempts: Vec<usize>) -> Self {
        Self {
            fail_sends: attempts,
            ..Self::default()
        }
    }

    pub fn opened(&self) -> Vec<Opened> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryConnector for RecordingConnector {
    async fn open(&self, mode: &DeliveryMode) -> Result<Box<dyn DeliveryChannel>, ChannelOpenError> {
        if self.refuse {
            return Err(ChannelOpenError::InvalidEndpoint(mode.endpoint().to_string()));
        }
        let mut log = self.log.lock().unwrap();
        log.push(Opened {
            mode: mode.clone(),
            frames: Vec::new(),
            closed: false,
        });
        Ok(Box::new(RecordingChannel {
            log: self.log.clone(),
            index: log.len() - 1,
            attempts: 0,
            fail_sends: self.fail_sends.clone(),
        }))
    }
}

struct RecordingChannel {
    log: Arc<Mutex<Vec<Opened>>>,
    index: usize,
    attempts: usize,
    fail_sends: Vec<usize>,
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    async fn send(&mut self, chunk: &ResponseChunk) -> Result<(), DeliveryError> {
        let attempt = self.attempts;
        self.attempts += 1;
        if self.fail_sends.contains(&attempt) {
            return Err(DeliveryError::Closed);
        }
        self.log.lock().unwrap()[self.index].frames.push(chunk.clone());
        Ok(())
    }

    async fn close(&mut self) {
        self.log.lock().unwrap()[self.index].closed = true;
    }
}

pub struct FakeMessage(pub Vec<u8>);

impl QueueMessage for FakeMessage {
    fn payload(&self) -> &[u8] {
        &self.0
    }
}

/// What the subscription does once its messages run out.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum WhenDrained {
    /// Report the subscription as ended.
    Close,
    /// Wait forever, as a live broker would.
    Hang,
    /// Fail the receive.
    Fail,
}

pub struct FakeSubscription {
    messages: VecDeque<FakeMessage>,
    drained: WhenDrained,
    pub acked: Arc<Mutex<Vec<Vec<u8>>>>,
    pub fail_acks: bool,
}

impl FakeSubscription {
    pub fn new<I, M>(messages: I, drained: WhenDrained) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<Vec<u8>>,
    {
        Self {
            messages: messages.into_iter().map(|m| FakeMessage(m.into())).collect(),
            drained,
            acked: Arc::new(Mutex::new(Vec::new())),
            fail_acks: false,
        }
    }
}

#[async_trait]
impl Subscription for FakeSubscription {
    type Message = FakeMessage;

    async fn next_message(&mut self) -> Result<Option<FakeMessage>, QueueError> {
        if let Some(message) = self.messages.pop_front() {
            return Ok(Some(message));
        }
        match self.drained {
            WhenDrained::Close => Ok(None),
            WhenDrained::Hang => std::future::pending().await,
            WhenDrained::Fail => Err(QueueError::Receive("broker went away".into())),
        }
    }

    async fn acknowledge(&mut self, message: &FakeMessage) -> Result<(), QueueError> {
        if self.fail_acks {
            return Err(QueueError::Acknowledge("ack timeout".into()));
        }
        self.acked.lock().unwrap().push(message.0.clone());
        Ok(())
    }
}
