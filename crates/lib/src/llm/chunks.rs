//! Turn an SSE response body into response chunks.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use futures_util::{Stream, StreamExt};

use crate::llm::ChunkStream;
use crate::message::ResponseChunk;
use crate::sse::{classify, EventStreamDecoder, Payload, StreamEvent};

struct ChunkState<S> {
    body: Pin<Box<S>>,
    decoder: EventStreamDecoder,
    pending: VecDeque<ResponseChunk>,
    request_id: String,
    /// Terminal chunk queued; nothing else is read or produced.
    finished: bool,
}

impl<S> ChunkState<S> {
    fn absorb(&mut self, events: Vec<StreamEvent>) {
        for event in events {
            if self.finished {
                log::debug!("request {}: ignoring event after [DONE]", self.request_id);
                continue;
            }
            match event {
                StreamEvent::Event { data, .. } => match classify(&data) {
                    Ok(Payload::Done) => {
                        self.pending.push_back(ResponseChunk::end(&self.request_id));
                        self.finished = true;
                    }
                    Ok(Payload::Json(value)) => {
                        self.pending
                            .push_back(ResponseChunk::partial(&self.request_id, value));
                    }
                    Err(e) => {
                        log::warn!("request {}: skipping event: {}", self.request_id, e);
                    }
                },
                StreamEvent::Reconnect { retry } => {
                    log::debug!(
                        "request {}: ignoring retry directive ({:?})",
                        self.request_id,
                        retry
                    );
                }
            }
        }
    }

    /// Upstream is gone; make sure the sequence still ends with a terminal chunk.
    fn close_out(&mut self) {
        if !self.finished {
            self.pending.push_back(ResponseChunk::end(&self.request_id));
            self.finished = true;
        }
    }
}

/// Decode `body` incrementally into chunks for `request_id`.
///
/// `[DONE]` becomes the terminal chunk and stops reading. If the body ends or fails first, a
/// terminal chunk is produced anyway so consumers always see exactly one `end = true`.
pub fn chunk_stream<S, B, E>(request_id: String, body: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = ChunkState {
        body: Box::pin(body),
        decoder: EventStreamDecoder::new(),
        pending: VecDeque::new(),
        request_id,
        finished: false,
    };
    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.pending.pop_front() {
                return Some((chunk, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    let events = state.decoder.feed(bytes.as_ref());
                    state.absorb(events);
                }
                Some(Err(e)) => {
                    log::warn!("request {}: upstream read failed: {}", state.request_id, e);
                    state.close_out();
                }
                None => {
                    let events = state.decoder.finish();
                    state.absorb(events);
                    if !state.finished {
                        log::debug!("request {}: upstream closed without [DONE]", state.request_id);
                    }
                    state.close_out();
                }
            }
        }
    })
    .boxed()
}
