//! Relay core library: consumes completion requests from a queue, calls the upstream
//! completions API and relays the result to a WebSocket consumer or an HTTP callback.

pub mod config;
pub mod delivery;
pub mod handler;
pub mod health;
pub mod llm;
pub mod message;
pub mod queue;
pub mod sse;
pub mod worker;

#[cfg(test)]
mod testing;
