//! Messaging layer for the saga services.
//!
//! Provides the [`MessageStream`] abstraction over a shared, consumer-grouped
//! message broker (Redis Streams in production, an in-memory double in tests),
//! plus the two loops every service builds on: the outbox [`producer`] that
//! drains a local event log into a stream, and the [`consumer`] that reads a
//! stream through a consumer group and dispatches messages with at-least-once
//! semantics.

mod client;
pub mod consumer;
mod error;
mod memory;
pub mod outbox;
pub mod producer;
mod redis_stream;

pub use client::{MessageStream, StreamMessage};
pub use consumer::{HandlerError, MessageHandler, run_consumer};
pub use error::StreamError;
pub use memory::InMemoryStream;
pub use outbox::{EventLog, OutboxEntry};
pub use producer::run_producer;
pub use redis_stream::RedisStream;
