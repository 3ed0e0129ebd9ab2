use std::time::Duration;

use async_trait::async_trait;
use schema::Fields;

use crate::error::StreamError;

/// A single entry delivered from a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    /// Broker-assigned entry ID, used for acknowledgment.
    pub id: String,
    /// Flat string-keyed payload of the entry.
    pub fields: Fields,
}

/// Low-level client for an append-only message stream with consumer groups.
///
/// The contract mirrors what the saga needs and nothing more: lazily create
/// a group starting from the beginning of the stream, block on a group read,
/// append an entry, and acknowledge a delivered entry. Delivery is
/// at-least-once; an entry read but never acknowledged is redelivered to a
/// consumer of the same group.
#[async_trait]
pub trait MessageStream: Send + Sync {
    /// Creates the consumer group on the stream if it does not exist yet,
    /// positioned at the beginning of the stream.
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), StreamError>;

    /// Reads at most one new entry for the group, blocking up to `block`.
    ///
    /// Returns an empty vector when the block timeout elapses without a new
    /// entry, so callers can observe shutdown between reads.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
    ) -> Result<Vec<StreamMessage>, StreamError>;

    /// Appends an entry to the stream and returns its broker-assigned ID.
    async fn publish(&self, stream: &str, fields: &[(String, String)])
    -> Result<String, StreamError>;

    /// Acknowledges a delivered entry for the group.
    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<(), StreamError>;
}
