//! Outbox seam between a service's event log and the producer loop.

use async_trait::async_trait;

/// One row of a service's outbox log, ready to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    /// Monotonically increasing log offset.
    pub offset: i64,
    /// Wire fields of the event, as appended by the owning transaction.
    pub fields: Vec<(String, String)>,
}

/// A service's transactional outbox, as seen by the producer loop.
///
/// `next_event` returns the single oldest entry past the acknowledged
/// cursor, or `None` when the log is drained; `ack` advances the cursor and
/// is only called after a confirmed publish. Implementations keep the cursor
/// at or below the highest appended offset.
#[async_trait]
pub trait EventLog: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the oldest unacknowledged entry, if any.
    async fn next_event(&self) -> Result<Option<OutboxEntry>, Self::Error>;

    /// Advances the acknowledged cursor to `offset`.
    async fn ack(&self, offset: i64) -> Result<(), Self::Error>;
}
