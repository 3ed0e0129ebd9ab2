use thiserror::Error;

/// Errors surfaced by a stream backend.
///
/// All of these are infrastructure failures: callers retry (producer) or
/// leave the message unacknowledged for redelivery (consumer).
#[derive(Debug, Error)]
pub enum StreamError {
    /// The broker rejected or dropped the request.
    #[error("stream backend error: {0}")]
    Backend(#[from] redis::RedisError),

    /// A group read was issued against a group that does not exist yet.
    #[error("consumer group {group} does not exist on stream {stream}")]
    GroupNotFound { stream: String, group: String },

    /// A stream entry carried a field value that is not a UTF-8 string.
    #[error("invalid field value in stream entry {id}")]
    InvalidEntry { id: String },
}
