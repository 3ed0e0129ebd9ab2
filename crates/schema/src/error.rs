use thiserror::Error;

/// Errors produced while decoding a wire field map into a typed event.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The `type` field named an event kind this schema does not know.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// A field the event type declares was absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field could not be parsed as a UUID.
    #[error("invalid uuid in field {field}: {source}")]
    InvalidUuid {
        field: &'static str,
        source: uuid::Error,
    },

    /// A monetary field could not be parsed as a decimal.
    #[error("invalid amount in field {field}: {source}")]
    InvalidAmount {
        field: &'static str,
        source: rust_decimal::Error,
    },
}
