use thiserror::Error;

/// Rejections of order commands that are illegal in the current state.
///
/// These are business outcomes, not failures: callers map them to a
/// precondition-failed response or acknowledge the triggering message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("order already exists")]
    AlreadyExists,
    #[error("order not found")]
    UnknownOrder,
    #[error("adding an item to an order that is being processed")]
    OrderClosed,
    #[error("removing an item from an empty order")]
    RemoveFromEmpty,
    #[error("removing an item from an order that is being processed")]
    RemoveFromClosed,
    #[error("processing a non-active order")]
    NotActive,
    #[error("payment for an order not ready for payment")]
    NotPayable,
    #[error("stocking a non-prepared order")]
    NotStockable,
    #[error("cancellation of an order not eligible for cancellation")]
    NotCancelable,
}
