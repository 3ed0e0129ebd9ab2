use thiserror::Error;

/// Rejections of payment commands that are illegal in the current state.
///
/// Insufficient funds is deliberately absent: a reservation that cannot be
/// covered is a business outcome (a failed payment) and flows through the
/// success path, not through this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("reservation amount must be positive")]
    NonPositiveAmount,
    #[error("order already has a payment")]
    AlreadyReserved,
    #[error("balance not found for customer")]
    UnknownCustomer,
    #[error("payment not found")]
    UnknownPayment,
    #[error("completing a non-reservable payment")]
    NotReservable,
    #[error("canceling an already settled payment")]
    NotCancelable,
}
