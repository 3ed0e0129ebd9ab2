//! Shared types for the saga services.
//!
//! Every service references orders, customers and payments by UUID; the
//! newtypes here keep the three identifier spaces from being mixed up.

mod ids;

pub use ids::{CustomerId, OrderId, PaymentId};
