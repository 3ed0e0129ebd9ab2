//! Order service.
//!
//! Owns the order aggregate of the saga: a REST API feeds commands into the
//! state machine through the outbox repository, the producer loop publishes
//! resulting events on the orders stream, and the consumer loop folds
//! payment/stock confirmations back into the order.

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod handler;
pub mod repository;
