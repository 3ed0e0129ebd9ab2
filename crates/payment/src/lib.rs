//! Payment service.
//!
//! Owns the balance/payment aggregate of the saga: the consumer loop folds
//! order lifecycle events into reservations and settlements, and the
//! producer loop publishes reservation outcomes on the confirmation stream.

pub mod api;
pub mod config;
pub mod domain;
pub mod handler;
pub mod repository;
