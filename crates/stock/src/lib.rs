//! Stock service.
//!
//! Owns the reservation side of the saga: the consumer loop decides stock
//! for each new order and replies directly on the confirmation stream. The
//! service keeps no durable state, so it runs without an outbox.

pub mod api;
pub mod config;
pub mod domain;
pub mod handler;
