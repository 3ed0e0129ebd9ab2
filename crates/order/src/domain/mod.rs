//! Order aggregate: states, commands, and the pure state machine.

mod command;
mod error;
mod order;

pub use command::{OrderCommand, apply, price_of};
pub use error::OrderError;
pub use order::{Order, OrderKind};
