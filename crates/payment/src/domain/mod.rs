//! Balance/payment aggregate: states, commands, and the pure transition.

mod balance;
mod error;
mod payment;

pub use balance::{Balance, PaymentCommand};
pub use error::PaymentError;
pub use payment::{Payment, PaymentStatus};
