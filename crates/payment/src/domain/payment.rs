//! Payment states.

use common::{OrderId, PaymentId};
use rust_decimal::Decimal;

/// Payment aggregate, tagged by lifecycle state.
///
/// `New` is a live reservation; `Failed` records a reservation that the
/// balance could not cover; `Completed` and `Canceled` are terminal
/// settlements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payment {
    New {
        id: PaymentId,
        order_id: OrderId,
        amount: Decimal,
    },
    Failed {
        id: PaymentId,
        order_id: OrderId,
        amount: Decimal,
    },
    Completed {
        id: PaymentId,
        amount: Decimal,
    },
    Canceled {
        id: PaymentId,
        amount: Decimal,
    },
}

/// Durable state tag, stored in the `status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    New,
    Failed,
    Completed,
    Canceled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::New => "new",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Payment {
    pub fn id(&self) -> PaymentId {
        match self {
            Payment::New { id, .. }
            | Payment::Failed { id, .. }
            | Payment::Completed { id, .. }
            | Payment::Canceled { id, .. } => *id,
        }
    }

    pub fn amount(&self) -> Decimal {
        match self {
            Payment::New { amount, .. }
            | Payment::Failed { amount, .. }
            | Payment::Completed { amount, .. }
            | Payment::Canceled { amount, .. } => *amount,
        }
    }

    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            Payment::New { order_id, .. } | Payment::Failed { order_id, .. } => Some(*order_id),
            Payment::Completed { .. } | Payment::Canceled { .. } => None,
        }
    }

    pub fn status(&self) -> PaymentStatus {
        match self {
            Payment::New { .. } => PaymentStatus::New,
            Payment::Failed { .. } => PaymentStatus::Failed,
            Payment::Completed { .. } => PaymentStatus::Completed,
            Payment::Canceled { .. } => PaymentStatus::Canceled,
        }
    }
}
