//! Order aggregate states.
//!
//! One variant per lifecycle state, carrying exactly the attributes that
//! state has accumulated. Attributes only grow as the order advances:
//! customer at creation, items while open, price at processing, payment id
//! at payment. `Completed` and `Canceled` are terminal.

use common::{CustomerId, OrderId, PaymentId};
use rust_decimal::Decimal;

/// Order aggregate, tagged by lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Order {
    /// Created, no items yet. Also reached by removing the last item.
    Empty {
        id: OrderId,
        customer_id: CustomerId,
    },
    /// Has at least one item; the item list is still mutable.
    Active {
        id: OrderId,
        customer_id: CustomerId,
        items: Vec<String>,
    },
    /// Processed: items frozen, price computed, waiting for both
    /// payment and stock confirmation.
    Pending {
        id: OrderId,
        customer_id: CustomerId,
        items: Vec<String>,
        price: Decimal,
    },
    /// Stock confirmed first; still waiting for payment.
    Stocked {
        id: OrderId,
        customer_id: CustomerId,
        items: Vec<String>,
        price: Decimal,
    },
    /// Payment confirmed first; still waiting for stock.
    Paid {
        id: OrderId,
        customer_id: CustomerId,
        items: Vec<String>,
        price: Decimal,
        payment_id: PaymentId,
    },
    /// Both confirmations arrived. Terminal.
    Completed {
        id: OrderId,
        customer_id: CustomerId,
        items: Vec<String>,
        price: Decimal,
        payment_id: PaymentId,
    },
    /// Payment or stock rejected. Terminal.
    Canceled {
        id: OrderId,
        customer_id: CustomerId,
        items: Vec<String>,
        price: Decimal,
    },
}

/// Durable state tag, stored in the `kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Empty,
    Active,
    Pending,
    Stocked,
    Paid,
    Completed,
    Canceled,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Empty => "empty",
            OrderKind::Active => "active",
            OrderKind::Pending => "pending",
            OrderKind::Stocked => "stocked",
            OrderKind::Paid => "paid",
            OrderKind::Completed => "completed",
            OrderKind::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Order {
    pub fn id(&self) -> OrderId {
        match self {
            Order::Empty { id, .. }
            | Order::Active { id, .. }
            | Order::Pending { id, .. }
            | Order::Stocked { id, .. }
            | Order::Paid { id, .. }
            | Order::Completed { id, .. }
            | Order::Canceled { id, .. } => *id,
        }
    }

    pub fn customer_id(&self) -> CustomerId {
        match self {
            Order::Empty { customer_id, .. }
            | Order::Active { customer_id, .. }
            | Order::Pending { customer_id, .. }
            | Order::Stocked { customer_id, .. }
            | Order::Paid { customer_id, .. }
            | Order::Completed { customer_id, .. }
            | Order::Canceled { customer_id, .. } => *customer_id,
        }
    }

    pub fn items(&self) -> &[String] {
        match self {
            Order::Empty { .. } => &[],
            Order::Active { items, .. }
            | Order::Pending { items, .. }
            | Order::Stocked { items, .. }
            | Order::Paid { items, .. }
            | Order::Completed { items, .. }
            | Order::Canceled { items, .. } => items,
        }
    }

    pub fn price(&self) -> Option<Decimal> {
        match self {
            Order::Empty { .. } | Order::Active { .. } => None,
            Order::Pending { price, .. }
            | Order::Stocked { price, .. }
            | Order::Paid { price, .. }
            | Order::Completed { price, .. }
            | Order::Canceled { price, .. } => Some(*price),
        }
    }

    pub fn payment_id(&self) -> Option<PaymentId> {
        match self {
            Order::Paid { payment_id, .. } | Order::Completed { payment_id, .. } => {
                Some(*payment_id)
            }
            _ => None,
        }
    }

    pub fn kind(&self) -> OrderKind {
        match self {
            Order::Empty { .. } => OrderKind::Empty,
            Order::Active { .. } => OrderKind::Active,
            Order::Pending { .. } => OrderKind::Pending,
            Order::Stocked { .. } => OrderKind::Stocked,
            Order::Paid { .. } => OrderKind::Paid,
            Order::Completed { .. } => OrderKind::Completed,
            Order::Canceled { .. } => OrderKind::Canceled,
        }
    }
}
