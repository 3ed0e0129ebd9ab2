//! Stock reservation decision.
//!
//! The stock aggregate is decided synchronously per order and holds no
//! durable record: the decision itself is the state.

use common::OrderId;
use uuid::Uuid;

/// Outcome of a stock decision for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stock {
    /// Reservation accepted.
    Active {
        id: Uuid,
        order_id: OrderId,
        items: Vec<String>,
    },
    /// Business rule refused the reservation.
    Rejected { order_id: OrderId },
    /// The order was canceled; any reservation is released.
    Canceled { order_id: OrderId },
}

impl Stock {
    pub fn order_id(&self) -> OrderId {
        match self {
            Stock::Active { order_id, .. }
            | Stock::Rejected { order_id }
            | Stock::Canceled { order_id } => *order_id,
        }
    }

    /// Releases whatever this order had reserved.
    pub fn cancel(order_id: OrderId) -> Self {
        Stock::Canceled { order_id }
    }
}

/// Business rule deciding whether an order's items can be reserved.
///
/// The default rule below is a placeholder; a real inventory service plugs
/// in behind this trait.
pub trait ReservationPolicy: Send + Sync {
    fn decide(&self, order_id: OrderId, items: Vec<String>) -> Stock;
}

/// Rejects orders above a fixed item count.
#[derive(Debug, Clone, Copy)]
pub struct ItemLimitPolicy {
    pub max_items: usize,
}

impl Default for ItemLimitPolicy {
    fn default() -> Self {
        Self { max_items: 10 }
    }
}

impl ReservationPolicy for ItemLimitPolicy {
    fn decide(&self, order_id: OrderId, items: Vec<String>) -> Stock {
        if items.len() > self.max_items {
            return Stock::Rejected { order_id };
        }

        Stock::Active {
            id: Uuid::new_v4(),
            order_id,
            items,
        }
    }
}
