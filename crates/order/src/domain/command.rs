//! Order commands and the pure state-transition function.

use common::{CustomerId, OrderId, PaymentId};
use rust_decimal::Decimal;

use super::error::OrderError;
use super::order::Order;

/// Commands accepted by the order aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderCommand {
    Create {
        order_id: OrderId,
        customer_id: CustomerId,
    },
    AddItem {
        item: String,
    },
    RemoveItem {
        item: String,
    },
    Process,
    ConfirmPayment {
        payment_id: PaymentId,
    },
    ConfirmStock,
    RejectPayment,
    RejectStock,
}

/// Placeholder pricing rule: flat unit price times item count.
///
/// A real pricing service plugs in behind this function; everything else
/// only relies on the price being deterministic for a given item list.
pub fn price_of(items: &[String]) -> Decimal {
    Decimal::new(999, 2) * Decimal::from(items.len() as i64)
}

/// Applies a command to the current order state, if any.
///
/// Pure function, no I/O. Confirmations commute: payment-then-stock and
/// stock-then-payment both end in `Completed`, and a rejection at any point
/// after processing wins over any later confirmation (terminal `Canceled`).
pub fn apply(current: Option<Order>, command: OrderCommand) -> Result<Order, OrderError> {
    match (current, command) {
        (
            None,
            OrderCommand::Create {
                order_id,
                customer_id,
            },
        ) => Ok(Order::Empty {
            id: order_id,
            customer_id,
        }),
        (Some(_), OrderCommand::Create { .. }) => Err(OrderError::AlreadyExists),
        (None, _) => Err(OrderError::UnknownOrder),
        (Some(order), command) => transition(order, command),
    }
}

fn transition(order: Order, command: OrderCommand) -> Result<Order, OrderError> {
    match (order, command) {
        // Already handled in `apply`; the aggregate key is its identity.
        (_, OrderCommand::Create { .. }) => Err(OrderError::AlreadyExists),

        (Order::Empty { id, customer_id }, OrderCommand::AddItem { item }) => Ok(Order::Active {
            id,
            customer_id,
            items: vec![item],
        }),
        (
            Order::Active {
                id,
                customer_id,
                mut items,
            },
            OrderCommand::AddItem { item },
        ) => {
            items.push(item);
            Ok(Order::Active {
                id,
                customer_id,
                items,
            })
        }
        (_, OrderCommand::AddItem { .. }) => Err(OrderError::OrderClosed),

        (
            Order::Active {
                id,
                customer_id,
                mut items,
            },
            OrderCommand::RemoveItem { item },
        ) => {
            // Removes the first occurrence; a missing item is a no-op so the
            // command is safe to replay.
            if let Some(position) = items.iter().position(|it| *it == item) {
                items.remove(position);
            }
            if items.is_empty() {
                Ok(Order::Empty { id, customer_id })
            } else {
                Ok(Order::Active {
                    id,
                    customer_id,
                    items,
                })
            }
        }
        (Order::Empty { .. }, OrderCommand::RemoveItem { .. }) => Err(OrderError::RemoveFromEmpty),
        (_, OrderCommand::RemoveItem { .. }) => Err(OrderError::RemoveFromClosed),

        (
            Order::Active {
                id,
                customer_id,
                items,
            },
            OrderCommand::Process,
        ) => {
            let price = price_of(&items);
            Ok(Order::Pending {
                id,
                customer_id,
                items,
                price,
            })
        }
        (_, OrderCommand::Process) => Err(OrderError::NotActive),

        (
            Order::Pending {
                id,
                customer_id,
                items,
                price,
            },
            OrderCommand::ConfirmPayment { payment_id },
        ) => Ok(Order::Paid {
            id,
            customer_id,
            items,
            price,
            payment_id,
        }),
        (
            Order::Stocked {
                id,
                customer_id,
                items,
                price,
            },
            OrderCommand::ConfirmPayment { payment_id },
        ) => Ok(Order::Completed {
            id,
            customer_id,
            items,
            price,
            payment_id,
        }),
        (_, OrderCommand::ConfirmPayment { .. }) => Err(OrderError::NotPayable),

        (
            Order::Pending {
                id,
                customer_id,
                items,
                price,
            },
            OrderCommand::ConfirmStock,
        ) => Ok(Order::Stocked {
            id,
            customer_id,
            items,
            price,
        }),
        (
            Order::Paid {
                id,
                customer_id,
                items,
                price,
                payment_id,
            },
            OrderCommand::ConfirmStock,
        ) => Ok(Order::Completed {
            id,
            customer_id,
            items,
            price,
            payment_id,
        }),
        (_, OrderCommand::ConfirmStock) => Err(OrderError::NotStockable),

        (
            Order::Pending {
                id,
                customer_id,
                items,
                price,
            }
            | Order::Stocked {
                id,
                customer_id,
                items,
                price,
            }
            | Order::Paid {
                id,
                customer_id,
                items,
                price,
                ..
            },
            OrderCommand::RejectPayment | OrderCommand::RejectStock,
        ) => Ok(Order::Canceled {
            id,
            customer_id,
            items,
            price,
        }),
        (_, OrderCommand::RejectPayment | OrderCommand::RejectStock) => {
            Err(OrderError::NotCancelable)
        }
    }
}
