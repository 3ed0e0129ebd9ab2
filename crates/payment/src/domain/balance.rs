//! Customer balance and the combined balance/payment transition.
//!
//! A command mutates the payment and the balance together; callers commit
//! the resulting pair atomically. All arithmetic is exact decimal.

use common::{OrderId, PaymentId};
use rust_decimal::Decimal;

use super::error::PaymentError;
use super::payment::Payment;

/// Commands accepted by the balance/payment aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentCommand {
    /// Hold `amount` of the customer's funds for an order.
    Reserve { order_id: OrderId, amount: Decimal },
    /// Settle a reservation: the held funds are spent.
    Complete { payment_id: PaymentId },
    /// Release a reservation, or refund an already settled payment.
    ///
    /// Cancellations triggered by a canceled order may not know the payment
    /// id; the caller then resolves the payment by order id.
    Cancel {
        payment_id: Option<PaymentId>,
        order_id: OrderId,
    },
}

/// A customer's funds: `amount` is spendable, `reserved` is held pending
/// settlement. Both are non-negative after every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balance {
    pub customer_id: common::CustomerId,
    pub amount: Decimal,
    pub reserved: Decimal,
}

impl Balance {
    /// Applies a command against this balance and the order's current
    /// payment, if one exists. Pure function, no I/O.
    ///
    /// A reservation the balance cannot cover is not an error: it returns
    /// the untouched balance paired with a `Failed` payment, so the caller
    /// still records the outcome and emits a failure event.
    pub fn transaction(
        self,
        payment: Option<Payment>,
        command: PaymentCommand,
    ) -> Result<(Balance, Payment), PaymentError> {
        match command {
            PaymentCommand::Reserve { order_id, amount } => {
                if amount <= Decimal::ZERO {
                    return Err(PaymentError::NonPositiveAmount);
                }
                // A redelivered new_order finds the payment it already
                // created and bounces instead of reserving twice.
                if payment.is_some() {
                    return Err(PaymentError::AlreadyReserved);
                }
                self.reserve(order_id, amount)
            }
            PaymentCommand::Complete { .. } => match payment {
                Some(Payment::New { id, amount, .. }) => Ok((
                    Balance {
                        reserved: self.reserved - amount,
                        ..self
                    },
                    Payment::Completed { id, amount },
                )),
                Some(_) => Err(PaymentError::NotReservable),
                None => Err(PaymentError::UnknownPayment),
            },
            PaymentCommand::Cancel { .. } => match payment {
                Some(Payment::New { id, amount, .. }) => Ok((
                    Balance {
                        amount: self.amount + amount,
                        reserved: self.reserved - amount,
                        ..self
                    },
                    Payment::Canceled { id, amount },
                )),
                // The order was canceled after the payment settled; the
                // spent funds are refunded.
                Some(Payment::Completed { id, amount }) => Ok((
                    Balance {
                        amount: self.amount + amount,
                        ..self
                    },
                    Payment::Canceled { id, amount },
                )),
                Some(Payment::Canceled { .. } | Payment::Failed { .. }) => {
                    Err(PaymentError::NotCancelable)
                }
                None => Err(PaymentError::UnknownPayment),
            },
        }
    }

    fn reserve(self, order_id: OrderId, amount: Decimal) -> Result<(Balance, Payment), PaymentError> {
        let id = PaymentId::new();

        if self.amount < amount {
            return Ok((
                self,
                Payment::Failed {
                    id,
                    order_id,
                    amount,
                },
            ));
        }

        Ok((
            Balance {
                amount: self.amount - amount,
                reserved: self.reserved + amount,
                ..self
            },
            Payment::New {
                id,
                order_id,
                amount,
            },
        ))
    }
}
