//! Outbox repository for the balance/payment aggregate.
//!
//! Balance and payment commit together in one transaction, with the balance
//! row locked for the duration of the read-modify-write. Reservation
//! outcomes append a confirmation or failure event to the outbox log in the
//! same transaction.

use async_trait::async_trait;
use common::{CustomerId, OrderId, PaymentId};
use rust_decimal::Decimal;
use schema::{EventType, PaymentsEvent};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use stream::{EventLog, OutboxEntry};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Balance, Payment, PaymentCommand, PaymentError, PaymentStatus};

/// Failure of a repository operation, split by class.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Domain(#[from] PaymentError),
    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),
    #[error("event payload encoding failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt row for payment {payment_id}")]
    CorruptRow { payment_id: Uuid },
}

impl RepositoryError {
    /// True when the command was rejected by the state machine.
    pub fn is_domain(&self) -> bool {
        matches!(self, RepositoryError::Domain(_))
    }
}

/// Postgres-backed balance/payment store with a transactional outbox.
#[derive(Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies `command` against the customer's balance and the order's
    /// payment under one transaction, committing both rows plus the outbox
    /// event a reservation outcome produces.
    ///
    /// A customer without a balance row cannot cover any reservation, so a
    /// `Reserve` against an unknown customer records a failed payment
    /// instead of erroring.
    #[tracing::instrument(skip(self), fields(%customer_id))]
    pub async fn persist_transaction(
        &self,
        customer_id: CustomerId,
        command: PaymentCommand,
    ) -> Result<Payment, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let payment = Self::find_payment(&mut tx, &command).await?;
        let Some(balance) = Self::find_balance_for_update(&mut tx, customer_id).await? else {
            return Self::reject_unknown_customer(tx, customer_id, payment, command).await;
        };

        let (balance, payment) = balance.transaction(payment, command)?;
        Self::save_balance(&mut tx, &balance).await?;
        Self::save_payment(&mut tx, customer_id, &payment).await?;
        Self::append_event(&mut tx, &payment).await?;

        tx.commit().await?;

        metrics::counter!("payment_commands_applied_total").increment(1);
        Ok(payment)
    }

    async fn reject_unknown_customer(
        mut tx: Transaction<'_, Postgres>,
        customer_id: CustomerId,
        payment: Option<Payment>,
        command: PaymentCommand,
    ) -> Result<Payment, RepositoryError> {
        let PaymentCommand::Reserve { order_id, amount } = command else {
            return Err(PaymentError::UnknownCustomer.into());
        };

        // A redelivered new_order already has its failed payment on record;
        // bounce instead of inserting a second row and a duplicate event.
        if payment.is_some() {
            return Err(PaymentError::AlreadyReserved.into());
        }

        let failed = Payment::Failed {
            id: PaymentId::new(),
            order_id,
            amount,
        };
        Self::save_payment(&mut tx, customer_id, &failed).await?;
        Self::append_event(&mut tx, &failed).await?;
        tx.commit().await?;

        tracing::warn!(%customer_id, %order_id, "reservation against unknown customer failed");
        Ok(failed)
    }

    async fn find_balance_for_update(
        tx: &mut Transaction<'_, Postgres>,
        customer_id: CustomerId,
    ) -> Result<Option<Balance>, RepositoryError> {
        let row: Option<(Decimal, Decimal)> = sqlx::query_as(
            "SELECT available_amount, reserved_amount FROM balances \
             WHERE customer_id = $1 FOR UPDATE",
        )
        .bind(customer_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row.map(|(amount, reserved)| Balance {
            customer_id,
            amount,
            reserved,
        }))
    }

    /// Resolves the payment a command addresses: by payment id when the
    /// command carries one, by order id otherwise (reservations and
    /// cancellations of orders that never reached payment).
    async fn find_payment(
        tx: &mut Transaction<'_, Postgres>,
        command: &PaymentCommand,
    ) -> Result<Option<Payment>, RepositoryError> {
        let row: Option<PaymentRow> = match command {
            PaymentCommand::Complete { payment_id }
            | PaymentCommand::Cancel {
                payment_id: Some(payment_id),
                ..
            } => {
                sqlx::query_as(
                    "SELECT payment_id, customer_id, order_id, amount, status \
                     FROM payments WHERE payment_id = $1 FOR UPDATE",
                )
                .bind(payment_id.as_uuid())
                .fetch_optional(&mut **tx)
                .await?
            }
            PaymentCommand::Reserve { order_id, .. }
            | PaymentCommand::Cancel {
                payment_id: None,
                order_id,
            } => {
                sqlx::query_as(
                    "SELECT payment_id, customer_id, order_id, amount, status \
                     FROM payments WHERE order_id = $1 FOR UPDATE",
                )
                .bind(order_id.as_uuid())
                .fetch_optional(&mut **tx)
                .await?
            }
        };

        row.map(PaymentRow::into_domain).transpose()
    }

    async fn save_balance(
        tx: &mut Transaction<'_, Postgres>,
        balance: &Balance,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE balances SET available_amount = $2, reserved_amount = $3 \
             WHERE customer_id = $1",
        )
        .bind(balance.customer_id.as_uuid())
        .bind(balance.amount)
        .bind(balance.reserved)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn save_payment(
        tx: &mut Transaction<'_, Postgres>,
        customer_id: CustomerId,
        payment: &Payment,
    ) -> Result<(), RepositoryError> {
        match payment {
            // Fresh reservation outcomes get their own row.
            Payment::New {
                id,
                order_id,
                amount,
            }
            | Payment::Failed {
                id,
                order_id,
                amount,
            } => {
                sqlx::query(
                    "INSERT INTO payments (payment_id, status, customer_id, order_id, amount) \
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(id.as_uuid())
                .bind(payment.status().as_str())
                .bind(customer_id.as_uuid())
                .bind(order_id.as_uuid())
                .bind(amount)
                .execute(&mut **tx)
                .await?;
            }
            Payment::Completed { id, .. } | Payment::Canceled { id, .. } => {
                sqlx::query("UPDATE payments SET status = $2 WHERE payment_id = $1")
                    .bind(id.as_uuid())
                    .bind(payment.status().as_str())
                    .execute(&mut **tx)
                    .await?;
            }
        }
        Ok(())
    }

    async fn append_event(
        tx: &mut Transaction<'_, Postgres>,
        payment: &Payment,
    ) -> Result<(), RepositoryError> {
        let Some(event) = outbox_event(payment) else {
            return Ok(());
        };

        sqlx::query("INSERT INTO event_log (payload, event_kind) VALUES ($1, $2)")
            .bind(Json(&event))
            .bind(event.event_type.as_str())
            .execute(&mut **tx)
            .await?;

        tracing::debug!(order_id = %event.order_id, kind = %event.event_type, "outbox event appended");
        Ok(())
    }

    async fn oldest_unpublished(&self) -> Result<Option<(i64, PaymentsEvent)>, RepositoryError> {
        let row: Option<(i64, Json<PaymentsEvent>)> = sqlx::query_as(
            "SELECT id, payload FROM event_log \
             WHERE id > (SELECT offset_acked FROM event_offset) \
             ORDER BY id ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(offset, Json(event))| (offset, event)))
    }

    async fn advance_cursor(&self, offset: i64) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE event_offset SET offset_acked = $1")
            .bind(offset)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EventLog for PaymentRepository {
    type Error = RepositoryError;

    async fn next_event(&self) -> Result<Option<OutboxEntry>, RepositoryError> {
        Ok(self
            .oldest_unpublished()
            .await?
            .map(|(offset, event)| OutboxEntry {
                offset,
                fields: event.to_fields(),
            }))
    }

    async fn ack(&self, offset: i64) -> Result<(), RepositoryError> {
        self.advance_cursor(offset).await
    }
}

/// Maps a payment state to the saga event it emits, if any.
///
/// Only reservation outcomes answer the order service: a live reservation
/// confirms the payment leg, a failed one rejects it. Settlements are
/// reactions to order events and emit nothing back.
fn outbox_event(payment: &Payment) -> Option<PaymentsEvent> {
    match *payment {
        Payment::New { id, order_id, .. } => Some(PaymentsEvent {
            event_type: EventType::PaymentsConfirmed,
            order_id,
            payments_id: id,
        }),
        Payment::Failed { id, order_id, .. } => Some(PaymentsEvent {
            event_type: EventType::PaymentsFailed,
            order_id,
            payments_id: id,
        }),
        Payment::Completed { .. } | Payment::Canceled { .. } => None,
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    payment_id: Uuid,
    #[allow(dead_code)]
    customer_id: Uuid,
    order_id: Uuid,
    amount: Decimal,
    status: String,
}

impl PaymentRow {
    fn into_domain(self) -> Result<Payment, RepositoryError> {
        let id = PaymentId::from_uuid(self.payment_id);
        let order_id = OrderId::from_uuid(self.order_id);

        let payment = match self.status.as_str() {
            "new" => Payment::New {
                id,
                order_id,
                amount: self.amount,
            },
            "failed" => Payment::Failed {
                id,
                order_id,
                amount: self.amount,
            },
            "completed" => Payment::Completed {
                id,
                amount: self.amount,
            },
            "canceled" => Payment::Canceled {
                id,
                amount: self.amount,
            },
            _ => {
                return Err(RepositoryError::CorruptRow {
                    payment_id: self.payment_id,
                });
            }
        };

        Ok(payment)
    }
}
