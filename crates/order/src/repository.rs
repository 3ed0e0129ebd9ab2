//! Outbox repository for the order aggregate.
//!
//! `persist` runs the whole read-modify-write under one transaction with a
//! row lock, so concurrent commands against the same order serialize on the
//! database. Saga-relevant states append an event row to the outbox log in
//! that same transaction.

use async_trait::async_trait;
use common::{CustomerId, OrderId, PaymentId};
use rust_decimal::Decimal;
use schema::{EventType, OrderEvent};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use stream::{EventLog, OutboxEntry};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Order, OrderCommand, OrderError, OrderKind, apply};

/// Failure of a repository operation, split by class.
///
/// `Domain` is a business rejection and never retried; the other variants
/// are infrastructure failures that callers retry (HTTP 500, unacked
/// stream entry).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Domain(#[from] OrderError),
    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),
    #[error("event payload encoding failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt row for order {order_id}")]
    CorruptRow { order_id: Uuid },
}

impl RepositoryError {
    /// True when the command was rejected by the state machine.
    pub fn is_domain(&self) -> bool {
        matches!(self, RepositoryError::Domain(_))
    }
}

/// Postgres-backed order store with a transactional outbox.
#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies `command` to the order under a row lock and commits the new
    /// state together with its outbox event, if the state produces one.
    ///
    /// A domain rejection rolls the transaction back and surfaces as
    /// `RepositoryError::Domain`.
    #[tracing::instrument(skip(self), fields(%order_id))]
    pub async fn persist(
        &self,
        order_id: OrderId,
        command: OrderCommand,
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current = Self::find_for_update(&mut tx, order_id).await?;
        let order = apply(current, command)?;
        Self::save(&mut tx, &order).await?;
        Self::append_event(&mut tx, &order).await?;

        tx.commit().await?;

        metrics::counter!("order_commands_applied_total").increment(1);
        Ok(order)
    }

    /// Loads an order without locking it.
    pub async fn find(&self, order_id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(
            "SELECT order_id, customer_id, items, price, payment_id, kind \
             FROM orders WHERE order_id = $1",
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(OrderRow::into_domain).transpose()
    }

    async fn find_for_update(
        tx: &mut Transaction<'_, Postgres>,
        order_id: OrderId,
    ) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(
            "SELECT order_id, customer_id, items, price, payment_id, kind \
             FROM orders WHERE order_id = $1 FOR UPDATE",
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await?;

        row.map(OrderRow::into_domain).transpose()
    }

    async fn save(
        tx: &mut Transaction<'_, Postgres>,
        order: &Order,
    ) -> Result<(), RepositoryError> {
        let row = OrderRow::from_domain(order);
        sqlx::query(
            "INSERT INTO orders (order_id, customer_id, items, price, payment_id, kind) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (order_id) DO UPDATE SET \
             items = EXCLUDED.items, price = EXCLUDED.price, \
             payment_id = EXCLUDED.payment_id, kind = EXCLUDED.kind",
        )
        .bind(row.order_id)
        .bind(row.customer_id)
        .bind(row.items)
        .bind(row.price)
        .bind(row.payment_id)
        .bind(row.kind)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn append_event(
        tx: &mut Transaction<'_, Postgres>,
        order: &Order,
    ) -> Result<(), RepositoryError> {
        let Some(event) = outbox_event(order) else {
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

    async fn oldest_unpublished(&self) -> Result<Option<(i64, OrderEvent)>, RepositoryError> {
        let row: Option<(i64, Json<OrderEvent>)> = sqlx::query_as(
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
impl EventLog for OrderRepository {
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

/// Maps an order state to the saga event it emits, if any.
///
/// Only the states other services react to produce events: `Pending` starts
/// the saga, `Completed` and `Canceled` settle it.
fn outbox_event(order: &Order) -> Option<OrderEvent> {
    let event_type = match order.kind() {
        OrderKind::Pending => EventType::NewOrder,
        OrderKind::Completed => EventType::CompleteOrder,
        OrderKind::Canceled => EventType::CancelOrder,
        OrderKind::Empty | OrderKind::Active | OrderKind::Stocked | OrderKind::Paid => return None,
    };

    Some(OrderEvent {
        event_type,
        order_id: order.id(),
        customer_id: order.customer_id(),
        price: order.price().unwrap_or_default(),
        payment_id: order.payment_id(),
        items: order.items().to_vec(),
    })
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    order_id: Uuid,
    customer_id: Uuid,
    items: Option<Json<Vec<String>>>,
    price: Option<Decimal>,
    payment_id: Option<Uuid>,
    kind: String,
}

impl OrderRow {
    fn from_domain(order: &Order) -> Self {
        let items = match order.kind() {
            OrderKind::Empty => None,
            _ => Some(Json(order.items().to_vec())),
        };

        Self {
            order_id: order.id().as_uuid(),
            customer_id: order.customer_id().as_uuid(),
            items,
            price: order.price(),
            payment_id: order.payment_id().map(|id| id.as_uuid()),
            kind: order.kind().as_str().to_string(),
        }
    }

    fn into_domain(self) -> Result<Order, RepositoryError> {
        let id = OrderId::from_uuid(self.order_id);
        let customer_id = CustomerId::from_uuid(self.customer_id);
        let corrupt = || RepositoryError::CorruptRow {
            order_id: self.order_id,
        };

        let order = match self.kind.as_str() {
            "empty" => Order::Empty { id, customer_id },
            "active" => Order::Active {
                id,
                customer_id,
                items: self.items.map(|Json(items)| items).ok_or_else(corrupt)?,
            },
            "pending" => Order::Pending {
                id,
                customer_id,
                items: self.items.map(|Json(items)| items).ok_or_else(corrupt)?,
                price: self.price.ok_or_else(corrupt)?,
            },
            "stocked" => Order::Stocked {
                id,
                customer_id,
                items: self.items.map(|Json(items)| items).ok_or_else(corrupt)?,
                price: self.price.ok_or_else(corrupt)?,
            },
            "paid" => Order::Paid {
                id,
                customer_id,
                items: self.items.map(|Json(items)| items).ok_or_else(corrupt)?,
                price: self.price.ok_or_else(corrupt)?,
                payment_id: self
                    .payment_id
                    .map(PaymentId::from_uuid)
                    .ok_or_else(corrupt)?,
            },
            "completed" => Order::Completed {
                id,
                customer_id,
                items: self.items.map(|Json(items)| items).ok_or_else(corrupt)?,
                price: self.price.ok_or_else(corrupt)?,
                payment_id: self
                    .payment_id
                    .map(PaymentId::from_uuid)
                    .ok_or_else(corrupt)?,
            },
            "canceled" => Order::Canceled {
                id,
                customer_id,
                items: self.items.map(|Json(items)| items).ok_or_else(corrupt)?,
                price: self.price.ok_or_else(corrupt)?,
            },
            _ => return Err(corrupt()),
        };

        Ok(order)
    }
}
