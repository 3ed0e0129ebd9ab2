//! Orders-stream handler.
//!
//! Turns order lifecycle events into payment commands: a new order reserves
//! its price, a completed order settles the reservation, a canceled order
//! releases or refunds it.

use async_trait::async_trait;
use common::CustomerId;
use schema::{EventType, Fields, OrderEvent, SchemaError, event_type_of};
use stream::{HandlerError, MessageHandler};
use tracing::{info, warn};

use crate::domain::PaymentCommand;
use crate::repository::{PaymentRepository, RepositoryError};

pub struct OrdersHandler {
    repository: PaymentRepository,
}

impl OrdersHandler {
    pub fn new(repository: PaymentRepository) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl MessageHandler for OrdersHandler {
    async fn handle(&self, fields: &Fields) -> Result<(), HandlerError> {
        let (customer_id, command) = match decode(fields) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(error = %err, "dropping undecodable order entry");
                return Ok(());
            }
        };

        match self.repository.persist_transaction(customer_id, command).await {
            Ok(payment) => {
                info!(%customer_id, status = %payment.status(), "order event applied to payment");
                Ok(())
            }
            Err(RepositoryError::Domain(err)) => {
                warn!(%customer_id, error = %err, "order event rejected by payment state");
                Ok(())
            }
            Err(err) => Err(HandlerError::new(err)),
        }
    }
}

fn decode(fields: &Fields) -> Result<(CustomerId, PaymentCommand), SchemaError> {
    let event = match event_type_of(fields)? {
        EventType::NewOrder | EventType::CompleteOrder | EventType::CancelOrder => {
            OrderEvent::from_fields(fields)?
        }
        other => return Err(SchemaError::UnknownEventType(other.to_string())),
    };

    let command = match event.event_type {
        EventType::NewOrder => PaymentCommand::Reserve {
            order_id: event.order_id,
            amount: event.price,
        },
        EventType::CompleteOrder => {
            let payment_id = event
                .payment_id
                .ok_or(SchemaError::MissingField("payment_id"))?;
            PaymentCommand::Complete { payment_id }
        }
        EventType::CancelOrder => PaymentCommand::Cancel {
            payment_id: event.payment_id,
            order_id: event.order_id,
        },
        _ => unreachable!("filtered above"),
    };

    Ok((event.customer_id, command))
}
