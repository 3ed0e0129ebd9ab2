//! Orders-stream handler.
//!
//! Decides stock for each new order and replies on the confirmation stream
//! before acknowledging, so a crash between reply and ack redelivers the
//! order and at worst duplicates the reply. Completed and canceled orders
//! need no reply; a cancellation just releases the decision.

use async_trait::async_trait;
use schema::{
    CONFIRMATION_STREAM, EventType, Fields, OrderEvent, SchemaError, StockEvent, event_type_of,
};
use stream::{HandlerError, MessageHandler, MessageStream};
use tracing::{debug, info, warn};

use crate::domain::{ReservationPolicy, Stock};

pub struct OrdersHandler<S, P> {
    broker: S,
    policy: P,
}

impl<S, P> OrdersHandler<S, P> {
    pub fn new(broker: S, policy: P) -> Self {
        Self { broker, policy }
    }
}

#[async_trait]
impl<S, P> MessageHandler for OrdersHandler<S, P>
where
    S: MessageStream,
    P: ReservationPolicy,
{
    async fn handle(&self, fields: &Fields) -> Result<(), HandlerError> {
        let stock = match decide(fields, &self.policy) {
            Ok(Some(stock)) => stock,
            Ok(None) => return Ok(()),
            Err(err) => {
                warn!(error = %err, "dropping undecodable order entry");
                return Ok(());
            }
        };

        let Some(reply) = confirmation_event(&stock) else {
            info!(order_id = %stock.order_id(), "stock reservation released");
            return Ok(());
        };

        self.broker
            .publish(CONFIRMATION_STREAM, &reply.to_fields())
            .await
            .map_err(HandlerError::new)?;

        info!(order_id = %reply.order_id, kind = %reply.event_type, "stock decision published");
        Ok(())
    }
}

fn decide<P: ReservationPolicy>(
    fields: &Fields,
    policy: &P,
) -> Result<Option<Stock>, SchemaError> {
    match event_type_of(fields)? {
        EventType::NewOrder => {
            let event = OrderEvent::from_fields(fields)?;
            Ok(Some(policy.decide(event.order_id, event.items)))
        }
        EventType::CancelOrder => {
            let event = OrderEvent::from_fields(fields)?;
            Ok(Some(Stock::cancel(event.order_id)))
        }
        EventType::CompleteOrder => {
            debug!("completed order needs no stock decision");
            Ok(None)
        }
        other => Err(SchemaError::UnknownEventType(other.to_string())),
    }
}

fn confirmation_event(stock: &Stock) -> Option<StockEvent> {
    match stock {
        Stock::Active { order_id, .. } => Some(StockEvent {
            event_type: EventType::StockConfirmed,
            order_id: *order_id,
        }),
        Stock::Rejected { order_id } => Some(StockEvent {
            event_type: EventType::StockFailed,
            order_id: *order_id,
        }),
        Stock::Canceled { .. } => None,
    }
}
