//! Confirmation-stream handler.
//!
//! Turns payment/stock outcome events into order commands. Acknowledgment
//! policy follows the error class: decode failures and unknown kinds are
//! logged and acked (redelivery cannot fix a malformed entry), domain
//! rejections are acked (the state machine already settled the order), and
//! infrastructure failures propagate so the entry is redelivered.

use async_trait::async_trait;
use common::OrderId;
use schema::{EventType, Fields, PaymentsEvent, SchemaError, StockEvent, event_type_of};
use stream::{HandlerError, MessageHandler};
use tracing::{info, warn};

use crate::domain::OrderCommand;
use crate::repository::{OrderRepository, RepositoryError};

pub struct ConfirmationHandler {
    repository: OrderRepository,
}

impl ConfirmationHandler {
    pub fn new(repository: OrderRepository) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl MessageHandler for ConfirmationHandler {
    async fn handle(&self, fields: &Fields) -> Result<(), HandlerError> {
        let (order_id, command) = match decode(fields) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(error = %err, "dropping undecodable confirmation entry");
                return Ok(());
            }
        };

        match self.repository.persist(order_id, command).await {
            Ok(order) => {
                info!(%order_id, kind = %order.kind(), "confirmation applied");
                Ok(())
            }
            Err(RepositoryError::Domain(err)) => {
                warn!(%order_id, error = %err, "confirmation rejected by order state");
                Ok(())
            }
            Err(err) => Err(HandlerError::new(err)),
        }
    }
}

fn decode(fields: &Fields) -> Result<(OrderId, OrderCommand), SchemaError> {
    match event_type_of(fields)? {
        EventType::PaymentsConfirmed => {
            let event = PaymentsEvent::from_fields(fields)?;
            Ok((
                event.order_id,
                OrderCommand::ConfirmPayment {
                    payment_id: event.payments_id,
                },
            ))
        }
        EventType::PaymentsFailed => {
            let event = PaymentsEvent::from_fields(fields)?;
            Ok((event.order_id, OrderCommand::RejectPayment))
        }
        EventType::StockConfirmed => {
            let event = StockEvent::from_fields(fields)?;
            Ok((event.order_id, OrderCommand::ConfirmStock))
        }
        EventType::StockFailed => {
            let event = StockEvent::from_fields(fields)?;
            Ok((event.order_id, OrderCommand::RejectStock))
        }
        other => Err(SchemaError::UnknownEventType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use common::PaymentId;

    use super::*;

    fn as_map(fields: Vec<(String, String)>) -> Fields {
        fields.into_iter().collect()
    }

    #[test]
    fn test_payment_confirmation_decodes_to_confirm_command() {
        let event = PaymentsEvent {
            event_type: EventType::PaymentsConfirmed,
            order_id: OrderId::new(),
            payments_id: PaymentId::new(),
        };

        let (order_id, command) = decode(&as_map(event.to_fields())).unwrap();
        assert_eq!(order_id, event.order_id);
        assert_eq!(
            command,
            OrderCommand::ConfirmPayment {
                payment_id: event.payments_id
            }
        );
    }

    #[test]
    fn test_payment_failure_decodes_to_reject_command() {
        let event = PaymentsEvent {
            event_type: EventType::PaymentsFailed,
            order_id: OrderId::new(),
            payments_id: PaymentId::new(),
        };

        let (_, command) = decode(&as_map(event.to_fields())).unwrap();
        assert_eq!(command, OrderCommand::RejectPayment);
    }

    #[test]
    fn test_stock_events_decode_to_stock_commands() {
        let order_id = OrderId::new();
        for (event_type, expected) in [
            (EventType::StockConfirmed, OrderCommand::ConfirmStock),
            (EventType::StockFailed, OrderCommand::RejectStock),
        ] {
            let event = StockEvent {
                event_type,
                order_id,
            };
            let (decoded_id, command) = decode(&as_map(event.to_fields())).unwrap();
            assert_eq!(decoded_id, order_id);
            assert_eq!(command, expected);
        }
    }

    #[test]
    fn test_order_stream_kinds_are_rejected_here() {
        let mut fields = Fields::new();
        fields.insert("type".to_string(), "new_order".to_string());

        assert!(decode(&fields).is_err());
    }
}
