//! Typed wire events and their field-map codecs.

use std::collections::HashMap;

use common::{CustomerId, OrderId, PaymentId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ITEM_SEPARATOR, SchemaError};

/// A stream entry's field map.
pub type Fields = HashMap<String, String>;

/// Discriminator carried in the `type` field of every wire event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    NewOrder,
    CancelOrder,
    CompleteOrder,
    PaymentsConfirmed,
    PaymentsFailed,
    StockConfirmed,
    StockFailed,
}

impl EventType {
    /// Returns the wire representation of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::NewOrder => "new_order",
            EventType::CancelOrder => "cancel_order",
            EventType::CompleteOrder => "complete_order",
            EventType::PaymentsConfirmed => "payments_confirmed",
            EventType::PaymentsFailed => "payments_failed",
            EventType::StockConfirmed => "stock_confirmed",
            EventType::StockFailed => "stock_failed",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new_order" => Ok(EventType::NewOrder),
            "cancel_order" => Ok(EventType::CancelOrder),
            "complete_order" => Ok(EventType::CompleteOrder),
            "payments_confirmed" => Ok(EventType::PaymentsConfirmed),
            "payments_failed" => Ok(EventType::PaymentsFailed),
            "stock_confirmed" => Ok(EventType::StockConfirmed),
            "stock_failed" => Ok(EventType::StockFailed),
            other => Err(SchemaError::UnknownEventType(other.to_string())),
        }
    }
}

/// Reads the `type` discriminator of a raw field map.
///
/// Consumers use this for dispatch before committing to a full decode, so
/// unknown kinds can be dropped with a warning instead of failing the loop.
pub fn event_type_of(fields: &Fields) -> Result<EventType, SchemaError> {
    require(fields, "type")?.parse()
}

/// Event published by the order service on the orders stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<PaymentId>,
    pub items: Vec<String>,
}

impl OrderEvent {
    /// Encodes the event as stream-entry fields.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("type".to_string(), self.event_type.to_string()),
            ("order_id".to_string(), self.order_id.to_string()),
            ("customer_id".to_string(), self.customer_id.to_string()),
            ("price".to_string(), self.price.to_string()),
            ("items".to_string(), self.items.join(ITEM_SEPARATOR)),
        ];
        if let Some(payment_id) = self.payment_id {
            fields.push(("payment_id".to_string(), payment_id.to_string()));
        }
        fields
    }

    /// Decodes stream-entry fields into a typed event.
    pub fn from_fields(fields: &Fields) -> Result<Self, SchemaError> {
        let payment_id = match fields.get("payment_id") {
            Some(raw) => Some(PaymentId::from_uuid(parse_uuid_str(raw, "payment_id")?)),
            None => None,
        };

        Ok(Self {
            event_type: event_type_of(fields)?,
            order_id: OrderId::from_uuid(parse_uuid(fields, "order_id")?),
            customer_id: CustomerId::from_uuid(parse_uuid(fields, "customer_id")?),
            price: parse_decimal(fields, "price")?,
            payment_id,
            items: split_items(require(fields, "items")?),
        })
    }
}

/// Event published by the payment service on the confirmation stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentsEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub order_id: OrderId,
    pub payments_id: PaymentId,
}

impl PaymentsEvent {
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("type".to_string(), self.event_type.to_string()),
            ("order_id".to_string(), self.order_id.to_string()),
            ("payments_id".to_string(), self.payments_id.to_string()),
        ]
    }

    pub fn from_fields(fields: &Fields) -> Result<Self, SchemaError> {
        Ok(Self {
            event_type: event_type_of(fields)?,
            order_id: OrderId::from_uuid(parse_uuid(fields, "order_id")?),
            payments_id: PaymentId::from_uuid(parse_uuid(fields, "payments_id")?),
        })
    }
}

/// Event published by the stock service on the confirmation stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub order_id: OrderId,
}

impl StockEvent {
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("type".to_string(), self.event_type.to_string()),
            ("order_id".to_string(), self.order_id.to_string()),
        ]
    }

    pub fn from_fields(fields: &Fields) -> Result<Self, SchemaError> {
        Ok(Self {
            event_type: event_type_of(fields)?,
            order_id: OrderId::from_uuid(parse_uuid(fields, "order_id")?),
        })
    }
}

fn require<'a>(fields: &'a Fields, name: &'static str) -> Result<&'a str, SchemaError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or(SchemaError::MissingField(name))
}

fn parse_uuid(fields: &Fields, name: &'static str) -> Result<Uuid, SchemaError> {
    parse_uuid_str(require(fields, name)?, name)
}

fn parse_uuid_str(raw: &str, field: &'static str) -> Result<Uuid, SchemaError> {
    raw.parse()
        .map_err(|source| SchemaError::InvalidUuid { field, source })
}

fn parse_decimal(fields: &Fields, name: &'static str) -> Result<Decimal, SchemaError> {
    require(fields, name)?
        .parse()
        .map_err(|source| SchemaError::InvalidAmount {
            field: name,
            source,
        })
}

fn split_items(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(ITEM_SEPARATOR).map(str::to_string).collect()
}
