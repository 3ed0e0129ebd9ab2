//! Shared wire contract between the order, payment and stock services.
//!
//! Every event travels as a flat string-keyed field map (the natural shape
//! of a stream entry) with a `type` discriminator. The typed structs here
//! convert to and from that map losslessly for the fields each event type
//! declares, so producers and consumers never touch raw maps directly.

mod error;
mod events;

pub use error::SchemaError;
pub use events::{EventType, Fields, OrderEvent, PaymentsEvent, StockEvent, event_type_of};

/// Stream carrying command events from the order service to payment and stock.
pub const ORDERS_STREAM: &str = "orders_stream";

/// Stream carrying confirmations/rejections back to the order service.
pub const CONFIRMATION_STREAM: &str = "confirmation_stream";

/// Consumer group of the order service on the confirmation stream.
pub const ORDERS_GROUP: &str = "orders_group";

/// Consumer group of the payment service on the orders stream.
pub const PAYMENTS_GROUP: &str = "payments_group";

/// Consumer group of the stock service on the orders stream.
pub const STOCK_GROUP: &str = "stock_group";

/// Canonical separator for the `items` wire field.
///
/// The list is carried as a single delimiter-joined string; both join and
/// split must use this constant.
pub const ITEM_SEPARATOR: &str = ",";
