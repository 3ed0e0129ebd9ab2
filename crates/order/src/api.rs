//! REST surface of the order service.
//!
//! Every mutating endpoint maps 1:1 to an order command and returns the
//! serialized new state. Domain rejections map to 412, unknown orders to
//! 404, infrastructure failures to 500.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use common::{CustomerId, OrderId};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::domain::{Order, OrderCommand};
use crate::error::ApiError;
use crate::repository::OrderRepository;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub repository: OrderRepository,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: Option<String>,
}

#[derive(Deserialize)]
pub struct ItemRequest {
    pub item: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub customer_id: String,
    pub state: String,
    pub items: Vec<String>,
    pub price: Option<String>,
    pub payment_id: Option<String>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.id().to_string(),
            customer_id: order.customer_id().to_string(),
            state: order.kind().to_string(),
            items: order.items().to_vec(),
            price: order.price().map(|p| p.to_string()),
            payment_id: order.payment_id().map(|id| id.to_string()),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(health))
        .route("/orders", post(create))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/items", put(add_item))
        .route("/orders/{id}/items/{item}", delete(remove_item))
        .route("/orders/{id}/process", post(process))
        .with_state(state)
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
}

/// POST /orders — create a new order for a customer.
#[tracing::instrument(skip(state, req))]
async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let customer_id = if let Some(ref raw) = req.customer_id {
        let uuid = uuid::Uuid::parse_str(raw)
            .map_err(|e| ApiError::BadRequest(format!("invalid customer_id: {e}")))?;
        CustomerId::from_uuid(uuid)
    } else {
        CustomerId::new()
    };

    let order_id = OrderId::new();
    let order = state
        .repository
        .persist(
            order_id,
            OrderCommand::Create {
                order_id,
                customer_id,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders/:id — load an order by ID.
#[tracing::instrument(skip(state))]
async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .repository
        .find(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("order {id} not found")))?;

    Ok(Json(order.into()))
}

/// PUT /orders/:id/items — add an item to an open order.
#[tracing::instrument(skip(state, req))]
async fn add_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ItemRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .repository
        .persist(order_id, OrderCommand::AddItem { item: req.item })
        .await?;

    Ok(Json(order.into()))
}

/// DELETE /orders/:id/items/:item — remove an item from an open order.
#[tracing::instrument(skip(state))]
async fn remove_item(
    State(state): State<Arc<AppState>>,
    Path((id, item)): Path<(String, String)>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .repository
        .persist(order_id, OrderCommand::RemoveItem { item })
        .await?;

    Ok(Json(order.into()))
}

/// POST /orders/:id/process — freeze the order and start the saga.
#[tracing::instrument(skip(state))]
async fn process(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .repository
        .persist(order_id, OrderCommand::Process)
        .await?;

    Ok(Json(order.into()))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn metrics(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("invalid order id: {e}")))?;
    Ok(OrderId::from_uuid(uuid))
}
