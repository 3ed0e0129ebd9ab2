//! PostgreSQL integration tests for the order repository.
//!
//! One shared container for the whole run; each test gets its own database
//! so the outbox log and its cursor start empty.

use std::sync::Arc;

use common::{CustomerId, OrderId};
use order::domain::{Order, OrderCommand, OrderError, OrderKind};
use order::repository::{OrderRepository, RepositoryError};
use schema::{EventType, Fields, OrderEvent};
use sqlx::PgPool;
use stream::EventLog;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    base_url: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            Arc::new(ContainerInfo {
                container,
                base_url: format!("postgres://postgres:postgres@{}:{}", host, port),
            })
        })
        .await
        .clone()
}

/// Creates a migrated throwaway database and returns a pool onto it.
///
/// Tests share the container but not a database, so they can run in
/// parallel without racing on the single-row event cursor.
async fn get_test_pool() -> PgPool {
    let info = get_container_info().await;

    let admin = PgPool::connect(&format!("{}/postgres", info.base_url))
        .await
        .unwrap();
    let database = format!("orders_{}", Uuid::new_v4().simple());
    sqlx::raw_sql(&format!("CREATE DATABASE {database}"))
        .execute(&admin)
        .await
        .unwrap();
    admin.close().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&format!("{}/{}", info.base_url, database))
        .await
        .unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();
    pool
}

async fn pending_order(repo: &OrderRepository) -> (OrderId, Order) {
    let order_id = OrderId::new();
    let customer_id = CustomerId::new();

    repo.persist(order_id, OrderCommand::Create { order_id, customer_id })
        .await
        .unwrap();
    repo.persist(
        order_id,
        OrderCommand::AddItem {
            item: "sku1".to_string(),
        },
    )
    .await
    .unwrap();
    let order = repo.persist(order_id, OrderCommand::Process).await.unwrap();

    (order_id, order)
}

fn decode(fields: Vec<(String, String)>) -> OrderEvent {
    OrderEvent::from_fields(&fields.into_iter().collect::<Fields>()).unwrap()
}

#[tokio::test]
async fn test_persist_commits_state_and_outbox_event_together() {
    let repo = OrderRepository::new(get_test_pool().await);

    let (order_id, order) = pending_order(&repo).await;
    assert_eq!(order.kind(), OrderKind::Pending);

    // The stored row matches the returned state.
    let found = repo.find(order_id).await.unwrap().unwrap();
    assert_eq!(found, order);

    // The same commit appended the saga event.
    let entry = repo.next_event().await.unwrap().unwrap();
    assert_eq!(entry.offset, 1);
    let event = decode(entry.fields);
    assert_eq!(event.event_type, EventType::NewOrder);
    assert_eq!(event.order_id, order_id);
    assert_eq!(event.items, ["sku1"]);
    assert_eq!(event.price, "9.99".parse().unwrap());
}

#[tokio::test]
async fn test_non_saga_states_append_no_event() {
    let repo = OrderRepository::new(get_test_pool().await);
    let order_id = OrderId::new();
    let customer_id = CustomerId::new();

    repo.persist(order_id, OrderCommand::Create { order_id, customer_id })
        .await
        .unwrap();
    repo.persist(
        order_id,
        OrderCommand::AddItem {
            item: "sku1".to_string(),
        },
    )
    .await
    .unwrap();

    // Empty and Active states commit without touching the outbox.
    assert!(repo.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn test_domain_rejection_rolls_back_state_and_outbox() {
    let repo = OrderRepository::new(get_test_pool().await);
    let order_id = OrderId::new();
    let customer_id = CustomerId::new();

    repo.persist(order_id, OrderCommand::Create { order_id, customer_id })
        .await
        .unwrap();

    // Processing an empty order is a domain rejection.
    let err = repo.persist(order_id, OrderCommand::Process).await.unwrap_err();
    assert!(err.is_domain());
    assert!(matches!(
        err,
        RepositoryError::Domain(OrderError::NotActive)
    ));

    // Nothing of the rejected transaction survived.
    let found = repo.find(order_id).await.unwrap().unwrap();
    assert_eq!(found.kind(), OrderKind::Empty);
    assert!(repo.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn test_outbox_ordering_survives_repository_restart() {
    let pool = get_test_pool().await;
    let repo = OrderRepository::new(pool.clone());

    let (order_id, _) = pending_order(&repo).await;
    repo.persist(order_id, OrderCommand::RejectStock)
        .await
        .unwrap();

    // Oldest unpublished event first; the cursor has not moved yet.
    let entry = repo.next_event().await.unwrap().unwrap();
    assert_eq!(entry.offset, 1);
    assert_eq!(decode(entry.fields).event_type, EventType::NewOrder);
    repo.ack(1).await.unwrap();

    // A fresh repository over the same database resumes after the ack.
    let restarted = OrderRepository::new(pool);
    let entry = restarted.next_event().await.unwrap().unwrap();
    assert_eq!(entry.offset, 2);
    assert_eq!(decode(entry.fields).event_type, EventType::CancelOrder);
    restarted.ack(2).await.unwrap();

    assert!(restarted.next_event().await.unwrap().is_none());
}
