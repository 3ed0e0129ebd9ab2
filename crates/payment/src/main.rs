//! Payment service entry point.

use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use payment::api;
use payment::config::Config;
use payment::handler::OrdersHandler;
use payment::repository::PaymentRepository;
use schema::{CONFIRMATION_STREAM, ORDERS_STREAM, PAYMENTS_GROUP};
use stream::{RedisStream, run_consumer, run_producer};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("failed to run migrations");

    let broker = RedisStream::connect(&config.redis_url)
        .await
        .expect("failed to connect to stream broker");
    let repository = PaymentRepository::new(pool);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let consumer = tokio::spawn({
        let broker = broker.clone();
        let handler = OrdersHandler::new(repository.clone());
        let shutdown = shutdown_rx.clone();
        async move { run_consumer(&broker, ORDERS_STREAM, PAYMENTS_GROUP, &handler, shutdown).await }
    });

    let producer = tokio::spawn({
        let broker = broker.clone();
        let repository = repository.clone();
        let shutdown = shutdown_rx.clone();
        let poll_period = config.outbox_poll_period();
        async move {
            run_producer(&broker, &repository, CONFIRMATION_STREAM, poll_period, shutdown).await
        }
    });

    let app = api::create_app(metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting payment service");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    let _ = shutdown_tx.send(true);
    let _ = consumer.await;
    let _ = producer.await;

    tracing::info!("payment service shut down gracefully");
}
