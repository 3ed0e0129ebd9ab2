//! Stock service entry point.

use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use schema::{ORDERS_STREAM, STOCK_GROUP};
use stock::api;
use stock::config::Config;
use stock::domain::ItemLimitPolicy;
use stock::handler::OrdersHandler;
use stream::{RedisStream, run_consumer};

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

    let broker = RedisStream::connect(&config.redis_url)
        .await
        .expect("failed to connect to stream broker");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let consumer = tokio::spawn({
        let broker = broker.clone();
        let policy = ItemLimitPolicy {
            max_items: config.max_items,
        };
        let handler = OrdersHandler::new(broker.clone(), policy);
        let shutdown = shutdown_rx.clone();
        async move { run_consumer(&broker, ORDERS_STREAM, STOCK_GROUP, &handler, shutdown).await }
    });

    let app = api::create_app(metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting stock service");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    let _ = shutdown_tx.send(true);
    let _ = consumer.await;

    tracing::info!("stock service shut down gracefully");
}
