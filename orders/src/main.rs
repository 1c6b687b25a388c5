//! Order processing HTTP server.
//!
//! Event ingress, rule-based fan-out to the order handlers and audit log,
//! and a query API over the order projection.

use anyhow::Context;
use axum::{routing::get, Router};
use orderbus_core::environment::SystemClock;
use orderbus_core::projection::OrderStore;
use orderbus_orders::{audit::TracingAuditSink, build_state, config::Config, server::build_router};
use orderbus_projections::{InMemoryOrderStore, PostgresOrderStore};
use orderbus_runtime::metrics::MetricsServer;
use orderbus_runtime::EventRouter;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_new(&config.server.log_level)
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting order service");
    config.validate().context("Invalid configuration")?;
    info!(
        table = %config.store.table_name,
        store = if config.store.database_url.is_some() { "postgres" } else { "memory" },
        bus = %config.events.bus_name,
        max_attempts = config.retry.max_attempts,
        "Configuration loaded"
    );

    start_metrics(&config).await?;

    let store = connect_store(&config).await?;
    let state = build_state(
        &config,
        store,
        Arc::new(TracingAuditSink),
        Arc::new(SystemClock),
    )?;
    let router = state.router.clone();
    let app = build_router(state);

    let addr = config.server_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, "Server listening");

    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    let mut server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.changed().await;
            })
            .into_future(),
    );

    tokio::select! {
        result = &mut server => {
            result.context("Server task failed")??;
            info!("Server stopped");
            drain_router(&router, config.shutdown_timeout()).await;
            return Ok(());
        }
        () = shutdown_signal() => {}
    }

    let stopping = Instant::now();
    let _ = stop_tx.send(true);
    match tokio::time::timeout(config.shutdown_timeout(), server).await {
        Ok(result) => {
            result.context("Server task failed")??;
            info!("Server stopped");
        }
        Err(_) => warn!(
            timeout_secs = config.server.shutdown_timeout,
            "Graceful shutdown timed out, abandoning open connections"
        ),
    }

    // Connections and dispatches share one grace period.
    drain_router(&router, config.shutdown_timeout().saturating_sub(stopping.elapsed())).await;
    Ok(())
}

/// Let accepted envelopes finish routing before the runtime goes away.
async fn drain_router(router: &EventRouter, timeout: Duration) {
    if let Err(e) = router.shutdown(timeout).await {
        warn!(
            error = %e,
            dead_letters = router.dead_letters().len(),
            "Abandoning envelopes still routing"
        );
    }
}

async fn connect_store(config: &Config) -> anyhow::Result<Arc<dyn OrderStore>> {
    let Some(url) = &config.store.database_url else {
        info!("No DATABASE_URL set, keeping orders in memory");
        return Ok(Arc::new(InMemoryOrderStore::new()));
    };

    info!(table = %config.store.table_name, "Connecting to order database...");
    let store = PostgresOrderStore::connect(
        url,
        config.store.table_name.as_str(),
        config.store.max_connections,
    )
    .await
    .context("Failed to connect to order database")?;
    store.migrate().await.context("Failed to migrate order table")?;
    info!("Order database connected");

    Ok(Arc::new(store))
}

/// Install the Prometheus recorder and serve `/metrics` on its own address.
async fn start_metrics(config: &Config) -> anyhow::Result<()> {
    let mut metrics = MetricsServer::new(config.metrics_addr()?);
    metrics.start()?;

    let Some(handle) = metrics.handle().cloned() else {
        warn!("Metrics recorder owned elsewhere, /metrics not served");
        return Ok(());
    };

    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );
    let listener = tokio::net::TcpListener::bind(metrics.addr())
        .await
        .with_context(|| format!("Failed to bind metrics address {}", metrics.addr()))?;
    info!(address = %metrics.addr(), "Metrics endpoint listening");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Metrics server stopped");
        }
    });

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
