use std::sync::Arc;
use std::net::SocketAddr;
use anyhow::Context;
use seatline_api::{app, worker, AppState};
use seatline_core::events::{LoggingNotifier, ReleaseNotifier};
use seatline_core::{Clock, ExpirySweeper, InMemoryStore, SeatingStore};
use seatline_store::app_config::Config;
use seatline_store::{DbClient, PgSeatingStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seatline_api=debug,seatline_core=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Seatline API on port {}", config.server.port);

    let clock: Arc<dyn Clock> = Arc::new(config.seating.clock()?);

    // Postgres when configured, otherwise a process-local store
    let store: Arc<dyn SeatingStore> = match DbClient::from_config(&config.database)
        .await
        .context("Failed to connect to Postgres")?
    {
        Some(db) => {
            db.migrate().await.context("Failed to run migrations")?;
            Arc::new(PgSeatingStore::new(db.pool.clone()))
        }
        None => {
            tracing::warn!("No database.url configured, using in-memory store");
            Arc::new(InMemoryStore::new())
        }
    };

    let notifier = release_notifier(&config)?;
    let sweeper = Arc::new(ExpirySweeper::new(store.clone(), clock.clone(), notifier));
    let sweep_task = worker::start_expiry_worker(sweeper, config.seating.sweep_interval());

    let app_state = AppState::new(store, clock, config.seating.hold_policy());
    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweep_task.abort();
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(feature = "kafka")]
fn release_notifier(config: &Config) -> anyhow::Result<Arc<dyn ReleaseNotifier>> {
    match config.kafka.brokers.as_deref() {
        Some(brokers) => {
            let producer = seatline_store::EventProducer::new(brokers, &config.kafka.release_topic)
                .context("Failed to create Kafka producer")?;
            Ok(Arc::new(producer))
        }
        None => Ok(Arc::new(LoggingNotifier)),
    }
}

#[cfg(not(feature = "kafka"))]
fn release_notifier(config: &Config) -> anyhow::Result<Arc<dyn ReleaseNotifier>> {
    if config.kafka.brokers.is_some() {
        tracing::warn!("kafka.brokers is set but the kafka feature is disabled, logging releases only");
    }
    Ok(Arc::new(LoggingNotifier))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
