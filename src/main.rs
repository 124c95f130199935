//! chat-relay server entry point.
//!
//! Connects the storage collaborator and the pub/sub bus, starts the hub
//! and serves the WebSocket endpoint.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use chat_relay::api;
use chat_relay::app_state::AppState;
use chat_relay::auth::JwtVerifier;
use chat_relay::bus::{MemoryBus, MessageBus, RedisBus};
use chat_relay::config::{BusBackend, LogFormat, RelayConfig};
use chat_relay::hub::Hub;
use chat_relay::persistence::{ChatStore, MemoryStore, PostgresStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = RelayConfig::from_env()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting chat-relay");

    // Storage collaborator
    let store: Arc<dyn ChatStore> = if config.persistence_enabled {
        let store = PostgresStore::connect(&config)
            .await
            .context("connecting to postgres")?;
        if config.database_run_migrations {
            store.run_migrations().await.context("running migrations")?;
        }
        Arc::new(store)
    } else {
        tracing::warn!("persistence disabled, messages are kept in memory only");
        Arc::new(MemoryStore::new())
    };

    // Pub/sub bus; a relay that cannot reach its peers must not serve.
    let bus: Arc<dyn MessageBus> = match config.bus_backend {
        BusBackend::Redis => Arc::new(
            RedisBus::connect(
                &config.redis_url,
                Duration::from_secs(config.bus_connect_timeout_secs),
            )
            .await
            .context("connecting to redis bus")?,
        ),
        BusBackend::Memory => {
            tracing::warn!("in-memory bus selected, this instance will not share rooms with peers");
            Arc::new(MemoryBus::default())
        }
    };

    // Hub
    let hub = Hub::start(config.hub_config(), Arc::clone(&store), bus)
        .await
        .context("starting hub")?;

    let app_state = AppState {
        hub,
        store,
        verifier: Arc::new(JwtVerifier::new(config.jwt_secret.as_bytes())),
        history_limit: config.history_limit,
    };

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, api::build_router(app_state)).await?;

    Ok(())
}
