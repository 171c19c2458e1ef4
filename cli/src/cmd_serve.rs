//! `chainrelay serve`: wire config, broker, pool and bridge, then run axum
//! until Ctrl-C. The ledger side is `MemoryConnector`.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use chainrelay_core::{BridgeConfig, BrokerClient, ConnectionPool, EventForwarder, SubscriptionBridge};
use chainrelay_memory::MemoryConnector;
use chainrelay_server::{build_router, init_tracing, AppState, ChainCatalog, RelayConfig};

pub async fn run(config_path: &Path) -> Result<()> {
    let config = RelayConfig::load(config_path)?;
    init_tracing(&config.logging);
    tracing::info!(config = %config_path.display(), port = config.server.port, "starting chainrelay");

    let broker = config.mq.build_broker();
    broker.start().await.context("start broker")?;
    tracing::info!(broker = broker.name(), topic = %config.mq.topic, "broker started");

    let connector = Arc::new(MemoryConnector::new(config.subscription.channel_capacity));
    tracing::warn!("ledger backend is in-memory: no network peers are contacted");
    let pool = Arc::new(ConnectionPool::new(connector));
    let bridge = Arc::new(SubscriptionBridge::new(
        Arc::clone(&pool),
        EventForwarder::new(Arc::clone(&broker), config.mq.topic.clone()),
        BridgeConfig { join_timeout: config.join_timeout() },
    ));

    let catalog = Arc::new(ChainCatalog::load(&config.fabric)?);
    catalog.connect_all(&bridge).await.context("connect configured chains")?;
    tracing::info!(chains = catalog.len(), "chain catalog ready");

    let background = CancellationToken::new();
    let sweeper = config
        .pool
        .idle_ttl()
        .map(|ttl| pool.spawn_sweeper(ttl, config.pool.sweep_interval(), background.child_token()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(%addr, "listening");

    let app = build_router(AppState::new(Arc::clone(&bridge), catalog));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    tracing::info!("shutting down");
    background.cancel();
    if let Some(handle) = sweeper {
        let _ = handle.await;
    }
    if tokio::time::timeout(config.shutdown_timeout(), bridge.shutdown()).await.is_err() {
        tracing::warn!(timeout = ?config.shutdown_timeout(), "subscriptions did not stop in time");
    }
    if let Err(e) = broker.stop().await {
        tracing::warn!(error = %e, "broker stop failed");
    }
    tracing::info!("stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "ctrl-c handler failed");
    }
}
