// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::error::Error;
use std::net::SocketAddr;

use memory_capsule_server::{
    api::router,
    config::{AppConfig, LOG_FORMAT_ENV},
    providers::{github::GitHubClient, gmail::GmailClient},
    state::AppState,
    storage::KvStore,
    unlock_job::UnlockScheduler,
};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var(LOG_FORMAT_ENV).is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown requested");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let config = AppConfig::from_env()?;
    std::fs::create_dir_all(&config.data_dir)?;
    let kv = KvStore::open(&config.kv_path())?;
    info!(path = %config.kv_path().display(), "Opened key-value store");

    let github = GitHubClient::from_config(&config)?;
    let gmail = GmailClient::from_config(&config)?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let poll_interval = config.unlock_poll_interval;
    let state = AppState::new(config, kv, github, gmail);

    let shutdown = CancellationToken::new();
    let scheduler = poll_interval.map(|interval| {
        info!(interval_secs = interval.as_secs(), "In-process unlock scheduler enabled");
        tokio::spawn(UnlockScheduler::new(state.clone(), interval).run(shutdown.clone()))
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Memory Time Capsule API listening (docs at /docs)");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Some(handle) = scheduler {
        handle.await?;
    }
    info!("Server stopped");
    Ok(())
}
