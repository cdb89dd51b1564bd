// Copyright 2025 Cowboy AI, LLC.

//! Service binary: configuration, logging, store wiring and the HTTP
//! listener.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

use gameday_aggregations::http::{self, AppState, LogLevelHandle};
use gameday_aggregations::store::{ensure_indexes, MemoryStore, Store};
use gameday_aggregations::ServiceConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::parse();
    let log_level = init_logging(&config)?;
    tracing::info!(
        service = config.service_name,
        port = config.port,
        "starting aggregation service"
    );

    // The store contract is adapter-shaped; this binary ships the
    // in-process implementation. An external document-store adapter
    // plugs in here without touching the core.
    tracing::debug!(
        mongo_url = config.mongo_url,
        mongo_db = config.mongo_db,
        "store configuration read"
    );
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());

    ensure_indexes(store.as_ref(), &config.materialised_collection)
        .await
        .context("index bootstrap failed")?;

    let state = AppState::new(store, &config, log_level);
    let addr = SocketAddr::new(config.bind_addr, config.port);
    tracing::info!(%addr, "listening");
    axum::Server::bind(&addr)
        .serve(http::router(state).into_make_service())
        .await
        .context("http server terminated")?;
    Ok(())
}

/// Install the subscriber and hand back a reloadable level handle.
///
/// With `LOG_PATH` set, events are written as JSON lines to the file;
/// otherwise the compact format goes to stderr.
fn init_logging(config: &ServiceConfig) -> anyhow::Result<LogLevelHandle> {
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter_layer, handle) = reload::Layer::<EnvFilter, Registry>::new(filter);

    match &config.log_path {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt::layer().json().with_writer(Arc::new(file)))
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(LogLevelHandle::new(move |level| {
        let filter = EnvFilter::try_new(level).map_err(|e| e.to_string())?;
        handle.reload(filter).map_err(|e| e.to_string())
    }))
}
