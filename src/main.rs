//! Retrieval-augmented chat relay server.

#![allow(clippy::unused_async)]

use mimalloc::MiMalloc;
use std::sync::Arc;

use rag_chat_relay::{config::AppConfig, server, telemetry};

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present) before reading configuration
    let _ = dotenvy::dotenv();

    let config = AppConfig::load()?;
    telemetry::init(config.logging.json);

    tracing::info!(
        name: "config.loaded",
        host = %config.server.host,
        port = config.server.port,
        search_provider = %config.search.provider,
        rate_limit_enabled = config.resilience.rate_limit_enabled,
        "Configuration loaded"
    );

    server::start_server(Arc::new(config)).await
}
