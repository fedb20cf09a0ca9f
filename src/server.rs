use axum::{Router, extract::DefaultBodyLimit};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::AppState;
use crate::api::{self, rate_limit::SimpleRateLimiter};
use crate::config::{AppConfig, SearchBackend};
use crate::llm::{CompletionProxy, Embedder, OpenAiEmbedder};
use crate::rag::{
    AnalysisStore, BpeTokenCounter, ContextAssembler, DisabledAnalysis, DisabledSearch,
    DocumentSearch, MessageChainBuilder, PostgresAnalysisStore, PostgresSearch, SupabaseAnalysisStore,
    SupabaseSearch,
};

/// Wire up clients and the chain builder from configuration.
pub fn build_state(config: Arc<AppConfig>) -> anyhow::Result<AppState> {
    let http = reqwest::Client::builder().build()?;

    let upstream = config.upstream_settings();
    info!(
        name: "upstream.config.loaded",
        base_url = %upstream.base_url(),
        embedding_model = %upstream.embedding_model,
        has_default_credential = upstream.default_credential.is_some(),
        "Upstream configuration loaded"
    );
    let proxy = CompletionProxy::with_client(http.clone(), upstream);
    let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::new(proxy.clone()));

    let table = config.search.analysis_table.as_str();
    let search: Arc<dyn DocumentSearch>;
    let analysis: Arc<dyn AnalysisStore>;
    match config.search_backend()? {
        SearchBackend::Supabase { url, key } => {
            let client = SupabaseSearch::new(http.clone(), &url, key);
            analysis = Arc::new(SupabaseAnalysisStore::new(client.clone(), table));
            search = Arc::new(client);
        }
        SearchBackend::Postgres { database_url } => {
            let client = PostgresSearch::connect_lazy(&database_url)?;
            analysis = Arc::new(PostgresAnalysisStore::new(client.pool().clone(), table)?);
            search = Arc::new(client);
        }
        SearchBackend::Disabled => {
            tracing::warn!(
                name: "search.disabled",
                "No document store configured; augmented queries will fail"
            );
            analysis = Arc::new(DisabledAnalysis);
            search = Arc::new(DisabledSearch);
        }
    }
    info!(
        name: "search.config.loaded",
        backend = search.backend_name(),
        "Similarity search backend selected"
    );

    let retrieval = config.retrieval_settings();
    let counter = BpeTokenCounter::from_encoding(&retrieval.tokenizer)?;
    let assembler = ContextAssembler::new(Arc::new(counter), retrieval.context_token_budget);
    let chain = Arc::new(MessageChainBuilder::new(
        embedder, search, assembler, retrieval,
    ));

    let rate_limiter = Arc::new(SimpleRateLimiter::new(
        config.resilience.requests_per_second,
        config.resilience.burst_size,
    ));

    Ok(AppState {
        proxy,
        chain,
        analysis,
        rate_limiter,
        config,
    })
}

/// Routes plus middleware.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.resilience.body_limit_bytes;

    api::router()
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            api::rate_limit::rate_limit_middleware,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let state = build_state(config.clone())?;
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
