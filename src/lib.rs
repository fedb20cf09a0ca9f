//! Retrieval-augmented chat relay.
//!
//! Sits between a chat client and an OpenAI-compatible provider. Queries
//! that start with a trigger word are answered from a document store: the
//! question is embedded, matched against stored documents and rewritten into
//! a context-bearing prompt. Completions are streamed back as plain text.
//!
//! # Architecture
//!
//! - **Server**: Axum HTTP surface with a plain-text streaming response
//! - **LLM**: path-forwarding proxy, embedding client, stream relay
//! - **RAG**: similarity search, context assembly, message chain building
//!
//! # Modules
//!
//! - [`api`]: routes and middleware
//! - [`config`]: layered configuration
//! - [`error`]: pipeline errors and their HTTP rendering
//! - [`llm`]: provider-facing types and clients
//! - [`rag`]: retrieval-augmented prompt construction
//! - [`server`]: state wiring and startup
//! - [`telemetry`]: logging setup

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod api;
pub mod config;
pub mod error;
pub mod llm;
pub mod rag;
pub mod server;
pub mod telemetry;

use crate::api::rate_limit::SimpleRateLimiter;
use crate::config::AppConfig;
use crate::llm::CompletionProxy;
use crate::rag::{AnalysisStore, MessageChainBuilder};
use std::sync::Arc;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Forwards requests to the provider.
    pub proxy: CompletionProxy,
    /// Turns a session into the message chain sent upstream.
    pub chain: Arc<MessageChainBuilder>,
    /// Analysis record sink.
    pub analysis: Arc<dyn AnalysisStore>,
    /// Global Rate Limiter
    pub rate_limiter: Arc<SimpleRateLimiter>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}
