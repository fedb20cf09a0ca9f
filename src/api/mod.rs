//! HTTP surface.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `POST /api/chat-stream` | Build the chain, forward it, relay text |
//! | `POST /api/chat-message` | Return the built chain as JSON |
//! | `ANY /api/openai` | Raw provider proxy, caller's method kept |
//! | `POST /api/analysis` | Store a question/answer pair |
//! | `GET /api/health` | Liveness |

pub mod rate_limit;
pub mod routes;

use axum::{
    Router,
    routing::{any, get, post},
};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/chat-stream", post(routes::chat_stream))
        .route("/api/chat-message", post(routes::chat_message))
        .route("/api/openai", any(routes::openai_proxy))
        .route("/api/analysis", post(routes::analysis))
        .route("/api/health", get(routes::health))
}
