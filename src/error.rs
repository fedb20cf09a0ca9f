//! Error types for the retrieval pipeline and the HTTP surface.
//!
//! Pipeline failures never carry structured codes to callers. They are
//! rendered as a fenced JSON block, the same shape the relay uses for
//! upstream error bodies, so a chat client can display either verbatim.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Errors raised while building or forwarding a chat request.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The inbound request could not be interpreted.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The embedding endpoint returned an error payload or a malformed body.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The similarity-search service failed.
    #[error("Similarity search error: {0}")]
    Search(String),

    /// The analysis store rejected an insert.
    #[error("Analysis store error: {0}")]
    Analysis(String),

    /// The configured tokenizer could not be loaded.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Transport failure talking to an upstream service.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database error from the Postgres search backend.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl PipelineError {
    /// Short variant name, rendered as `name` in error blocks.
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::Embedding(_) => "EmbeddingError",
            Self::Search(_) => "SearchError",
            Self::Analysis(_) => "AnalysisError",
            Self::Tokenizer(_) => "TokenizerError",
            Self::Http(_) => "HttpError",
            Self::Json(_) => "JsonError",
            Self::Database(_) => "DatabaseError",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::Json(_) => StatusCode::BAD_REQUEST,
            Self::Embedding(_) | Self::Search(_) | Self::Http(_) => StatusCode::BAD_GATEWAY,
            Self::Analysis(_) | Self::Tokenizer(_) | Self::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Handler-level error wrapper that renders a [`PipelineError`] as a
/// fenced JSON block.
#[derive(Debug)]
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        (status, error_block(&self.0)).into_response()
    }
}

/// Render an error as a ```` ```json ```` block holding `{message, name}`.
pub fn error_block(err: &PipelineError) -> String {
    let payload = serde_json::json!({
        "message": err.to_string(),
        "name": err.name(),
    });
    let pretty = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| err.to_string());
    format!("```json\n{pretty}\n```")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_block_is_fenced_json() {
        let err = PipelineError::Search("connection refused".to_string());
        let block = error_block(&err);

        assert!(block.starts_with("```json\n"));
        assert!(block.ends_with("\n```"));

        let inner = block
            .trim_start_matches("```json\n")
            .trim_end_matches("\n```");
        let v: serde_json::Value = serde_json::from_str(inner).unwrap();
        assert_eq!(v["name"], "SearchError");
        assert_eq!(v["message"], "Similarity search error: connection refused");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            PipelineError::InvalidRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PipelineError::Embedding("x".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
