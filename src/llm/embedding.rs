//! Embedding client.
//!
//! Turns a query string into a vector by calling the provider's
//! embeddings endpoint through the [`CompletionProxy`].

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{PipelineError, Result};

use super::proxy::{CompletionProxy, ProxyRequest};
use super::upstream::{ApiCredential, EMBEDDINGS_PATH};

/// Produces an embedding vector for a piece of text.
#[async_trait]
pub trait Embedder: Send + Sync + std::fmt::Debug {
    /// Embed `input` on behalf of the holder of `credential`.
    async fn embed(&self, input: &str, credential: Option<&ApiCredential>) -> Result<Vec<f32>>;
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Embedder for OpenAI-compatible `/v1/embeddings` endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    proxy: CompletionProxy,
    model: String,
}

impl OpenAiEmbedder {
    /// Create an embedder that uses the proxy's configured embedding model.
    #[must_use]
    pub fn new(proxy: CompletionProxy) -> Self {
        let model = proxy.settings().embedding_model.clone();
        Self { proxy, model }
    }
}

/// Embedding models do better on single-line input.
pub fn normalize_input(input: &str) -> String {
    input.replace('\n', " ")
}

fn parse_embedding(body: &[u8]) -> Result<Vec<f32>> {
    let parsed: EmbeddingResponse = serde_json::from_slice(body)
        .map_err(|e| PipelineError::Embedding(format!("malformed response: {e}")))?;

    if let Some(err) = parsed.error {
        return Err(PipelineError::Embedding(err.to_string()));
    }

    parsed
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| PipelineError::Embedding("response has no data[0].embedding".to_string()))
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, input: &str, credential: Option<&ApiCredential>) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "input": normalize_input(input),
            "model": self.model,
        });
        let req = ProxyRequest::post_json(EMBEDDINGS_PATH, credential.cloned(), &body)?;

        let resp = self.proxy.forward(req).await?;
        let bytes = resp.bytes().await?;

        let embedding = parse_embedding(&bytes).inspect_err(|e| {
            tracing::error!(name: "rag.embedding.failed", error = %e, "Embedding request failed");
        })?;

        tracing::debug!(dimensions = embedding.len(), "Received query embedding");
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newlines_become_spaces() {
        assert_eq!(normalize_input("what is\nX?\n"), "what is X? ");
    }

    #[test]
    fn test_parse_first_embedding() {
        let body = br#"{"data":[{"embedding":[0.5,-0.25]},{"embedding":[9.0]}],"model":"m"}"#;
        assert_eq!(parse_embedding(body).unwrap(), vec![0.5, -0.25]);
    }

    #[test]
    fn test_error_payload_fails() {
        let body = br#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        let err = parse_embedding(body).unwrap_err();
        assert!(matches!(err, PipelineError::Embedding(ref m) if m.contains("Incorrect API key")));
    }

    #[test]
    fn test_missing_data_fails() {
        assert!(matches!(
            parse_embedding(br#"{"data":[]}"#),
            Err(PipelineError::Embedding(_))
        ));
        assert!(matches!(
            parse_embedding(b"<html>bad gateway</html>"),
            Err(PipelineError::Embedding(_))
        ));
    }
}
