//! Similarity search over the document store.
//!
//! The store exposes a `match_documents(query_embedding,
//! similarity_threshold, match_count)` function returning ranked rows with
//! `content` and `url`. It is reached either through Supabase's REST RPC
//! endpoint or directly over a Postgres connection.

use async_trait::async_trait;
use pgvector::Vector;
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use crate::error::{PipelineError, Result};

use super::Document;

/// Name of the remote procedure.
pub const MATCH_DOCUMENTS: &str = "match_documents";

/// Search parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    /// Minimum similarity for a match.
    pub similarity_threshold: f32,
    /// Maximum number of matches.
    pub match_count: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.1,
            match_count: 5,
        }
    }
}

/// Ranked document lookup by embedding.
#[async_trait]
pub trait DocumentSearch: Send + Sync + std::fmt::Debug {
    /// Documents most similar to `embedding`, best first.
    async fn match_documents(&self, embedding: &[f32], params: SearchParams)
    -> Result<Vec<Document>>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}

#[derive(Debug, Serialize)]
struct MatchDocumentsArgs<'a> {
    query_embedding: &'a [f32],
    similarity_threshold: f32,
    match_count: usize,
}

/// `match_documents` through Supabase's PostgREST RPC endpoint.
#[derive(Clone)]
pub struct SupabaseSearch {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for SupabaseSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseSearch")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl SupabaseSearch {
    /// Create a client for the project at `base_url` using a service key.
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Base URL of the Supabase project.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// A request against `{base}/rest/v1/{path}` with Supabase auth headers.
    pub(crate) fn rest(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}/rest/v1/{path}", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

#[async_trait]
impl DocumentSearch for SupabaseSearch {
    async fn match_documents(
        &self,
        embedding: &[f32],
        params: SearchParams,
    ) -> Result<Vec<Document>> {
        let args = MatchDocumentsArgs {
            query_embedding: embedding,
            similarity_threshold: params.similarity_threshold,
            match_count: params.match_count,
        };

        let resp = self
            .rest(&format!("rpc/{MATCH_DOCUMENTS}"))
            .json(&args)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Search(format!("{status}: {body}")));
        }

        let documents: Vec<Document> = resp
            .json()
            .await
            .map_err(|e| PipelineError::Search(format!("malformed rows: {e}")))?;
        Ok(documents)
    }

    fn backend_name(&self) -> &'static str {
        "supabase"
    }
}

/// `match_documents` called directly over Postgres.
#[derive(Debug, Clone)]
pub struct PostgresSearch {
    pool: PgPool,
}

impl PostgresSearch {
    /// Create a search client over a lazily-connected pool.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)?;
        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DocumentSearch for PostgresSearch {
    async fn match_documents(
        &self,
        embedding: &[f32],
        params: SearchParams,
    ) -> Result<Vec<Document>> {
        let query_vector = Vector::from(embedding.to_vec());
        let match_count = i32::try_from(params.match_count).unwrap_or(i32::MAX);

        let rows = sqlx::query(
            r"
            SELECT content, url
            FROM match_documents($1, $2, $3)
            ",
        )
        .bind(query_vector)
        .bind(f64::from(params.similarity_threshold))
        .bind(match_count)
        .fetch_all(&self.pool)
        .await?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            documents.push(Document {
                content: row.try_get("content")?,
                url: row.try_get("url")?,
            });
        }
        Ok(documents)
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

/// Stand-in when no document store is configured; every search fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSearch;

#[async_trait]
impl DocumentSearch for DisabledSearch {
    async fn match_documents(
        &self,
        _embedding: &[f32],
        _params: SearchParams,
    ) -> Result<Vec<Document>> {
        Err(PipelineError::Search(
            "no document store configured".to_string(),
        ))
    }

    fn backend_name(&self) -> &'static str {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_search_fails() {
        let err = DisabledSearch
            .match_documents(&[0.0], SearchParams::default())
            .await
            .unwrap_err();
        assert_eq!(err.name(), "SearchError");
    }

    #[test]
    fn test_rpc_args_wire_format() {
        let args = MatchDocumentsArgs {
            query_embedding: &[0.5, 0.25],
            similarity_threshold: 0.1,
            match_count: 5,
        };
        let v = serde_json::to_value(&args).unwrap();
        assert_eq!(v["query_embedding"], serde_json::json!([0.5, 0.25]));
        assert_eq!(v["match_count"], 5);
        assert!((v["similarity_threshold"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_supabase_trims_base_url() {
        let search = SupabaseSearch::new(reqwest::Client::new(), "https://x.supabase.co/", "key");
        assert_eq!(search.base_url(), "https://x.supabase.co");
        assert!(!format!("{search:?}").contains("key"));
    }

    #[tokio::test]
    async fn test_postgres_pool_is_lazy() {
        let search = PostgresSearch::connect_lazy("postgres://user:pw@127.0.0.1:1/db").unwrap();
        assert_eq!(search.backend_name(), "postgres");
        assert_eq!(search.pool().size(), 0);
    }
}
