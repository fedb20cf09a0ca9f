//! Insert-only store for question/answer pairs kept for later review.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;

use crate::error::{PipelineError, Result};

use super::search::SupabaseSearch;

/// Default table for analysis records.
pub const DEFAULT_ANALYSIS_TABLE: &str = "documents_v2_analysis";

/// Record type for a chat question and the bot's answer.
pub const CHAT_ANALYSIS_TYPE: i32 = 1;

/// One analysis row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// The user's question.
    pub question: String,
    /// The assistant's answer.
    pub answer: String,
    /// Record kind.
    #[serde(rename = "type")]
    pub kind: i32,
}

/// Persists analysis records.
#[async_trait]
pub trait AnalysisStore: Send + Sync + std::fmt::Debug {
    /// Insert one record.
    async fn record(&self, record: &AnalysisRecord) -> Result<()>;
}

/// Inserts through Supabase's REST table endpoint.
#[derive(Debug, Clone)]
pub struct SupabaseAnalysisStore {
    client: SupabaseSearch,
    table: String,
}

impl SupabaseAnalysisStore {
    /// Reuse a Supabase client for inserts into `table`.
    #[must_use]
    pub fn new(client: SupabaseSearch, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl AnalysisStore for SupabaseAnalysisStore {
    async fn record(&self, record: &AnalysisRecord) -> Result<()> {
        let resp = self
            .client
            .rest(&self.table)
            .header("Prefer", "return=minimal")
            .json(record)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Analysis(format!("{status}: {body}")));
        }
        Ok(())
    }
}

/// Inserts directly over Postgres.
#[derive(Debug, Clone)]
pub struct PostgresAnalysisStore {
    pool: PgPool,
    insert_sql: String,
}

impl PostgresAnalysisStore {
    /// Insert into `table` using `pool`.
    ///
    /// `table` comes from configuration and must be a plain identifier.
    pub fn new(pool: PgPool, table: &str) -> Result<Self> {
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(PipelineError::Analysis(format!(
                "invalid table name: {table}"
            )));
        }
        Ok(Self {
            pool,
            insert_sql: format!("INSERT INTO {table} (question, answer, type) VALUES ($1, $2, $3)"),
        })
    }
}

#[async_trait]
impl AnalysisStore for PostgresAnalysisStore {
    async fn record(&self, record: &AnalysisRecord) -> Result<()> {
        sqlx::query(&self.insert_sql)
            .bind(&record.question)
            .bind(&record.answer)
            .bind(record.kind)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Stand-in when no document store is configured; every insert fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledAnalysis;

#[async_trait]
impl AnalysisStore for DisabledAnalysis {
    async fn record(&self, _record: &AnalysisRecord) -> Result<()> {
        Err(PipelineError::Analysis(
            "no document store configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    #[tokio::test]
    async fn test_disabled_analysis_rejects_records() {
        let record = AnalysisRecord {
            question: "q".to_string(),
            answer: "a".to_string(),
            kind: CHAT_ANALYSIS_TYPE,
        };
        assert!(matches!(
            DisabledAnalysis.record(&record).await,
            Err(PipelineError::Analysis(_))
        ));
    }

    #[test]
    fn test_record_wire_format() {
        let record = AnalysisRecord {
            question: "what is X?".to_string(),
            answer: "X is Y.".to_string(),
            kind: CHAT_ANALYSIS_TYPE,
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            serde_json::json!({"question": "what is X?", "answer": "X is Y.", "type": 1})
        );
    }

    #[tokio::test]
    async fn test_postgres_store_rejects_odd_table_names() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://user:pw@127.0.0.1:1/db")
            .unwrap();
        assert!(PostgresAnalysisStore::new(pool.clone(), "analysis; DROP TABLE x").is_err());
        assert!(PostgresAnalysisStore::new(pool, DEFAULT_ANALYSIS_TABLE).is_ok());
    }
}
