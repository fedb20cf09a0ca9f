//! Retrieval-augmented prompt construction.
//!
//! # Pipeline
//!
//! ```text
//! query ─▶ Embedder ─▶ DocumentSearch ─▶ ContextAssembler ─▶ MessageChainBuilder
//! ```
//!
//! Everything here is per request: documents, vectors and the assembled
//! context are created for one call and dropped afterwards.
//!
//! # Modules
//!
//! - [`search`]: `match_documents` over Supabase REST or Postgres
//! - [`context`]: token-bounded context assembly
//! - [`prompt`]: the one-shot exemplar
//! - [`chain`]: trigger classification and message chain building
//! - [`analysis`]: insert-only question/answer records

pub mod analysis;
pub mod chain;
pub mod context;
pub mod prompt;
pub mod search;

pub use analysis::{
    AnalysisRecord, AnalysisStore, CHAT_ANALYSIS_TYPE, DisabledAnalysis, PostgresAnalysisStore,
    SupabaseAnalysisStore,
};
pub use chain::{MessageChainBuilder, QueryKind, SessionMsg};
pub use context::{BpeTokenCounter, ContextAssembler, TokenCounter};
pub use search::{DisabledSearch, DocumentSearch, PostgresSearch, SearchParams, SupabaseSearch};

use serde::{Deserialize, Serialize};

/// A similarity-search match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Document text.
    pub content: String,
    /// Source URL cited in answers.
    #[serde(default)]
    pub url: String,
}

/// Tunables for the augmented path.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalSettings {
    /// First word that marks a query for augmentation.
    pub trigger_prefix: String,
    /// Threshold and count passed to `match_documents`.
    pub search: SearchParams,
    /// Token budget for the context block.
    pub context_token_budget: usize,
    /// Tokenizer encoding used to measure the budget.
    pub tokenizer: String,
    /// Phrase placed before every augmented question.
    pub question_scope: Option<String>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            trigger_prefix: "fr".to_string(),
            search: SearchParams::default(),
            context_token_budget: 3000,
            tokenizer: "r50k_base".to_string(),
            question_scope: None,
        }
    }
}
