//! Context window assembly.
//!
//! Matched documents are rendered in relevance order into one context
//! block, bounded by a token budget.

use std::sync::Arc;

use tiktoken_rs::CoreBPE;

use crate::error::{PipelineError, Result};

use super::Document;

/// Counts tokens the way the target model does.
pub trait TokenCounter: Send + Sync + std::fmt::Debug {
    /// Number of tokens in `text`.
    fn count(&self, text: &str) -> usize;
}

/// BPE token counter backed by `tiktoken-rs`.
#[derive(Clone)]
pub struct BpeTokenCounter {
    encoding: String,
    bpe: Arc<CoreBPE>,
}

impl std::fmt::Debug for BpeTokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BpeTokenCounter")
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl BpeTokenCounter {
    /// Load an encoding by name: `r50k_base` (GPT-3), `p50k_base`,
    /// `cl100k_base` or `o200k_base`.
    pub fn from_encoding(name: &str) -> Result<Self> {
        let bpe = match name {
            "r50k_base" | "gpt3" => tiktoken_rs::r50k_base(),
            "p50k_base" => tiktoken_rs::p50k_base(),
            "cl100k_base" => tiktoken_rs::cl100k_base(),
            "o200k_base" => tiktoken_rs::o200k_base(),
            other => {
                return Err(PipelineError::Tokenizer(format!(
                    "unknown encoding: {other}"
                )));
            }
        }
        .map_err(|e| PipelineError::Tokenizer(e.to_string()))?;

        Ok(Self {
            encoding: name.to_string(),
            bpe: Arc::new(bpe),
        })
    }
}

impl TokenCounter for BpeTokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Builds the context block injected into augmented prompts.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    counter: Arc<dyn TokenCounter>,
    token_budget: usize,
}

impl ContextAssembler {
    /// Create an assembler with the given counter and budget.
    #[must_use]
    pub fn new(counter: Arc<dyn TokenCounter>, token_budget: usize) -> Self {
        Self {
            counter,
            token_budget,
        }
    }

    /// Render `documents` until the running token count passes the budget.
    ///
    /// The document that pushes the count over the budget is still
    /// included; nothing after it is.
    pub fn assemble(&self, documents: &[Document]) -> String {
        let mut context = String::new();
        let mut token_count = 0usize;

        for (idx, doc) in documents.iter().enumerate() {
            token_count += self.counter.count(&doc.content);
            context.push_str(&render_document(doc));

            if token_count > self.token_budget {
                tracing::debug!(
                    included = idx + 1,
                    dropped = documents.len() - idx - 1,
                    token_count,
                    budget = self.token_budget,
                    "Context budget reached"
                );
                break;
            }
        }

        context
    }
}

fn render_document(doc: &Document) -> String {
    format!("{}\nSOURCE: {}\n---\n", doc.content.trim(), doc.url)
}
