//! Message chain construction.
//!
//! A query whose first word is the trigger prefix is answered from the
//! document store: the prefix is stripped, the question is embedded and
//! matched, and the matches are injected into a new user turn preceded by a
//! one-shot exemplar. Every other query passes through untouched.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::llm::{ApiCredential, Embedder, Message};

use super::context::ContextAssembler;
use super::prompt::{Exemplar, augmented_question};
use super::search::DocumentSearch;
use super::RetrievalSettings;

/// How a query is handled, decided once from its text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    /// Forward as-is.
    Plain,
    /// Answer from retrieved context.
    Augmented {
        /// The query with the trigger prefix removed.
        question: String,
    },
}

impl QueryKind {
    /// Classify `content` against `trigger`.
    ///
    /// The first space-separated word must equal the trigger, ignoring ASCII
    /// case; `"fr what is X?"` is augmented, `"from here"` is not.
    pub fn classify(content: &str, trigger: &str) -> Self {
        if trigger.is_empty() {
            return Self::Plain;
        }

        let first_word = content.split(' ').next().unwrap_or_default();
        if !first_word.eq_ignore_ascii_case(trigger) {
            return Self::Plain;
        }

        let rest = &content[first_word.len()..];
        Self::Augmented {
            question: rest.strip_prefix(' ').unwrap_or(rest).to_string(),
        }
    }
}

/// The newest user turn plus the history before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMsg {
    /// The turn being answered.
    pub user_message: Message,
    /// Earlier turns, oldest first.
    #[serde(default)]
    pub recent_messages: Vec<Message>,
}

impl SessionMsg {
    /// Split a conversation into its last turn and the history before it.
    pub fn from_messages(mut messages: Vec<Message>) -> Result<Self> {
        let user_message = messages
            .pop()
            .ok_or_else(|| PipelineError::InvalidRequest("messages must not be empty".to_string()))?;
        Ok(Self {
            user_message,
            recent_messages: messages,
        })
    }

    /// The conversation in the order sent to the model.
    #[must_use]
    pub fn into_messages(self) -> Vec<Message> {
        let mut messages = self.recent_messages;
        messages.push(self.user_message);
        messages
    }
}

/// Builds the message list sent to the completion endpoint.
#[derive(Debug, Clone)]
pub struct MessageChainBuilder {
    embedder: Arc<dyn Embedder>,
    search: Arc<dyn DocumentSearch>,
    assembler: ContextAssembler,
    settings: RetrievalSettings,
    exemplar: Exemplar,
}

impl MessageChainBuilder {
    /// Create a builder with the default exemplar.
    #[must_use]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        search: Arc<dyn DocumentSearch>,
        assembler: ContextAssembler,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            embedder,
            search,
            assembler,
            settings,
            exemplar: Exemplar::default(),
        }
    }

    /// Replace the one-shot exemplar.
    #[must_use]
    pub fn with_exemplar(mut self, exemplar: Exemplar) -> Self {
        self.exemplar = exemplar;
        self
    }

    /// Classify the newest turn and build the chain for it.
    pub async fn build(
        &self,
        session: SessionMsg,
        credential: Option<&ApiCredential>,
    ) -> Result<SessionMsg> {
        match QueryKind::classify(&session.user_message.content, &self.settings.trigger_prefix) {
            QueryKind::Plain => Ok(session),
            QueryKind::Augmented { question } => {
                self.augment(&question, session.recent_messages, credential)
                    .await
            }
        }
    }

    async fn augment(
        &self,
        question: &str,
        mut recent_messages: Vec<Message>,
        credential: Option<&ApiCredential>,
    ) -> Result<SessionMsg> {
        let embedding = self.embedder.embed(question, credential).await?;

        let documents = self
            .search
            .match_documents(&embedding, self.settings.search)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    name: "rag.search.failed",
                    backend = self.search.backend_name(),
                    error = %e,
                    "Similarity search failed"
                );
            })?;

        let context = self.assembler.assemble(&documents);
        tracing::info!(
            name: "rag.context.assembled",
            backend = self.search.backend_name(),
            matches = documents.len(),
            context_length = context.len(),
            "Built retrieval context"
        );

        let scoped_question = match &self.settings.question_scope {
            Some(scope) => format!("{scope}{question}"),
            None => question.to_string(),
        };

        let date = chrono::Utc::now().to_rfc3339();
        let user_message =
            Message::user(augmented_question(&context, &scoped_question)).with_date(date.as_str());
        recent_messages.extend(self.exemplar.messages(&date));

        Ok(SessionMsg {
            user_message,
            recent_messages,
        })
    }
}
