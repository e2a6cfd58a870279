pub mod actions;
pub mod native;
pub mod prompt;
pub mod simulated;

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};

use common::{
    error::AppError, llm::CompletionModel, storage::db::SurrealDbClient,
    utils::embedding::EmbeddingProvider,
};
use retrieval_pipeline::{run_search, SearchResponse};

use actions::SearchAction;

/// Round budget exhaustion message, surfaced as the run error.
pub const BUDGET_EXHAUSTED: &str = "round budget exhausted before a final answer";

/// Everything a conversation needs to execute searches, built once by
/// the caller and passed down explicitly.
#[derive(Clone)]
pub struct SearchContext {
    pub db: SurrealDbClient,
    pub embedder: EmbeddingProvider,
    pub model: Arc<dyn CompletionModel>,
}

impl SearchContext {
    pub fn new(
        db: SurrealDbClient,
        embedder: EmbeddingProvider,
        model: Arc<dyn CompletionModel>,
    ) -> Self {
        Self { db, embedder, model }
    }

    pub async fn execute(&self, action: SearchAction) -> SearchResponse {
        run_search(
            &self.db,
            &self.embedder,
            self.model.as_ref(),
            &action.into_request(),
        )
        .await
    }
}

/// How one model reply was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RoundDisposition {
    Action,
    FinalAnswer,
    Malformed,
}

/// One turn of the conversation, kept for the transcript. Reasoning is
/// recorded here and nowhere else; it never re-enters the history.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationRound {
    pub round: usize,
    pub raw_reply: String,
    pub reasoning: Option<String>,
    pub disposition: RoundDisposition,
    pub action: Option<SearchAction>,
    pub observation: Option<String>,
}

/// Final result of driving one question.
#[derive(Debug, Serialize)]
pub struct RunOutcome {
    pub success: bool,
    pub final_answer: Option<String>,
    pub total_rounds: usize,
    pub error: Option<String>,
    pub rounds: Vec<ConversationRound>,
}

impl RunOutcome {
    pub(crate) fn answered(answer: String, rounds: Vec<ConversationRound>) -> Self {
        Self {
            success: true,
            final_answer: Some(answer),
            total_rounds: rounds.len(),
            error: None,
            rounds,
        }
    }

    pub(crate) fn failed(message: String, rounds: Vec<ConversationRound>) -> Self {
        Self {
            success: false,
            final_answer: None,
            total_rounds: rounds.len(),
            error: Some(message),
            rounds,
        }
    }

    pub(crate) fn exhausted(rounds: Vec<ConversationRound>) -> Self {
        Self {
            success: false,
            final_answer: None,
            total_rounds: rounds.len(),
            error: Some(BUDGET_EXHAUSTED.to_owned()),
            rounds,
        }
    }
}

/// Which conversation protocol to drive the model with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// The model's own tool-calling channel.
    Native,
    /// Text markers for models without one.
    Simulated,
}

impl std::str::FromStr for Protocol {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "simulated" => Ok(Self::Simulated),
            other => Err(AppError::Validation(format!(
                "unknown protocol '{other}', expected 'native' or 'simulated'"
            ))),
        }
    }
}

/// Drives one question to completion. A transport failure from the
/// completion backend ends the run as a failed outcome that keeps the
/// rounds accumulated so far; everything else is fed back into the
/// conversation and costs a round.
#[instrument(skip(ctx, question))]
pub async fn run_question(
    ctx: &SearchContext,
    question: &str,
    max_rounds: usize,
    protocol: Protocol,
) -> Result<RunOutcome, AppError> {
    info!(question, "starting conversation");
    match protocol {
        Protocol::Native => native::run(ctx, question, max_rounds).await,
        Protocol::Simulated => simulated::run(ctx, question, max_rounds).await,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use common::{
        error::AppError,
        llm::{ChatMessage, CompletionModel, ModelReply, ToolInvocation, ToolSpec},
        storage::{
            db::SurrealDbClient,
            types::{catalog_record::CatalogRecord, document_chunk::DocumentChunk},
        },
        utils::embedding::EmbeddingProvider,
    };
    use uuid::Uuid;

    pub const TEST_DIM: usize = 8;

    /// Replays canned replies in order; panics when called past the end
    /// of the script, which is the assertion that no further call
    /// happens. `failing_after` instead turns calls past the end into
    /// transport errors, for exercising backend outages mid-run.
    pub struct ScriptedModel {
        replies: Mutex<Vec<ModelReply>>,
        fail_when_exhausted: bool,
    }

    impl ScriptedModel {
        pub fn new(replies: Vec<ModelReply>) -> Self {
            let mut scripted = replies;
            scripted.reverse();
            Self {
                replies: Mutex::new(scripted),
                fail_when_exhausted: false,
            }
        }

        pub fn failing_after(replies: Vec<ModelReply>) -> Self {
            let mut model = Self::new(replies);
            model.fail_when_exhausted = true;
            model
        }

        pub fn text(content: &str) -> ModelReply {
            ModelReply {
                content: content.to_owned(),
                reasoning: None,
                tool_calls: Vec::new(),
            }
        }

        pub fn text_with_reasoning(content: &str, reasoning: &str) -> ModelReply {
            ModelReply {
                content: content.to_owned(),
                reasoning: Some(reasoning.to_owned()),
                tool_calls: Vec::new(),
            }
        }

        pub fn tool_call(name: &str, arguments: &str) -> ModelReply {
            ModelReply {
                content: String::new(),
                reasoning: None,
                tool_calls: vec![ToolInvocation {
                    id: Uuid::new_v4().to_string(),
                    name: name.to_owned(),
                    arguments: arguments.to_owned(),
                }],
            }
        }

        fn next(&self) -> Result<ModelReply, AppError> {
            match self.replies.lock().expect("script lock poisoned").pop() {
                Some(reply) => Ok(reply),
                None if self.fail_when_exhausted => Err(AppError::InternalError(
                    "completion backend unreachable".to_owned(),
                )),
                None => panic!("scripted model called past its script"),
            }
        }
    }

    #[async_trait]
    impl CompletionModel for ScriptedModel {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<ModelReply, AppError> {
            self.next()
        }

        async fn complete_with_tools(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolSpec],
        ) -> Result<ModelReply, AppError> {
            self.next()
        }
    }

    /// One fully indexed document for entity 180101.SZ, with a table of
    /// contents in chunk 2.
    pub async fn seeded_document() -> SurrealDbClient {
        let db = SurrealDbClient::memory("agent_loop_test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("failed to create in-memory surreal");
        db.ensure_indexes(TEST_DIM)
            .await
            .expect("failed to define indexes");

        let record = CatalogRecord::new(
            "180101.SZ".into(),
            "doc-1".into(),
            "Offering circular".into(),
            "offering-circular".into(),
            true,
            Utc::now(),
        );
        db.store_item(record).await.expect("failed to store record");

        let texts = [
            "cover page ",
            "Table of Contents 1. Overview 2. External Borrowings ",
            "1 Overview of the issuer ",
            "2 External Borrowings the outstanding balance of external borrowings is 3.5 billion ",
            "appendix ",
        ];
        let embedder = EmbeddingProvider::new_hashed(TEST_DIM);
        for (index, text) in texts.iter().enumerate() {
            let chunk_id = i64::try_from(index).expect("fixture too large") + 1;
            let chunk = DocumentChunk::new(
                chunk_id,
                "doc-1".into(),
                chunk_id.to_string(),
                (*text).to_owned(),
            );
            let embedding = embedder.embed(text).await.expect("embed failed");
            DocumentChunk::store_with_embedding(chunk, embedding, &db)
                .await
                .expect("failed to store chunk");
        }
        db.rebuild_indexes().await.expect("failed to rebuild indexes");
        db
    }
}
