use tracing::{debug, info, warn};

use common::{error::AppError, llm::ChatMessage};

use crate::{
    actions::SearchAction,
    prompt::{corrective_feedback, observation_feedback, simulated_system_prompt},
    ConversationRound, RoundDisposition, RunOutcome, SearchContext,
};

const TOOL_MARKER: &str = "TOOL_CALL:";
const ANSWER_MARKER: &str = "FINAL_ANSWER:";

/// Text-protocol driver for models without a tool channel. The model
/// speaks in `TOOL_CALL:` / `FINAL_ANSWER:` blocks; observations and
/// corrections travel back as user messages.
pub async fn run(
    ctx: &SearchContext,
    question: &str,
    max_rounds: usize,
) -> Result<RunOutcome, AppError> {
    let mut history = vec![
        ChatMessage::system(simulated_system_prompt()),
        ChatMessage::user(question),
    ];
    let mut rounds: Vec<ConversationRound> = Vec::new();

    for round in 1..=max_rounds {
        let reply = match ctx.model.complete(&history).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(round, error = %e, "completion backend failed, ending run");
                return Ok(RunOutcome::failed(e.to_string(), rounds));
            }
        };
        if let Some(reasoning) = &reply.reasoning {
            debug!(round, reasoning, "model reasoning");
        }
        // Only the visible content goes back into the history.
        history.push(ChatMessage::assistant(reply.content.clone()));

        match read_reply(&reply.content) {
            ParsedReply::Action(action) => {
                info!(round, entity_code = %action.entity_code, query = %action.query, "executing action");
                let response = ctx.execute(action.clone()).await;
                let observation = serde_json::to_string(&response)?;
                history.push(ChatMessage::user(observation_feedback(&observation)));
                rounds.push(ConversationRound {
                    round,
                    raw_reply: reply.content,
                    reasoning: reply.reasoning,
                    disposition: RoundDisposition::Action,
                    action: Some(action),
                    observation: Some(observation),
                });
            }
            ParsedReply::FinalAnswer(answer) => {
                info!(round, "received final answer");
                rounds.push(ConversationRound {
                    round,
                    raw_reply: reply.content,
                    reasoning: reply.reasoning,
                    disposition: RoundDisposition::FinalAnswer,
                    action: None,
                    observation: None,
                });
                return Ok(RunOutcome::answered(answer, rounds));
            }
            ParsedReply::Malformed => {
                warn!(round, "malformed reply, sending corrective feedback");
                history.push(ChatMessage::user(corrective_feedback()));
                rounds.push(ConversationRound {
                    round,
                    raw_reply: reply.content,
                    reasoning: reply.reasoning,
                    disposition: RoundDisposition::Malformed,
                    action: None,
                    observation: None,
                });
            }
        }
    }

    warn!(max_rounds, "round budget exhausted");
    Ok(RunOutcome::exhausted(rounds))
}

enum ParsedReply {
    Action(SearchAction),
    FinalAnswer(String),
    Malformed,
}

/// Reads one protocol block out of the reply. The action marker is
/// checked first, so a reply carrying both blocks acts rather than
/// answers.
fn read_reply(content: &str) -> ParsedReply {
    if let Some(position) = content.find(TOOL_MARKER) {
        let payload = &content[position + TOOL_MARKER.len()..];
        return match extract_object(payload).and_then(SearchAction::parse_strict) {
            Some(action) => ParsedReply::Action(action),
            None => ParsedReply::Malformed,
        };
    }
    if let Some(position) = content.find(ANSWER_MARKER) {
        let answer = content[position + ANSWER_MARKER.len()..].trim();
        return ParsedReply::FinalAnswer(answer.to_owned());
    }
    ParsedReply::Malformed
}

fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seeded_document, ScriptedModel, TEST_DIM};
    use crate::Protocol;
    use common::utils::embedding::EmbeddingProvider;
    use std::sync::Arc;

    async fn context(model: ScriptedModel) -> SearchContext {
        SearchContext::new(
            seeded_document().await,
            EmbeddingProvider::new_hashed(TEST_DIM),
            Arc::new(model),
        )
    }

    #[tokio::test]
    async fn immediate_final_answer_succeeds_in_one_round() {
        let ctx = context(ScriptedModel::new(vec![ScriptedModel::text(
            "FINAL_ANSWER: The outstanding balance is 3.5 billion.",
        )]))
        .await;

        let outcome = crate::run_question(
            &ctx,
            "What is the outstanding balance of external borrowings?",
            5,
            Protocol::Simulated,
        )
        .await
        .expect("run failed");

        assert!(outcome.success);
        assert_eq!(outcome.total_rounds, 1);
        assert_eq!(
            outcome.final_answer.as_deref(),
            Some("The outstanding balance is 3.5 billion.")
        );
    }

    #[tokio::test]
    async fn persistent_malformed_replies_exhaust_the_budget() {
        let ctx = context(ScriptedModel::new(vec![
            ScriptedModel::text("let me think about this"),
            ScriptedModel::text("TOOL_CALL: {\"query\": \"catalog\"}"),
            ScriptedModel::text("still thinking"),
        ]))
        .await;

        let outcome = crate::run_question(&ctx, "anything", 3, Protocol::Simulated)
            .await
            .expect("run failed");

        assert!(!outcome.success);
        assert_eq!(outcome.total_rounds, 3);
        assert_eq!(outcome.error.as_deref(), Some(crate::BUDGET_EXHAUSTED));
        assert!(outcome
            .rounds
            .iter()
            .all(|r| r.disposition == RoundDisposition::Malformed));
    }

    #[tokio::test]
    async fn failing_action_feeds_the_error_back_and_continues() {
        let ctx = context(ScriptedModel::new(vec![
            ScriptedModel::text("TOOL_CALL: {\"entity_code\": \"999999.SZ\", \"query\": \"catalog\"}"),
            ScriptedModel::text("FINAL_ANSWER: I could not find that entity."),
        ]))
        .await;

        let outcome = crate::run_question(&ctx, "anything", 5, Protocol::Simulated)
            .await
            .expect("run failed");

        assert!(outcome.success);
        assert_eq!(outcome.total_rounds, 2);
        let observation = outcome.rounds[0]
            .observation
            .as_deref()
            .expect("expected an observation");
        assert!(observation.contains("no indexed document found"));
    }

    #[tokio::test]
    async fn reasoning_is_recorded_but_never_replayed() {
        let ctx = context(ScriptedModel::new(vec![ScriptedModel::text_with_reasoning(
            "FINAL_ANSWER: done",
            "the user wants the borrowings section",
        )]))
        .await;

        let outcome = crate::run_question(&ctx, "anything", 5, Protocol::Simulated)
            .await
            .expect("run failed");

        assert_eq!(
            outcome.rounds[0].reasoning.as_deref(),
            Some("the user wants the borrowings section")
        );
        assert!(!outcome.rounds[0].raw_reply.contains("wants the borrowings"));
    }

    #[tokio::test]
    async fn backend_failure_keeps_the_earlier_rounds() {
        let ctx = context(ScriptedModel::failing_after(vec![ScriptedModel::text(
            "TOOL_CALL: {\"entity_code\": \"180101.SZ\", \"query\": \"\", \"start_chunk_id\": 3, \"end_chunk_id\": 3}",
        )]))
        .await;

        let outcome = crate::run_question(&ctx, "anything", 5, Protocol::Simulated)
            .await
            .expect("run failed");

        assert!(!outcome.success);
        assert!(outcome.final_answer.is_none());
        assert_eq!(outcome.total_rounds, 1);
        assert_eq!(outcome.rounds[0].disposition, RoundDisposition::Action);
        assert!(outcome
            .error
            .as_deref()
            .expect("expected error")
            .contains("completion backend unreachable"));
    }

    #[tokio::test]
    async fn three_round_walkthrough_of_a_document() {
        // catalog, then a raw range read over the section, then the answer.
        // The second scripted reply is consumed by the TOC classifier
        // inside the catalog search.
        let ctx = context(ScriptedModel::new(vec![
            ScriptedModel::text("TOOL_CALL: {\"entity_code\": \"180101.SZ\", \"query\": \"catalog\"}"),
            ScriptedModel::text("{\"is_toc\": \"yes\"}"),
            ScriptedModel::text(
                "TOOL_CALL: {\"entity_code\": \"180101.SZ\", \"query\": \"\", \"start_chunk_id\": 4, \"end_chunk_id\": 4}",
            ),
            ScriptedModel::text(
                "FINAL_ANSWER: The outstanding balance of external borrowings is 3.5 billion.",
            ),
        ]))
        .await;

        let outcome = crate::run_question(
            &ctx,
            "What is the outstanding balance of 180101.SZ's external borrowings?",
            10,
            Protocol::Simulated,
        )
        .await
        .expect("run failed");

        assert!(outcome.success);
        assert_eq!(outcome.total_rounds, 3);

        let first = outcome.rounds[0].action.as_ref().expect("round 1 action");
        assert_eq!(first.query, "catalog");
        let toc_observation = outcome.rounds[0]
            .observation
            .as_deref()
            .expect("round 1 observation");
        assert!(toc_observation.contains("Table of Contents"));

        let second = outcome.rounds[1].action.as_ref().expect("round 2 action");
        assert_eq!(second.start_chunk_id, Some(4));
        let range_observation = outcome.rounds[1]
            .observation
            .as_deref()
            .expect("round 2 observation");
        assert!(range_observation.contains("external borrowings is 3.5 billion"));

        assert_eq!(
            outcome.final_answer.as_deref(),
            Some("The outstanding balance of external borrowings is 3.5 billion.")
        );
    }
}
