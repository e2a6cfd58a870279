use tracing::{debug, info, warn};

use common::{
    error::AppError,
    llm::{ChatMessage, ToolSpec},
};

use crate::{
    actions::{search_tool_spec, SearchAction},
    prompt::native_system_prompt,
    ConversationRound, RoundDisposition, RunOutcome, SearchContext,
};

/// Tool-calling driver. The model gets the search tool schema; a reply
/// with no tool calls is the final answer. Unreadable tool arguments
/// degrade to the empty action, whose validation error flows back
/// through the tool channel like any other observation.
pub async fn run(
    ctx: &SearchContext,
    question: &str,
    max_rounds: usize,
) -> Result<RunOutcome, AppError> {
    let tools: Vec<ToolSpec> = vec![search_tool_spec()];
    let mut history = vec![
        ChatMessage::system(native_system_prompt()),
        ChatMessage::user(question),
    ];
    let mut rounds: Vec<ConversationRound> = Vec::new();

    for round in 1..=max_rounds {
        let reply = match ctx.model.complete_with_tools(&history, &tools).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(round, error = %e, "completion backend failed, ending run");
                return Ok(RunOutcome::failed(e.to_string(), rounds));
            }
        };
        if let Some(reasoning) = &reply.reasoning {
            debug!(round, reasoning, "model reasoning");
        }

        if reply.tool_calls.is_empty() {
            info!(round, "received final answer");
            rounds.push(ConversationRound {
                round,
                raw_reply: reply.content.clone(),
                reasoning: reply.reasoning,
                disposition: RoundDisposition::FinalAnswer,
                action: None,
                observation: None,
            });
            return Ok(RunOutcome::answered(reply.content, rounds));
        }

        history.push(ChatMessage::assistant_with_calls(
            reply.content.clone(),
            reply.tool_calls.clone(),
        ));

        let mut first_action: Option<SearchAction> = None;
        let mut observations: Vec<String> = Vec::new();
        for call in &reply.tool_calls {
            let action = SearchAction::parse_lenient(&call.arguments);
            info!(round, tool = %call.name, entity_code = %action.entity_code, "executing tool call");
            let response = ctx.execute(action.clone()).await;
            let observation = serde_json::to_string(&response)?;
            history.push(ChatMessage::tool(call.id.clone(), observation.clone()));
            observations.push(observation);
            first_action.get_or_insert(action);
        }

        rounds.push(ConversationRound {
            round,
            raw_reply: reply.content,
            reasoning: reply.reasoning,
            disposition: RoundDisposition::Action,
            action: first_action,
            observation: Some(observations.join("\n")),
        });
    }

    Ok(RunOutcome::exhausted(rounds))
}
