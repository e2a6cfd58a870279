use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestToolMessageArgs,
        ChatCompletionRequestUserMessage, ChatCompletionTool, ChatCompletionToolArgs,
        ChatCompletionToolType, CreateChatCompletionRequestArgs, FunctionCall, FunctionObjectArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Role of a single turn in a chat transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One turn of a chat transcript, in a provider-neutral shape so the
/// conversation loop can be driven by scripted doubles in tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Set on `Tool` messages, linking the result to the call it answers.
    pub tool_call_id: Option<String>,
    /// Set on `Assistant` messages that requested tool calls.
    pub tool_calls: Vec<ToolInvocation>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_with_calls(content: impl Into<String>, calls: Vec<ToolInvocation>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: calls,
        }
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            tool_call_id: Some(call_id.into()),
            tool_calls: Vec::new(),
        }
    }
}

/// A tool the model may call, described with a JSON-schema parameter object.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool call requested by the model. `arguments` is the raw JSON string
/// exactly as returned; callers parse and validate it themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Normalized model output. Reasoning segments are separated from the
/// answer text here so downstream parsers never see them; models that
/// emit `<think>` blocks and models that keep content clean look the
/// same past this boundary.
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub content: String,
    pub reasoning: Option<String>,
    pub tool_calls: Vec<ToolInvocation>,
}

/// Completion backend seam. All calls run at temperature zero; the
/// callers here are deterministic parsers and selection oracles, not
/// open-ended generation.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<ModelReply, AppError>;

    /// Completion with native tool calling. Backends without tool
    /// support may return an error; the simulated conversation variant
    /// never calls this.
    async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ModelReply, AppError>;
}

/// Splits a leading `<think>...</think>` block off the content. Returns
/// the remaining text trimmed, plus the reasoning if one was present.
/// An unterminated block swallows the whole message, which is the safe
/// reading: half-emitted reasoning must not leak into parsed output.
pub fn split_reasoning(raw: &str) -> (String, Option<String>) {
    let trimmed = raw.trim_start();
    let Some(rest) = trimmed.strip_prefix("<think>") else {
        return (raw.trim().to_owned(), None);
    };
    match rest.find("</think>") {
        Some(end) => {
            let reasoning = rest[..end].trim().to_owned();
            let content = rest[end + "</think>".len()..].trim().to_owned();
            (content, Some(reasoning))
        }
        None => (String::new(), Some(rest.trim().to_owned())),
    }
}

/// OpenAI-compatible completion backend.
#[derive(Clone)]
pub struct OpenAiCompletionModel {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiCompletionModel {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    fn convert_messages(
        messages: &[ChatMessage],
    ) -> Result<Vec<async_openai::types::ChatCompletionRequestMessage>, AppError> {
        let mut out = Vec::with_capacity(messages.len());
        for message in messages {
            let converted = match message.role {
                ChatRole::System => {
                    ChatCompletionRequestSystemMessage::from(message.content.clone()).into()
                }
                ChatRole::User => {
                    ChatCompletionRequestUserMessage::from(message.content.clone()).into()
                }
                ChatRole::Assistant => {
                    let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                    builder.content(message.content.clone());
                    if !message.tool_calls.is_empty() {
                        let calls: Vec<ChatCompletionMessageToolCall> = message
                            .tool_calls
                            .iter()
                            .map(|call| ChatCompletionMessageToolCall {
                                id: call.id.clone(),
                                r#type: ChatCompletionToolType::Function,
                                function: FunctionCall {
                                    name: call.name.clone(),
                                    arguments: call.arguments.clone(),
                                },
                            })
                            .collect();
                        builder.tool_calls(calls);
                    }
                    builder
                        .build()
                        .map_err(|e| AppError::LLMParsing(e.to_string()))?
                        .into()
                }
                ChatRole::Tool => {
                    let call_id = message.tool_call_id.clone().ok_or_else(|| {
                        AppError::Validation("tool message without a call id".to_owned())
                    })?;
                    ChatCompletionRequestToolMessageArgs::default()
                        .tool_call_id(call_id)
                        .content(message.content.clone())
                        .build()
                        .map_err(|e| AppError::LLMParsing(e.to_string()))?
                        .into()
                }
            };
            out.push(converted);
        }
        Ok(out)
    }

    fn convert_tools(tools: &[ToolSpec]) -> Result<Vec<ChatCompletionTool>, AppError> {
        tools
            .iter()
            .map(|tool| {
                let function = FunctionObjectArgs::default()
                    .name(tool.name.clone())
                    .description(tool.description.clone())
                    .parameters(tool.parameters.clone())
                    .build()
                    .map_err(|e| AppError::LLMParsing(e.to_string()))?;
                ChatCompletionToolArgs::default()
                    .r#type(ChatCompletionToolType::Function)
                    .function(function)
                    .build()
                    .map_err(|e| AppError::LLMParsing(e.to_string()))
            })
            .collect()
    }

    async fn run(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ModelReply, AppError> {
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.model)
            .temperature(0.0)
            .messages(Self::convert_messages(messages)?);
        if !tools.is_empty() {
            builder.tools(Self::convert_tools(tools)?);
        }
        let request = builder
            .build()
            .map_err(|e| AppError::LLMParsing(e.to_string()))?;

        let response = self.client.chat().create(request).await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::LLMParsing("no choices in completion response".to_owned()))?;

        let raw_content = choice.message.content.unwrap_or_default();
        let (content, reasoning) = split_reasoning(&raw_content);
        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolInvocation {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        Ok(ModelReply {
            content,
            reasoning,
            tool_calls,
        })
    }
}

#[async_trait]
impl CompletionModel for OpenAiCompletionModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<ModelReply, AppError> {
        self.run(messages, &[]).await
    }

    async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ModelReply, AppError> {
        self.run(messages, tools).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_reasoning_extracts_leading_block() {
        let (content, reasoning) = split_reasoning("<think>weighing options</think>\nYES");
        assert_eq!(content, "YES");
        assert_eq!(reasoning.as_deref(), Some("weighing options"));
    }

    #[test]
    fn split_reasoning_passes_plain_content_through() {
        let (content, reasoning) = split_reasoning("  2  ");
        assert_eq!(content, "2");
        assert!(reasoning.is_none());
    }

    #[test]
    fn split_reasoning_drops_unterminated_block() {
        let (content, reasoning) = split_reasoning("<think>half a thought");
        assert_eq!(content, "");
        assert_eq!(reasoning.as_deref(), Some("half a thought"));
    }
}
