use crate::error::TurnGeneratorError;
use crate::models::{ChatRole, ChatTurn};
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
    },
};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The structured reply the interviewer model produces for every turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GeneratedTurn {
    /// Catalog topic the interviewer is on after this turn.
    pub topic_name: String,
    /// Free-text label for the area within the topic.
    pub subtopic_name: String,
    /// The next question to put to the candidate.
    pub question_text: String,
    /// Feedback on the candidate's previous answer.
    pub feedback_text: String,
}

impl GeneratedTurn {
    /// Parses model output, tolerating a surrounding markdown code fence.
    pub fn parse(content: &str) -> Result<Self, TurnGeneratorError> {
        let body = strip_code_fence(content);
        let turn: GeneratedTurn = serde_json::from_str(body)
            .map_err(|e| TurnGeneratorError::Malformed(e.to_string()))?;
        if turn.topic_name.trim().is_empty() {
            return Err(TurnGeneratorError::Malformed(
                "topic_name is empty".to_string(),
            ));
        }
        Ok(turn)
    }

    /// Feedback followed by the next question, as a single interviewer message.
    pub fn reply(&self) -> String {
        [self.feedback_text.trim(), self.question_text.trim()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}

/// Produces the interviewer's next turn from the conversation transcript.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TurnGenerator: Send + Sync {
    async fn generate_turn(
        &self,
        history: &[ChatTurn],
    ) -> Result<GeneratedTurn, TurnGeneratorError>;
}

/// An implementation of `TurnGenerator` for any OpenAI-compatible API.
pub struct OpenAITurnGenerator {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAITurnGenerator {
    /// Creates a new generator for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The model identifier to use for chat completions (e.g., "gpt-4o").
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }

    fn response_format() -> Result<ResponseFormat, TurnGeneratorError> {
        let schema = serde_json::to_value(schemars::schema_for!(GeneratedTurn))
            .map_err(|e| TurnGeneratorError::Transport(e.to_string()))?;
        Ok(ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: Some("The interviewer's next turn".to_string()),
                name: "interview_turn".to_string(),
                schema: Some(schema),
                strict: None,
            },
        })
    }
}

fn to_request_message(turn: &ChatTurn) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    Ok(match turn.role {
        ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(turn.content.clone())
            .build()?
            .into(),
        ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(turn.content.clone())
            .build()?
            .into(),
        ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(turn.content.clone())
            .build()?
            .into(),
    })
}

#[async_trait]
impl TurnGenerator for OpenAITurnGenerator {
    async fn generate_turn(
        &self,
        history: &[ChatTurn],
    ) -> Result<GeneratedTurn, TurnGeneratorError> {
        let transport = |e: OpenAIError| TurnGeneratorError::Transport(e.to_string());

        let messages = history
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>, _>>()
            .map_err(transport)?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .response_format(Self::response_format()?)
            .build()
            .map_err(transport)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(transport)?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .ok_or_else(|| {
                TurnGeneratorError::Malformed("LLM response had no text content.".to_string())
            })?;
        debug!(model = %self.model, bytes = content.len(), "Received turn from LLM");

        GeneratedTurn::parse(content)
    }
}
