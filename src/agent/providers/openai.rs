//! `OpenAI`-compatible provider implementation using the `async-openai` crate.
//!
//! Works with any API that follows the `OpenAI` chat completion spec
//! (`DeepSeek`, `OpenAI`, Azure, local proxies) via the base URL in
//! [`Config`].

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
    CreateChatCompletionStreamResponse, ResponseFormat,
};
use async_trait::async_trait;
use futures_util::StreamExt;

use crate::agent::message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
use crate::agent::provider::{LlmProvider, TextStream};
use crate::config::Config;
use crate::error::AgentError;

const PROVIDER_NAME: &str = "openai";

/// `OpenAI`-compatible LLM provider.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    base_url: String,
}

impl OpenAiProvider {
    /// Creates a provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no LLM key is configured.
    pub fn new(config: &Config) -> Result<Self, AgentError> {
        let api_key = config
            .llm_api_key
            .as_deref()
            .ok_or(AgentError::ApiKeyMissing { credential: "llm" })?;
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&config.llm_base_url);

        Ok(Self {
            client: Client::with_config(openai_config),
            base_url: config.llm_base_url.clone(),
        })
    }

    /// Converts our message type to the `OpenAI` SDK type.
    fn convert_message(msg: &ChatMessage) -> ChatCompletionRequestMessage {
        match msg.role {
            Role::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(msg.content.clone()),
                    name: None,
                })
            }
            Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(msg.content.clone()),
                name: None,
            }),
            Role::Assistant => {
                #[allow(deprecated)]
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content: Some(ChatCompletionRequestAssistantMessageContent::Text(
                        msg.content.clone(),
                    )),
                    name: None,
                    tool_calls: None,
                    refusal: None,
                    audio: None,
                    function_call: None,
                })
            }
        }
    }

    /// Builds an `OpenAI` chat completion request from our generic request.
    fn build_request(request: &ChatRequest) -> CreateChatCompletionRequest {
        let messages: Vec<_> = request.messages.iter().map(Self::convert_message).collect();

        let response_format = if request.json_mode {
            Some(ResponseFormat::JsonObject)
        } else {
            None
        };

        CreateChatCompletionRequest {
            model: request.model.clone(),
            messages,
            temperature: request.temperature.filter(|&t| t != 0.0),
            max_completion_tokens: request.max_tokens,
            stream: if request.stream { Some(true) } else { None },
            response_format,
            ..Default::default()
        }
    }

    fn request_error(e: &async_openai::error::OpenAIError) -> AgentError {
        AgentError::ProviderError {
            provider: PROVIDER_NAME.to_string(),
            message: e.to_string(),
            status: None,
        }
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<async-openai::Client>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let openai_request = Self::build_request(request);

        let response = self
            .client
            .chat()
            .create(openai_request)
            .await
            .map_err(|e| Self::request_error(&e))?;

        let choice = response.choices.first();

        let content = choice
            .and_then(|c| c.message.content.as_ref())
            .cloned()
            .unwrap_or_default();

        let finish_reason = choice.and_then(|c| {
            c.finish_reason
                .as_ref()
                .map(|fr| format!("{fr:?}").to_lowercase())
        });

        let usage = response
            .usage
            .map_or_else(TokenUsage::default, |u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            });

        Ok(ChatResponse {
            content,
            usage,
            finish_reason,
        })
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<TextStream, AgentError> {
        let mut stream_request = request.clone();
        stream_request.stream = true;
        let openai_request = Self::build_request(&stream_request);

        let stream = self
            .client
            .chat()
            .create_stream(openai_request)
            .await
            .map_err(|e| Self::request_error(&e))?;

        let mapped = stream.map(
            |result: Result<
                CreateChatCompletionStreamResponse,
                async_openai::error::OpenAIError,
            >| {
                match result {
                    Ok(response) => Ok(response
                        .choices
                        .first()
                        .and_then(|c| c.delta.content.as_ref())
                        .cloned()
                        .unwrap_or_default()),
                    Err(e) => Err(AgentError::Stream {
                        message: e.to_string(),
                    }),
                }
            },
        );

        Ok(Box::pin(mapped))
    }
}
