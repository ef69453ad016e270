//! Agent trait definition.
//!
//! Both model roles (gap analysis and answer synthesis) implement this trait,
//! which gives the retrieval loop a uniform way to call them.

use std::time::Duration;

use async_trait::async_trait;

use super::message::{ChatMessage, ChatRequest, TokenUsage, system_message, user_message};
use super::provider::{LlmProvider, chat_with_timeout};
use crate::error::AgentError;

/// Default timeout for one agent call.
const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(120);

/// Response from an agent execution.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// The agent's text output.
    pub content: String,
    /// Token usage for this call.
    pub usage: TokenUsage,
    /// Why the model stopped generating (e.g. `"stop"`, `"length"`).
    pub finish_reason: Option<String>,
}

/// Trait implemented by all agents in the system.
///
/// Agents encapsulate a specific role with a fixed system prompt and model
/// configuration.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent name for logging and identification.
    fn name(&self) -> &'static str;

    /// Model identifier to use for this agent.
    fn model(&self) -> &str;

    /// System prompt that defines the agent's role and behavior.
    fn system_prompt(&self) -> &str;

    /// Whether to request JSON-formatted output.
    fn json_mode(&self) -> bool {
        false
    }

    /// Sampling temperature (0.0 = deterministic, higher = more creative).
    fn temperature(&self) -> f32 {
        0.0
    }

    /// Maximum tokens for the response.
    fn max_tokens(&self) -> u32 {
        2048
    }

    /// Timeout of one call.
    fn timeout(&self) -> Duration {
        DEFAULT_AGENT_TIMEOUT
    }

    /// Builds the request: system prompt, then `history`, then `user_msg`.
    fn request(&self, history: &[ChatMessage], user_msg: &str, stream: bool) -> ChatRequest {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(system_message(self.system_prompt()));
        messages.extend_from_slice(history);
        messages.push(user_message(user_msg));
        ChatRequest {
            model: self.model().to_string(),
            messages,
            temperature: Some(self.temperature()),
            max_tokens: Some(self.max_tokens()),
            json_mode: self.json_mode(),
            stream,
        }
    }

    /// Executes the agent with the given user message and no history.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on API failures, timeouts or response parsing
    /// errors.
    async fn execute(
        &self,
        provider: &dyn LlmProvider,
        user_msg: &str,
    ) -> Result<AgentResponse, AgentError> {
        self.execute_with_history(provider, &[], user_msg).await
    }

    /// Executes the agent after replaying `history`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on API failures, timeouts or response parsing
    /// errors.
    async fn execute_with_history(
        &self,
        provider: &dyn LlmProvider,
        history: &[ChatMessage],
        user_msg: &str,
    ) -> Result<AgentResponse, AgentError> {
        let request = self.request(history, user_msg, false);
        let response = chat_with_timeout(provider, &request, self.timeout()).await?;

        Ok(AgentResponse {
            content: response.content,
            usage: response.usage,
            finish_reason: response.finish_reason,
        })
    }
}
