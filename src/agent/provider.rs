//! Pluggable LLM provider trait.
//!
//! Implementations translate provider-agnostic [`ChatRequest`]/[`ChatResponse`]
//! into provider-specific SDK calls, so agents and the retrieval loop never
//! depend on a particular vendor.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::Stream;

use super::message::{ChatRequest, ChatResponse};
use crate::error::AgentError;

/// Stream of text chunks from a streaming completion.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, AgentError>> + Send>>;

/// Trait for LLM provider backends.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., `"openai"`).
    fn name(&self) -> &'static str;

    /// Executes a chat completion request.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on API failures, timeouts, or parse errors.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError>;

    /// Executes a streaming chat completion request.
    ///
    /// Returns a stream of text chunks as they arrive from the provider.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on connection or streaming failures.
    async fn chat_stream(&self, request: &ChatRequest) -> Result<TextStream, AgentError>;
}

/// Runs [`LlmProvider::chat`] under `timeout`.
///
/// # Errors
///
/// Returns [`AgentError::ProviderTimeout`] when the call does not finish in
/// time, or the provider's own error.
pub async fn chat_with_timeout(
    provider: &dyn LlmProvider,
    request: &ChatRequest,
    timeout: Duration,
) -> Result<ChatResponse, AgentError> {
    tokio::time::timeout(timeout, provider.chat(request))
        .await
        .unwrap_or_else(|_| {
            Err(AgentError::ProviderTimeout {
                provider: provider.name().to_string(),
                timeout,
            })
        })
}

/// Opens a [`LlmProvider::chat_stream`] under `timeout`.
///
/// The timeout covers opening the stream, not reading it.
///
/// # Errors
///
/// Returns [`AgentError::ProviderTimeout`] when the stream does not open in
/// time, or the provider's own error.
pub async fn stream_with_timeout(
    provider: &dyn LlmProvider,
    request: &ChatRequest,
    timeout: Duration,
) -> Result<TextStream, AgentError> {
    tokio::time::timeout(timeout, provider.chat_stream(request))
        .await
        .unwrap_or_else(|_| {
            Err(AgentError::ProviderTimeout {
                provider: provider.name().to_string(),
                timeout,
            })
        })
}
