//! Provider registry and factory.
//!
//! Maps provider names to concrete [`LlmProvider`] implementations.

use std::sync::Arc;

use crate::agent::provider::LlmProvider;
use crate::config::{Config, NO_LLM_PROVIDER};
use crate::error::AgentError;

/// Creates an [`LlmProvider`] based on the configured provider name.
///
/// # Supported Providers
///
/// - `"openai"` (default): OpenAI-compatible APIs via `async-openai`
/// - `"none"`: no model; returns `Ok(None)` and the loop runs rule-only
///
/// # Errors
///
/// Returns [`AgentError::UnsupportedProvider`] for unknown provider names,
/// or for `"openai"` when the crate was built without the `openai` feature.
pub fn create_provider(config: &Config) -> Result<Option<Arc<dyn LlmProvider>>, AgentError> {
    match config.llm_provider.as_str() {
        NO_LLM_PROVIDER => Ok(None),
        #[cfg(feature = "openai")]
        "openai" => Ok(Some(Arc::new(
            crate::agent::providers::OpenAiProvider::new(config)?,
        ))),
        other => Err(AgentError::UnsupportedProvider {
            name: other.to_string(),
        }),
    }
}
