//! Answer agent.
//!
//! Turns the active knowledge of a finished loop into the final answer,
//! optionally streaming it chunk by chunk. When no model is available, or
//! the model fails, [`degraded_answer`] builds an extractive answer so a
//! finished process always carries one.

use std::fmt::Write;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use super::message::{ChatMessage, TokenUsage};
use super::prompt::{SourceContext, build_answer_prompt};
use super::provider::{LlmProvider, stream_with_timeout};
use super::traits::Agent;
use crate::config::Config;
use crate::error::AgentError;

/// Sources quoted in a degraded answer.
const DEGRADED_SOURCES: usize = 5;
/// Characters quoted per source in a degraded answer.
const DEGRADED_EXCERPT_CHARS: usize = 280;

/// Sent on the answer stream when generation fails after some text was
/// already delivered, so the listener can tell the partial answer from the
/// extractive one that follows.
pub const STREAM_INTERRUPTED: &str = "\n\n[answer interrupted; showing collected sources instead]\n\n";

/// Sends `chunk` to the answer stream. A dropped receiver is not an error.
pub fn forward(tx: &UnboundedSender<String>, chunk: String) {
    if tx.send(chunk).is_err() {
        debug!("answer stream receiver dropped");
    }
}

/// Agent that writes the final answer from accumulated sources.
pub struct AnswerAgent {
    model: String,
    max_tokens: u32,
    timeout: Duration,
    system_prompt: String,
}

/// Text and usage of a generated answer.
#[derive(Debug, Clone)]
pub struct GeneratedAnswer {
    /// Answer text.
    pub content: String,
    /// Token usage (zero when streamed).
    pub usage: TokenUsage,
}

impl AnswerAgent {
    /// Creates a new answer agent with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &Config, system_prompt: String) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.answer_max_tokens,
            timeout: config.llm_timeout,
            system_prompt,
        }
    }

    /// Generates the answer.
    ///
    /// With `stream` set, chunks are forwarded to the channel as they
    /// arrive; a closed receiver does not stop generation.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on provider or stream failures, and
    /// [`AgentError::EmptyResultSet`] if the model produced no text.
    pub async fn answer(
        &self,
        provider: &dyn LlmProvider,
        history: &[ChatMessage],
        query: &str,
        sources: &[SourceContext<'_>],
        stream: Option<&UnboundedSender<String>>,
    ) -> Result<GeneratedAnswer, AgentError> {
        let user_msg = build_answer_prompt(query, sources);

        let generated = match stream {
            None => {
                let response = self
                    .execute_with_history(provider, history, &user_msg)
                    .await?;
                GeneratedAnswer {
                    content: response.content,
                    usage: response.usage,
                }
            }
            Some(tx) => {
                let request = self.request(history, &user_msg, true);
                let mut chunks = stream_with_timeout(provider, &request, self.timeout).await?;
                let mut content = String::new();
                while let Some(chunk) = chunks.next().await {
                    let chunk = match chunk {
                        Ok(chunk) => chunk,
                        Err(error) => {
                            if !content.is_empty() {
                                forward(tx, STREAM_INTERRUPTED.to_string());
                            }
                            return Err(error);
                        }
                    };
                    if chunk.is_empty() {
                        continue;
                    }
                    content.push_str(&chunk);
                    forward(tx, chunk);
                }
                GeneratedAnswer {
                    content,
                    usage: TokenUsage::default(),
                }
            }
        };

        if generated.content.trim().is_empty() {
            return Err(AgentError::EmptyResultSet {
                query: query.to_string(),
            });
        }
        debug!(chars = generated.content.len(), "answer generated");
        Ok(generated)
    }
}

#[async_trait]
impl Agent for AnswerAgent {
    fn name(&self) -> &'static str {
        "answer"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn temperature(&self) -> f32 {
        0.2
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn excerpt(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(DEGRADED_EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}…", &flat[..idx]),
        None => flat,
    }
}

/// Builds an extractive answer from the strongest sources.
///
/// Used when no model is configured or the answer call fails.
#[must_use]
pub fn degraded_answer(query: &str, sources: &[SourceContext<'_>], rounds: usize) -> String {
    let mut out = String::new();
    if sources.is_empty() {
        let _ = write!(
            out,
            "No reliable sources were found for \"{query}\" after {rounds} search round(s)."
        );
        return out;
    }

    let _ = writeln!(
        out,
        "Collected {} source(s) for \"{query}\" over {rounds} search round(s). \
         A generated summary is unavailable; the strongest sources follow.\n",
        sources.len()
    );
    for (i, s) in sources.iter().take(DEGRADED_SOURCES).enumerate() {
        let title = if s.title.is_empty() { s.url } else { s.title };
        let _ = writeln!(out, "{}. **{title}** ({:.2})", i + 1, s.score);
        let _ = writeln!(out, "   {}", s.url);
        let text = excerpt(s.content);
        if !text.is_empty() {
            let _ = writeln!(out, "   {text}");
        }
    }
    out.trim_end().to_string()
}
