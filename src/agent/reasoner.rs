//! Gap-analysis (reasoning) agent.
//!
//! Reviews the accumulated knowledge after a round and proposes the next
//! search queries. Its output is advisory: the controller filters the
//! queries and never lets the model decide termination.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::prompt::{ReasoningContext, build_reasoning_prompt};
use super::provider::LlmProvider;
use super::traits::{Agent, AgentResponse};
use crate::config::Config;
use crate::error::AgentError;

/// Parsed gap analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GapAnalysis {
    /// Model's estimate of coverage, clamped to `[0, 1]` on parse.
    #[serde(default)]
    pub understanding: f64,
    /// Open gaps.
    #[serde(default)]
    pub knowledge_gaps: Vec<String>,
    /// Why the queries were chosen.
    #[serde(default)]
    pub reasoning: String,
    /// Proposed queries.
    #[serde(default)]
    pub queries: Vec<String>,
    /// Advisory continue flag; recorded, never acted on.
    #[serde(default = "default_true")]
    pub should_continue: bool,
}

const fn default_true() -> bool {
    true
}

/// Agent that proposes follow-up queries.
pub struct GapAnalyst {
    model: String,
    max_tokens: u32,
    timeout: Duration,
    system_prompt: String,
}

impl GapAnalyst {
    /// Creates a new gap analyst with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &Config, system_prompt: String) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.reasoning_max_tokens,
            timeout: config.llm_timeout,
            system_prompt,
        }
    }

    /// Runs gap analysis for the given loop state.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on provider failures and
    /// [`AgentError::ResponseParse`] if the response is not the expected JSON.
    pub async fn analyze(
        &self,
        provider: &dyn LlmProvider,
        ctx: &ReasoningContext<'_>,
    ) -> Result<(GapAnalysis, AgentResponse), AgentError> {
        let response = self.execute(provider, &build_reasoning_prompt(ctx)).await?;
        let analysis = Self::parse_analysis(&response.content)?;
        Ok((analysis, response))
    }

    /// Parses the agent's JSON response, tolerating markdown code fences.
    fn parse_analysis(content: &str) -> Result<GapAnalysis, AgentError> {
        let trimmed = content.trim();

        let json_str = if trimmed.starts_with("```") {
            trimmed
                .trim_start_matches("```json")
                .trim_start_matches("```")
                .trim_end_matches("```")
                .trim()
        } else {
            trimmed
        };

        let mut analysis: GapAnalysis =
            serde_json::from_str(json_str).map_err(|e| AgentError::ResponseParse {
                message: format!("Failed to parse gap analysis: {e}"),
                content: content.to_string(),
            })?;
        analysis.understanding = if analysis.understanding.is_finite() {
            analysis.understanding.clamp(0.0, 1.0)
        } else {
            0.0
        };
        analysis.queries = analysis
            .queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        Ok(analysis)
    }
}

#[async_trait]
impl Agent for GapAnalyst {
    fn name(&self) -> &'static str {
        "gap_analyst"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn json_mode(&self) -> bool {
        true
    }

    fn temperature(&self) -> f32 {
        0.3
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
