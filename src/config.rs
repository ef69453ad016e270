//! Configuration with builder pattern and opt-in environment support.
//!
//! Configuration is resolved in order: explicit values → environment
//! variables (only when [`ConfigBuilder::from_env`] is called) → defaults.
//! The library never reads the environment on its own.

use std::path::PathBuf;
use std::time::Duration;

use crate::agent::prompt::PromptSet;
use crate::error::AgentError;
use crate::search::knowledge::{DEFAULT_DEDUP_THRESHOLD, KnowledgeConfig};
use crate::search::scoring::FusionWeights;
use crate::search::strategy::{
    DEFAULT_DIVERSITY_THRESHOLD, DEFAULT_QUALITY_THRESHOLD, DEFAULT_SUFFICIENCY_THRESHOLD,
    StrategyOverrides,
};

/// Provider name that disables the language model.
pub const NO_LLM_PROVIDER: &str = "none";

/// Default OpenAI-compatible base URL.
const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
/// Default chat model.
const DEFAULT_MODEL: &str = "deepseek-chat";
/// Default provider-wide result ceiling.
const DEFAULT_MAX_SEARCH_RESULTS: usize = 20;
/// Default number of prior Q/A pairs sent with the answer call.
const DEFAULT_MAX_CONVERSATION_HISTORY: usize = 20;
/// Default search call timeout in seconds.
const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 60;
/// Default model call timeout in seconds.
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;
/// Default max tokens for gap analysis.
const DEFAULT_REASONING_MAX_TOKENS: u32 = 2000;
/// Default max tokens for the final answer.
const DEFAULT_ANSWER_MAX_TOKENS: u32 = 4096;
/// Default maximum concurrent search calls.
const DEFAULT_MAX_CONCURRENCY: usize = 3;

/// Runtime configuration.
#[derive(Clone)]
pub struct Config {
    /// LLM provider name (`"openai"` or `"none"`).
    pub llm_provider: String,
    /// API key for the LLM provider.
    pub llm_api_key: Option<String>,
    /// OpenAI-compatible base URL.
    pub llm_base_url: String,
    /// Chat model.
    pub model: String,
    /// API key for the search provider.
    pub search_api_key: String,
    /// Provider-wide result ceiling, applied on top of the strategy's
    /// per-round cap.
    pub max_search_results: usize,
    /// Prior Q/A pairs kept for the answer call.
    pub max_conversation_history: usize,
    /// Timeout of one search call.
    pub search_timeout: Duration,
    /// Timeout of one model call.
    pub llm_timeout: Duration,
    /// Max tokens for gap analysis.
    pub reasoning_max_tokens: u32,
    /// Max tokens for the final answer.
    pub answer_max_tokens: u32,
    /// Maximum concurrent search calls in a round.
    pub max_concurrency: usize,
    /// Delay applied after acquiring a concurrency permit.
    pub request_delay: Duration,
    /// Salient-term overlap above which results are merged.
    pub dedup_threshold: f64,
    /// Composite weights (normalized).
    pub fusion_weights: FusionWeights,
    /// Strategy overrides; thresholds are always set.
    pub strategy: StrategyOverrides,
    /// Directory with prompt template overrides; `None` uses the
    /// compiled-in prompts.
    pub prompt_dir: Option<PathBuf>,
}

impl Config {
    /// Creates a new builder for `Config`.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if a required key is missing.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }

    /// Whether a language model is configured.
    #[must_use]
    pub fn llm_enabled(&self) -> bool {
        self.llm_provider != NO_LLM_PROVIDER
    }

    /// Knowledge accumulator settings for a run with `quality_threshold`.
    #[must_use]
    pub fn knowledge(&self, quality_threshold: f64) -> KnowledgeConfig {
        KnowledgeConfig {
            dedup_threshold: self.dedup_threshold,
            weights: self.fusion_weights,
            quality_threshold,
            ..KnowledgeConfig::default()
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("llm_provider", &self.llm_provider)
            .field("llm_api_key", &self.llm_api_key.as_ref().map(|_| "<redacted>"))
            .field("llm_base_url", &self.llm_base_url)
            .field("model", &self.model)
            .field("search_api_key", &"<redacted>")
            .field("max_search_results", &self.max_search_results)
            .field("max_conversation_history", &self.max_conversation_history)
            .field("search_timeout", &self.search_timeout)
            .field("llm_timeout", &self.llm_timeout)
            .field("max_concurrency", &self.max_concurrency)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    llm_provider: Option<String>,
    llm_api_key: Option<String>,
    llm_base_url: Option<String>,
    model: Option<String>,
    search_api_key: Option<String>,
    max_search_results: Option<usize>,
    max_conversation_history: Option<usize>,
    search_timeout: Option<Duration>,
    llm_timeout: Option<Duration>,
    reasoning_max_tokens: Option<u32>,
    answer_max_tokens: Option<u32>,
    max_concurrency: Option<usize>,
    request_delay: Option<Duration>,
    dedup_threshold: Option<f64>,
    fusion_weights: Option<(f64, f64, f64)>,
    max_rounds: Option<usize>,
    results_per_round: Option<usize>,
    quality_threshold: Option<f64>,
    sufficiency_threshold: Option<f64>,
    diversity_threshold: Option<f64>,
    prompt_dir: Option<PathBuf>,
}

fn env_string(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok())
        .filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl ConfigBuilder {
    /// Populates unset fields from environment variables.
    ///
    /// The prompt directory falls back to [`PromptSet::default_dir`] under
    /// the user's home.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.llm_provider.is_none() {
            self.llm_provider = env_string(&["DEEPSEARCH_LLM_PROVIDER"]);
        }
        if self.llm_api_key.is_none() {
            self.llm_api_key = env_string(&["DEEPSEEK_API_KEY", "OPENAI_API_KEY"]);
        }
        if self.llm_base_url.is_none() {
            self.llm_base_url = env_string(&["DEEPSEEK_BASE_URL", "OPENAI_BASE_URL"]);
        }
        if self.model.is_none() {
            self.model = env_string(&["DEEPSEEK_MODEL"]);
        }
        if self.search_api_key.is_none() {
            self.search_api_key = env_string(&["TAVILY_API_KEY"]);
        }
        if self.max_search_results.is_none() {
            self.max_search_results = env_parse("MAX_SEARCH_RESULTS");
        }
        if self.max_conversation_history.is_none() {
            self.max_conversation_history = env_parse("MAX_CONVERSATION_HISTORY");
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = env_string(&["DEEPSEARCH_PROMPT_DIR"])
                .map(PathBuf::from)
                .or_else(PromptSet::default_dir);
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn llm_provider(mut self, provider: impl Into<String>) -> Self {
        self.llm_provider = Some(provider.into());
        self
    }

    /// Sets the LLM API key.
    #[must_use]
    pub fn llm_api_key(mut self, key: impl Into<String>) -> Self {
        self.llm_api_key = Some(key.into());
        self
    }

    /// Sets the LLM base URL.
    #[must_use]
    pub fn llm_base_url(mut self, url: impl Into<String>) -> Self {
        self.llm_base_url = Some(url.into());
        self
    }

    /// Sets the chat model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the search API key.
    #[must_use]
    pub fn search_api_key(mut self, key: impl Into<String>) -> Self {
        self.search_api_key = Some(key.into());
        self
    }

    /// Sets the provider-wide result ceiling.
    #[must_use]
    pub const fn max_search_results(mut self, n: usize) -> Self {
        self.max_search_results = Some(n);
        self
    }

    /// Sets the number of prior Q/A pairs kept.
    #[must_use]
    pub const fn max_conversation_history(mut self, n: usize) -> Self {
        self.max_conversation_history = Some(n);
        self
    }

    /// Sets the search call timeout.
    #[must_use]
    pub const fn search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = Some(timeout);
        self
    }

    /// Sets the model call timeout.
    #[must_use]
    pub const fn llm_timeout(mut self, timeout: Duration) -> Self {
        self.llm_timeout = Some(timeout);
        self
    }

    /// Sets the gap analysis max tokens.
    #[must_use]
    pub const fn reasoning_max_tokens(mut self, n: u32) -> Self {
        self.reasoning_max_tokens = Some(n);
        self
    }

    /// Sets the answer max tokens.
    #[must_use]
    pub const fn answer_max_tokens(mut self, n: u32) -> Self {
        self.answer_max_tokens = Some(n);
        self
    }

    /// Sets the maximum concurrency.
    #[must_use]
    pub const fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n);
        self
    }

    /// Sets the delay applied after acquiring a concurrency permit.
    #[must_use]
    pub const fn request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = Some(delay);
        self
    }

    /// Sets the dedup similarity threshold.
    #[must_use]
    pub const fn dedup_threshold(mut self, threshold: f64) -> Self {
        self.dedup_threshold = Some(threshold);
        self
    }

    /// Sets the relevance, authority and recency weights.
    #[must_use]
    pub const fn fusion_weights(mut self, relevance: f64, authority: f64, recency: f64) -> Self {
        self.fusion_weights = Some((relevance, authority, recency));
        self
    }

    /// Overrides the round budget of every strategy.
    #[must_use]
    pub const fn max_rounds(mut self, n: usize) -> Self {
        self.max_rounds = Some(n);
        self
    }

    /// Overrides the per-call result cap of every strategy.
    #[must_use]
    pub const fn results_per_round(mut self, n: usize) -> Self {
        self.results_per_round = Some(n);
        self
    }

    /// Sets the quality threshold.
    #[must_use]
    pub const fn quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = Some(threshold);
        self
    }

    /// Sets the mean active composite required by the quality stop rule.
    #[must_use]
    pub const fn sufficiency_threshold(mut self, threshold: f64) -> Self {
        self.sufficiency_threshold = Some(threshold);
        self
    }

    /// Sets the diversity threshold.
    #[must_use]
    pub const fn diversity_threshold(mut self, threshold: f64) -> Self {
        self.diversity_threshold = Some(threshold);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Builds and validates the [`Config`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if the search key is missing, or
    /// the LLM key is missing while a model provider is configured.
    /// Returns [`AgentError::InvalidConfig`] for out-of-range thresholds or
    /// weights.
    pub fn build(self) -> Result<Config, AgentError> {
        let search_api_key = self
            .search_api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(AgentError::ApiKeyMissing {
                credential: "search",
            })?;

        let llm_provider = self
            .llm_provider
            .map(|p| p.trim().to_lowercase())
            .unwrap_or_else(|| "openai".to_string());
        let llm_api_key = self.llm_api_key.filter(|k| !k.trim().is_empty());
        if llm_provider != NO_LLM_PROVIDER && llm_api_key.is_none() {
            return Err(AgentError::ApiKeyMissing { credential: "llm" });
        }

        let fusion_weights = match self.fusion_weights {
            Some((r, a, t)) => {
                FusionWeights::new(r, a, t).ok_or_else(|| AgentError::InvalidConfig {
                    message: format!(
                        "fusion weights must be non-negative with a positive sum, got {r}/{a}/{t}"
                    ),
                })?
            }
            None => FusionWeights::default(),
        };

        let dedup_threshold = unit_interval(
            "dedup_threshold",
            self.dedup_threshold,
            DEFAULT_DEDUP_THRESHOLD,
        )?;
        let quality_threshold = unit_interval(
            "quality_threshold",
            self.quality_threshold,
            DEFAULT_QUALITY_THRESHOLD,
        )?;
        let sufficiency_threshold = unit_interval(
            "sufficiency_threshold",
            self.sufficiency_threshold,
            DEFAULT_SUFFICIENCY_THRESHOLD,
        )?;
        let diversity_threshold = unit_interval(
            "diversity_threshold",
            self.diversity_threshold,
            DEFAULT_DIVERSITY_THRESHOLD,
        )?;

        Ok(Config {
            llm_provider,
            llm_api_key,
            llm_base_url: self
                .llm_base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            search_api_key,
            max_search_results: self
                .max_search_results
                .unwrap_or(DEFAULT_MAX_SEARCH_RESULTS)
                .max(1),
            max_conversation_history: self
                .max_conversation_history
                .unwrap_or(DEFAULT_MAX_CONVERSATION_HISTORY),
            search_timeout: self
                .search_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_SEARCH_TIMEOUT_SECS)),
            llm_timeout: self
                .llm_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS)),
            reasoning_max_tokens: self
                .reasoning_max_tokens
                .unwrap_or(DEFAULT_REASONING_MAX_TOKENS),
            answer_max_tokens: self.answer_max_tokens.unwrap_or(DEFAULT_ANSWER_MAX_TOKENS),
            max_concurrency: self
                .max_concurrency
                .unwrap_or(DEFAULT_MAX_CONCURRENCY)
                .max(1),
            request_delay: self.request_delay.unwrap_or(Duration::ZERO),
            dedup_threshold,
            fusion_weights,
            strategy: StrategyOverrides {
                max_rounds: self.max_rounds,
                results_per_round: self.results_per_round,
                quality_threshold: Some(quality_threshold),
                sufficiency_threshold: Some(sufficiency_threshold),
                diversity_threshold: Some(diversity_threshold),
            },
            prompt_dir: self.prompt_dir,
        })
    }
}

fn unit_interval(name: &str, value: Option<f64>, default: f64) -> Result<f64, AgentError> {
    let value = value.unwrap_or(default);
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(AgentError::InvalidConfig {
            message: format!("{name} must be in [0, 1], got {value}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ConfigBuilder {
        Config::builder().search_api_key("tvly").llm_api_key("sk")
    }

    #[test]
    fn test_builder_defaults() {
        let config = base().build().unwrap_or_else(|_| unreachable!());
        assert_eq!(config.llm_provider, "openai");
        assert_eq!(config.llm_base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_search_results, DEFAULT_MAX_SEARCH_RESULTS);
        assert_eq!(config.max_conversation_history, DEFAULT_MAX_CONVERSATION_HISTORY);
        assert_eq!(config.search_timeout, Duration::from_secs(60));
        assert_eq!(config.llm_timeout, Duration::from_secs(120));
        assert_eq!(config.reasoning_max_tokens, 2000);
        assert_eq!(config.answer_max_tokens, 4096);
        assert_eq!(config.max_concurrency, 3);
        assert_eq!(config.request_delay, Duration::ZERO);
        assert!((config.dedup_threshold - 0.85).abs() < f64::EPSILON);
        assert_eq!(config.fusion_weights, FusionWeights::default());
        assert_eq!(config.strategy.quality_threshold, Some(0.6));
        assert_eq!(config.strategy.sufficiency_threshold, Some(0.7));
        assert_eq!(config.strategy.diversity_threshold, Some(0.5));
        assert!(config.strategy.max_rounds.is_none());
        assert!(config.prompt_dir.is_none());
        assert!(config.llm_enabled());
    }

    #[test]
    fn test_missing_search_key() {
        let result = Config::builder().llm_api_key("sk").build();
        assert!(matches!(
            result,
            Err(AgentError::ApiKeyMissing {
                credential: "search"
            })
        ));
    }

    #[test]
    fn test_missing_llm_key() {
        let result = Config::builder().search_api_key("tvly").build();
        assert!(matches!(
            result,
            Err(AgentError::ApiKeyMissing { credential: "llm" })
        ));
    }

    #[test]
    fn test_llm_disabled_needs_no_key() {
        let config = Config::builder()
            .search_api_key("tvly")
            .llm_provider("None")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert!(!config.llm_enabled());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            base().quality_threshold(1.5).build(),
            Err(AgentError::InvalidConfig { .. })
        ));
        assert!(matches!(
            base().fusion_weights(0.0, 0.0, 0.0).build(),
            Err(AgentError::InvalidConfig { .. })
        ));
        assert!(matches!(
            base().dedup_threshold(-0.1).build(),
            Err(AgentError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_custom_values() {
        let config = base()
            .fusion_weights(2.0, 1.0, 1.0)
            .max_rounds(2)
            .results_per_round(7)
            .max_concurrency(0)
            .model("gpt-4o-mini")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert!((config.fusion_weights.relevance - 0.5).abs() < 1e-9);
        assert_eq!(config.strategy.max_rounds, Some(2));
        assert_eq!(config.strategy.results_per_round, Some(7));
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.model, "gpt-4o-mini");
        let knowledge = config.knowledge(0.7);
        assert!((knowledge.quality_threshold - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_debug_redacts_keys() {
        let config = base().build().unwrap_or_else(|_| unreachable!());
        let debug = format!("{config:?}");
        assert!(!debug.contains("tvly"));
        assert!(!debug.contains("\"sk\""));
    }
}
