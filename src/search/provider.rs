//! Pluggable web search trait.
//!
//! Implementations translate [`SearchParams`] into a vendor request and the
//! vendor response into ordered [`RawHit`]s. Everything downstream works on
//! these provider-agnostic types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// How hard the provider should search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    /// Fast, shallow search.
    #[default]
    Basic,
    /// Slower search with more extracted content.
    Advanced,
}

impl SearchDepth {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Advanced => "advanced",
        }
    }
}

impl std::fmt::Display for SearchDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of one search call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Result cap.
    pub max_results: usize,
    /// Depth hint.
    pub depth: SearchDepth,
    /// Restrict results to these domains (empty = no restriction).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_domains: Vec<String>,
    /// Drop results from these domains.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_domains: Vec<String>,
}

impl SearchParams {
    /// Creates parameters with the given cap and no domain hints.
    #[must_use]
    pub const fn new(max_results: usize, depth: SearchDepth) -> Self {
        Self {
            max_results,
            depth,
            include_domains: Vec::new(),
            exclude_domains: Vec::new(),
        }
    }
}

/// One result as returned by a provider, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    /// Result URL.
    pub url: String,
    /// Page title.
    #[serde(default)]
    pub title: String,
    /// Extracted content or snippet.
    #[serde(default)]
    pub content: String,
    /// Provider relevance score (any range; clamped on normalization).
    #[serde(default)]
    pub score: f64,
    /// Publication date as reported by the provider, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
}

/// Trait for web search backends.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Provider name (e.g., `"tavily"`).
    fn name(&self) -> &'static str;

    /// Runs one search.
    ///
    /// Returns hits in provider order. An empty vector is a valid answer.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ProviderError`] on transport or API failures.
    async fn search(&self, query: &str, params: &SearchParams) -> Result<Vec<RawHit>, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_serialization_skips_empty_hints() {
        let params = SearchParams::new(10, SearchDepth::Advanced);
        let json = serde_json::to_string(&params).unwrap_or_default();
        assert!(json.contains("\"advanced\""));
        assert!(!json.contains("include_domains"));
        assert!(!json.contains("exclude_domains"));
    }

    #[test]
    fn test_raw_hit_defaults() {
        let hit: RawHit = serde_json::from_str(r#"{"url": "https://example.com"}"#)
            .unwrap_or_else(|_| unreachable!());
        assert!(hit.title.is_empty());
        assert!(hit.score.abs() < f64::EPSILON);
        assert!(hit.published_at.is_none());
    }

    #[test]
    fn test_depth_display() {
        assert_eq!(SearchDepth::Basic.to_string(), "basic");
        assert_eq!(SearchDepth::default(), SearchDepth::Basic);
    }
}
