//! Tavily search backend.
//!
//! Talks to `POST https://api.tavily.com/search` with `reqwest` (rustls).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AgentError;
use crate::search::provider::{RawHit, SearchParams, WebSearch};

/// Default Tavily endpoint.
pub const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

/// Tavily web search provider.
pub struct TavilySearch {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    search_depth: &'static str,
    include_answer: bool,
    #[serde(skip_serializing_if = "is_empty")]
    include_domains: &'a [String],
    #[serde(skip_serializing_if = "is_empty")]
    exclude_domains: &'a [String],
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_empty(domains: &&[String]) -> bool {
    domains.is_empty()
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    published_date: Option<String>,
}

impl TavilySearch {
    /// Creates a provider with the given API key and per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] for an empty key and
    /// [`AgentError::InvalidConfig`] if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, AgentError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AgentError::ApiKeyMissing {
                credential: "search",
            });
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::InvalidConfig {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            api_key,
            endpoint: TAVILY_ENDPOINT.to_string(),
        })
    }

    /// Points the provider at a different endpoint (proxies, test servers).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn build_request<'a>(&'a self, query: &'a str, params: &'a SearchParams) -> TavilyRequest<'a> {
        TavilyRequest {
            api_key: &self.api_key,
            query,
            max_results: params.max_results,
            search_depth: params.depth.as_str(),
            include_answer: false,
            include_domains: &params.include_domains,
            exclude_domains: &params.exclude_domains,
        }
    }

    fn convert(response: TavilyResponse) -> Vec<RawHit> {
        response
            .results
            .into_iter()
            .filter(|r| !r.url.trim().is_empty())
            .map(|r| RawHit {
                url: r.url,
                title: r.title,
                content: r.content,
                score: r.score,
                published_at: r.published_date,
            })
            .collect()
    }
}

impl std::fmt::Debug for TavilySearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TavilySearch")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl WebSearch for TavilySearch {
    fn name(&self) -> &'static str {
        "tavily"
    }

    async fn search(&self, query: &str, params: &SearchParams) -> Result<Vec<RawHit>, AgentError> {
        debug!(query, max_results = params.max_results, depth = %params.depth, "tavily search");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&self.build_request(query, params))
            .send()
            .await
            .map_err(|e| AgentError::ProviderError {
                provider: "tavily".to_string(),
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::ProviderError {
                provider: "tavily".to_string(),
                message: format!("HTTP {status}: {body}"),
                status: Some(status.as_u16()),
            });
        }

        let parsed: TavilyResponse =
            response
                .json()
                .await
                .map_err(|e| AgentError::ProviderError {
                    provider: "tavily".to_string(),
                    message: format!("failed to parse response: {e}"),
                    status: Some(status.as_u16()),
                })?;

        Ok(Self::convert(parsed))
    }
}
