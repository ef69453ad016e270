//! Round executor.
//!
//! Issues the queries of one round against a [`WebSearch`] backend and
//! normalizes the hits into [`SearchResult`]s. Queries of the same round run
//! concurrently, bounded by a semaphore, and each call carries its own
//! timeout. The round's results are returned only after every call has
//! finished or timed out.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::provider::{RawHit, SearchParams, WebSearch};
use crate::error::AgentError;

/// A normalized search result. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Result URL as returned by the provider.
    pub url: String,
    /// Page title.
    pub title: String,
    /// Extracted content.
    pub content: String,
    /// Provider score clamped to `[0, 1]`.
    pub source_score: f64,
    /// Round that fetched this result.
    pub fetched_in_round: usize,
    /// Publication time, when the provider reported a parseable date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Query that produced this result.
    pub query: String,
}

impl SearchResult {
    /// Normalizes a provider hit fetched in `round` for `query`.
    #[must_use]
    pub fn from_hit(hit: RawHit, round: usize, query: &str) -> Self {
        let source_score = if hit.score.is_finite() {
            hit.score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            url: hit.url.trim().to_string(),
            title: hit.title.trim().to_string(),
            content: hit.content,
            source_score,
            fetched_in_round: round,
            published_at: hit.published_at.as_deref().and_then(parse_published),
            query: query.to_string(),
        }
    }
}

/// Parses the date formats search providers commonly return.
#[must_use]
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Outcome of a single search call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// The provider returned results.
    Ok,
    /// The provider answered with nothing.
    Empty,
    /// The call failed or timed out.
    Failed,
}

/// Per-call record kept in the round history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallReport {
    /// Issued query.
    pub query: String,
    /// Results kept from this call.
    pub hits: usize,
    /// Call outcome.
    pub status: CallStatus,
    /// Error message for empty or failed calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall time of the call in milliseconds.
    pub elapsed_ms: u64,
}

/// Everything one round fetched.
#[derive(Debug, Clone, Default)]
pub struct RoundOutput {
    /// Normalized results in query order, then provider order.
    pub results: Vec<SearchResult>,
    /// One report per issued query.
    pub calls: Vec<CallReport>,
}

impl RoundOutput {
    /// Number of calls that failed.
    #[must_use]
    pub fn failed_calls(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| c.status == CallStatus::Failed)
            .count()
    }
}

/// Executes the search calls of one round.
pub struct RoundExecutor {
    search: Arc<dyn WebSearch>,
    timeout: Duration,
    max_concurrency: usize,
    max_search_results: usize,
    request_delay: Duration,
}

impl RoundExecutor {
    /// Creates an executor with the given backend and per-call timeout.
    #[must_use]
    pub fn new(search: Arc<dyn WebSearch>, timeout: Duration) -> Self {
        Self {
            search,
            timeout,
            max_concurrency: 3,
            max_search_results: 20,
            request_delay: Duration::ZERO,
        }
    }

    /// Sets the maximum number of concurrent calls.
    #[must_use]
    pub const fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    /// Sets the provider-wide result ceiling applied on top of the
    /// per-round cap.
    #[must_use]
    pub const fn with_max_search_results(mut self, n: usize) -> Self {
        self.max_search_results = n;
        self
    }

    /// Sets the delay applied after acquiring a concurrency permit.
    #[must_use]
    pub const fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Name of the underlying backend.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.search.name()
    }

    /// Runs `queries` for `round`.
    ///
    /// Failed and empty calls contribute zero results. No queries at all is
    /// a zero-yield round, not a failure.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::RoundFailed`] when every issued call failed.
    pub async fn execute(
        &self,
        round: usize,
        queries: &[String],
        params: &SearchParams,
    ) -> Result<RoundOutput, AgentError> {
        if queries.is_empty() {
            return Ok(RoundOutput::default());
        }

        let cap = params.max_results.min(self.max_search_results).max(1);
        let mut params = params.clone();
        params.max_results = cap;
        let params = Arc::new(params);

        let outcomes = self.fan_out(queries, &params).await;

        let mut output = RoundOutput::default();
        for (query, (outcome, elapsed)) in queries.iter().zip(outcomes) {
            let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
            match outcome {
                Ok(hits) if hits.is_empty() => {
                    let error = AgentError::EmptyResultSet {
                        query: query.clone(),
                    };
                    debug!(round, %error, "empty search call");
                    output.calls.push(CallReport {
                        query: query.clone(),
                        hits: 0,
                        status: CallStatus::Empty,
                        error: Some(error.to_string()),
                        elapsed_ms,
                    });
                }
                Ok(hits) => {
                    let kept: Vec<SearchResult> = hits
                        .into_iter()
                        .take(cap)
                        .map(|hit| SearchResult::from_hit(hit, round, query))
                        .collect();
                    debug!(round, query = %query, hits = kept.len(), "search call succeeded");
                    output.calls.push(CallReport {
                        query: query.clone(),
                        hits: kept.len(),
                        status: CallStatus::Ok,
                        error: None,
                        elapsed_ms,
                    });
                    output.results.extend(kept);
                }
                Err(error) => {
                    warn!(round, query = %query, %error, "search call failed");
                    output.calls.push(CallReport {
                        query: query.clone(),
                        hits: 0,
                        status: CallStatus::Failed,
                        error: Some(error.to_string()),
                        elapsed_ms,
                    });
                }
            }
        }

        if output.failed_calls() == output.calls.len() {
            return Err(AgentError::RoundFailed {
                round,
                failures: output
                    .calls
                    .into_iter()
                    .filter_map(|c| c.error)
                    .collect(),
            });
        }

        Ok(output)
    }

    /// Fans the calls out concurrently and collects them in query order.
    async fn fan_out(
        &self,
        queries: &[String],
        params: &Arc<SearchParams>,
    ) -> Vec<(Result<Vec<RawHit>, AgentError>, Duration)> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency.max(1)));
        let mut handles = Vec::with_capacity(queries.len());

        for query in queries {
            let sem = Arc::clone(&semaphore);
            let search = Arc::clone(&self.search);
            let params = Arc::clone(params);
            let query = query.clone();
            let timeout = self.timeout;
            let request_delay = self.request_delay;

            let handle = tokio::spawn(async move {
                let _permit = sem.acquire().await.map_err(|e| AgentError::Orchestration {
                    message: format!("semaphore acquire failed: {e}"),
                })?;

                if !request_delay.is_zero() {
                    tokio::time::sleep(request_delay).await;
                }

                match tokio::time::timeout(timeout, search.search(&query, &params)).await {
                    Ok(result) => result,
                    Err(_) => Err(AgentError::ProviderTimeout {
                        provider: search.name().to_string(),
                        timeout,
                    }),
                }
            });
            handles.push((handle, Instant::now()));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (handle, started) in handles {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(e) => Err(AgentError::Orchestration {
                    message: format!("search task join failed: {e}"),
                }),
            };
            results.push((outcome, started.elapsed()));
        }
        results
    }
}

impl std::fmt::Debug for RoundExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundExecutor")
            .field("provider", &self.search.name())
            .field("timeout", &self.timeout)
            .field("max_concurrency", &self.max_concurrency)
            .field("max_search_results", &self.max_search_results)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::provider::SearchDepth;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WebSearch for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn search(
            &self,
            query: &str,
            params: &SearchParams,
        ) -> Result<Vec<RawHit>, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match query {
                "fail" => Err(AgentError::ProviderError {
                    provider: "scripted".to_string(),
                    message: "boom".to_string(),
                    status: Some(500),
                }),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(Vec::new())
                }
                "empty" => Ok(Vec::new()),
                _ => Ok((0..params.max_results + 5)
                    .map(|i| RawHit {
                        url: format!("https://{query}.example.com/{i}"),
                        title: format!("{query} {i}"),
                        content: format!("content about {query}"),
                        score: 1.5,
                        published_at: Some("2024-01-02".to_string()),
                    })
                    .collect()),
            }
        }
    }

    fn executor() -> RoundExecutor {
        RoundExecutor::new(
            Arc::new(Scripted {
                calls: AtomicUsize::new(0),
            }),
            Duration::from_millis(100),
        )
        .with_max_search_results(4)
    }

    fn queries(qs: &[&str]) -> Vec<String> {
        qs.iter().map(|q| (*q).to_string()).collect()
    }

    #[tokio::test]
    async fn test_results_are_capped_and_normalized() {
        let params = SearchParams::new(10, SearchDepth::Basic);
        let output = executor()
            .execute(2, &queries(&["rust"]), &params)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(output.results.len(), 4);
        let first = &output.results[0];
        assert_eq!(first.fetched_in_round, 2);
        assert!((first.source_score - 1.0).abs() < f64::EPSILON);
        assert!(first.published_at.is_some());
        assert_eq!(first.query, "rust");
    }

    #[tokio::test]
    async fn test_partial_failure_is_absorbed() {
        let params = SearchParams::new(2, SearchDepth::Advanced);
        let output = executor()
            .execute(0, &queries(&["fail", "go", "empty"]), &params)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(output.results.len(), 2);
        assert_eq!(output.calls.len(), 3);
        assert_eq!(output.calls[0].status, CallStatus::Failed);
        assert_eq!(output.calls[1].status, CallStatus::Ok);
        assert_eq!(output.calls[2].status, CallStatus::Empty);
        assert_eq!(output.failed_calls(), 1);
    }

    #[tokio::test]
    async fn test_all_failed_round() {
        let params = SearchParams::new(2, SearchDepth::Advanced);
        let result = executor()
            .execute(1, &queries(&["fail", "slow"]), &params)
            .await;
        match result {
            Err(AgentError::RoundFailed { round, failures }) => {
                assert_eq!(round, 1);
                assert_eq!(failures.len(), 2);
                assert!(failures[1].contains("timed out"));
            }
            other => unreachable!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_round_is_not_failed() {
        let params = SearchParams::new(2, SearchDepth::Basic);
        let output = executor()
            .execute(0, &queries(&["empty"]), &params)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(output.results.is_empty());

        let output = executor()
            .execute(0, &[], &params)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(output.calls.is_empty());
    }

    #[test]
    fn test_parse_published_formats() {
        assert!(parse_published("2024-03-01T12:00:00Z").is_some());
        assert!(parse_published("Fri, 01 Mar 2024 12:00:00 GMT").is_some());
        assert!(parse_published("2024-03-01 08:30:00").is_some());
        assert!(parse_published("2024-03-01").is_some());
        assert!(parse_published("last tuesday").is_none());
    }

    #[test]
    fn test_non_finite_score() {
        let hit = RawHit {
            url: " https://a.com ".to_string(),
            title: "t".to_string(),
            content: String::new(),
            score: f64::NAN,
            published_at: None,
        };
        let result = SearchResult::from_hit(hit, 0, "q");
        assert_eq!(result.url, "https://a.com");
        assert!(result.source_score.abs() < f64::EPSILON);
    }
}
