//! Reflection controller.
//!
//! Drives the retrieval loop as a state machine:
//!
//! ```text
//! REASONING → ACTING → OBSERVING → REFLECTING → (REASONING | STOPPED)
//! ```
//!
//! - **Reasoning** picks the round's queries: classifier variants for round
//!   0, then model gap analysis when a model is available, else the
//!   deterministic follow-up rule. An issued query is never issued again.
//! - **Acting** runs the queries through the [`RoundExecutor`]. Follow-up
//!   rounds prefer the profile's priority domains unless the previous round
//!   asked for diversity exclusions.
//! - **Observing** merges the round into the [`KnowledgeBase`] in one step.
//! - **Reflecting** applies the stop rule, in order: knowledge sufficient
//!   (mean active composite at or above the sufficiency threshold, with
//!   enough source diversity), no new information for two consecutive
//!   rounds, round budget exhausted.
//!
//! The model only ever proposes queries. Termination is decided here.
//! Cancellation is checked between rounds; an in-flight round always
//! finishes.

use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::classifier::{ComplexityProfile, angle_suffixes};
use super::executor::{CallReport, CallStatus, RoundExecutor, RoundOutput};
use super::knowledge::{KnowledgeBase, KnowledgeConfig, KnowledgeItem};
use super::process::{QuerySource, ReflectionDecision, RoundRecord, StopReason};
use super::provider::SearchParams;
use super::strategy::{Strategy, overview_suffix, priority_domains};
use crate::agent::prompt::{ReasoningContext, SourceContext};
use crate::agent::provider::LlmProvider;
use crate::agent::reasoner::GapAnalyst;
use crate::core::query::is_han;
use crate::core::{Query, salient_terms};
use crate::error::AgentError;

/// Consecutive zero-yield rounds that end the loop.
pub const DRY_ROUNDS_TO_STOP: usize = 2;
/// Active items shown to the gap analyst and mined by the follow-up rule.
const CONTEXT_ITEMS: usize = 5;

/// Phase of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Choosing the next queries.
    Reasoning,
    /// Running search calls.
    Acting,
    /// Merging results.
    Observing,
    /// Applying the stop rule.
    Reflecting,
    /// Done.
    Stopped,
}

/// Model collaborator for gap analysis.
#[derive(Clone, Copy)]
pub struct Advisor<'a> {
    /// Model backend.
    pub provider: &'a dyn LlmProvider,
    /// Gap-analysis agent.
    pub analyst: &'a GapAnalyst,
}

/// Everything the loop produced.
#[derive(Debug)]
pub struct LoopOutcome {
    /// One record per completed round.
    pub rounds: Vec<RoundRecord>,
    /// Accumulated knowledge.
    pub knowledge: KnowledgeBase,
    /// Why the loop stopped.
    pub stop_reason: StopReason,
    /// Model calls made.
    pub llm_calls: usize,
}

/// Runs the Reason → Act → Observe → Reflect loop for one query.
pub struct ReflectionController<'a> {
    query: &'a Query,
    profile: &'a ComplexityProfile,
    strategy: Strategy,
    executor: &'a RoundExecutor,
    advisor: Option<Advisor<'a>>,
    knowledge: KnowledgeBase,
    now: DateTime<Utc>,
    phase: Phase,
    issued: Vec<String>,
    issued_keys: HashSet<String>,
    rounds: Vec<RoundRecord>,
    dry_streak: usize,
    diversity_exclusions: Vec<String>,
    priority_domains: Vec<String>,
    llm_calls: usize,
}

impl<'a> ReflectionController<'a> {
    /// Creates a controller. `now` is the reference time for recency.
    #[must_use]
    pub fn new(
        query: &'a Query,
        profile: &'a ComplexityProfile,
        strategy: Strategy,
        executor: &'a RoundExecutor,
        knowledge: KnowledgeConfig,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            query,
            profile,
            strategy,
            executor,
            advisor: None,
            knowledge: KnowledgeBase::new(knowledge, query.text(), &profile.variants),
            now,
            phase: Phase::Reasoning,
            issued: Vec::new(),
            issued_keys: HashSet::new(),
            rounds: Vec::new(),
            dry_streak: 0,
            diversity_exclusions: Vec::new(),
            priority_domains: priority_domains(&profile.domain_hints),
            llm_calls: 0,
        }
    }

    /// Enables model gap analysis.
    #[must_use]
    pub const fn with_advisor(mut self, advisor: Advisor<'a>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    fn transition(&mut self, next: Phase) {
        debug!(from = ?self.phase, to = ?next, round = self.rounds.len(), "phase transition");
        self.phase = next;
    }

    /// Runs the loop to completion.
    pub async fn run(mut self, cancel: &CancellationToken) -> LoopOutcome {
        let mut round = 0;
        let (mut queries, mut source, mut note) = self.seed_queries();

        let stop_reason = loop {
            if cancel.is_cancelled() {
                info!(round, "cancelled before round");
                break StopReason::Cancelled;
            }

            self.transition(Phase::Acting);
            let started = Instant::now();
            let params = self.params(round);
            let (output, failed) = match self.executor.execute(round, &queries, &params).await {
                Ok(output) => (output, false),
                Err(error) => {
                    warn!(round, %error, "round produced no results");
                    (failed_output(&queries, error), true)
                }
            };
            for q in &queries {
                self.issued_keys.insert(query_key(q));
                self.issued.push(q.clone());
            }

            self.transition(Phase::Observing);
            let results_received = output.results.len();
            let report = self
                .knowledge
                .observe_round(round, &queries, output.results, self.now);
            let ok_calls = output
                .calls
                .iter()
                .filter(|c| c.status == CallStatus::Ok)
                .count();
            let mean = self.knowledge.mean_active_composite();
            let diversity = self.knowledge.diversity();
            let observation_summary = format!(
                "{results_received} results from {ok_calls}/{} calls; {} new active items \
                 ({} active, {} pooled); mean quality {mean:.2}, diversity {diversity:.2}",
                output.calls.len(),
                report.new_active,
                self.knowledge.active_count(),
                self.knowledge.side_pool().count(),
            );

            self.transition(Phase::Reflecting);
            self.dry_streak = if report.new_active == 0 {
                self.dry_streak + 1
            } else {
                0
            };
            let stop = self.should_stop(round);
            let decision = if stop.is_some() {
                ReflectionDecision::Stop
            } else {
                ReflectionDecision::Continue
            };
            let excluded_domains = params.exclude_domains.clone();
            let included_domains = params.include_domains.clone();
            self.diversity_exclusions = if diversity < self.strategy.diversity_threshold {
                self.knowledge.dominant_domains()
            } else {
                Vec::new()
            };

            info!(
                round,
                new_active = report.new_active,
                mean,
                diversity,
                ?decision,
                stop_reason = ?stop,
                "round reflected"
            );

            self.rounds.push(RoundRecord {
                round_index: round,
                reasoning_note: note,
                action_taken: format!(
                    "searched {} quer{} ({} depth, up to {} results each)",
                    queries.len(),
                    if queries.len() == 1 { "y" } else { "ies" },
                    params.depth,
                    params.max_results,
                ),
                queries: std::mem::take(&mut queries),
                query_source: source,
                excluded_domains,
                included_domains,
                calls: output.calls,
                failed,
                results_received,
                new_knowledge_count: report.new_active,
                active_total: self.knowledge.active_count(),
                mean_composite: mean,
                diversity,
                observation_summary,
                reflection_decision: decision,
                elapsed: started.elapsed(),
            });

            if let Some(reason) = stop {
                break reason;
            }

            round += 1;
            self.transition(Phase::Reasoning);
            (queries, source, note) = self.plan_next(round).await;
        };

        self.transition(Phase::Stopped);
        LoopOutcome {
            rounds: self.rounds,
            knowledge: self.knowledge,
            stop_reason,
            llm_calls: self.llm_calls,
        }
    }

    /// Applies the stop rule after `round` has been merged.
    fn should_stop(&self, round: usize) -> Option<StopReason> {
        let quality = self.knowledge.active_count() > 0
            && self.knowledge.mean_active_composite() >= self.strategy.sufficiency_threshold
            && self.knowledge.diversity() >= self.strategy.diversity_threshold;
        if quality {
            Some(StopReason::QualitySatisfied)
        } else if self.dry_streak >= DRY_ROUNDS_TO_STOP {
            Some(StopReason::NoNewInformation)
        } else if round + 1 >= self.strategy.max_rounds {
            Some(StopReason::BudgetExhausted)
        } else {
            None
        }
    }

    fn params(&self, round: usize) -> SearchParams {
        let mut params =
            SearchParams::new(self.strategy.results_per_round, self.strategy.search_depth());
        let mut excluded: Vec<String> = self
            .strategy
            .excluded_domains()
            .iter()
            .map(|d| (*d).to_string())
            .collect();
        for domain in &self.diversity_exclusions {
            if !excluded.contains(domain) {
                excluded.push(domain.clone());
            }
        }
        if round > 0 && self.diversity_exclusions.is_empty() {
            params.include_domains.clone_from(&self.priority_domains);
        }
        params.exclude_domains = excluded;
        params
    }

    fn seed_queries(&self) -> (Vec<String>, QuerySource, String) {
        let mut seen = HashSet::new();
        let queries: Vec<String> = self
            .profile
            .variants
            .iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty() && seen.insert(query_key(v)))
            .take(self.strategy.queries_per_round())
            .collect();
        let note = format!(
            "{} query classified {} ({} concepts); seeding {} of {} variants",
            self.strategy.name,
            self.profile.tier,
            self.profile.concepts.len(),
            queries.len(),
            self.profile.variants.len(),
        );
        (queries, QuerySource::Variants, note)
    }

    /// Chooses the queries of `round` (at least 1).
    async fn plan_next(&mut self, round: usize) -> (Vec<String>, QuerySource, String) {
        let wanted = self.strategy.queries_per_round();

        if let Some(advisor) = self.advisor {
            match self.consult(advisor, round, wanted).await {
                Ok((queries, note)) if !queries.is_empty() => {
                    return (queries, QuerySource::GapAnalysis, note);
                }
                Ok(_) => debug!(round, "gap analysis proposed nothing new, using follow-up rule"),
                Err(error) => warn!(round, %error, "gap analysis failed, using follow-up rule"),
            }
        }

        let queries = self.follow_up_queries(wanted);
        let note = format!(
            "follow-up rule drew {} unissued quer{}",
            queries.len(),
            if queries.len() == 1 { "y" } else { "ies" }
        );
        (queries, QuerySource::FollowUpRule, note)
    }

    async fn consult(
        &mut self,
        advisor: Advisor<'_>,
        round: usize,
        wanted: usize,
    ) -> Result<(Vec<String>, String), AgentError> {
        let top = self.knowledge.top_active(CONTEXT_ITEMS);
        let last_observation = self
            .rounds
            .last()
            .map_or("", |r| r.observation_summary.as_str());
        let ctx = ReasoningContext {
            query: self.query.text(),
            round,
            max_rounds: self.strategy.max_rounds,
            issued: &self.issued,
            wanted,
            last_observation,
            sources: top.iter().map(|i| source_context(i)).collect(),
        };

        self.llm_calls += 1;
        let (analysis, _response) = advisor.analyst.analyze(advisor.provider, &ctx).await?;

        let mut seen = HashSet::new();
        let queries: Vec<String> = analysis
            .queries
            .into_iter()
            .filter(|q| {
                let key = query_key(q);
                !self.issued_keys.contains(&key) && seen.insert(key)
            })
            .take(wanted)
            .collect();
        let note = if analysis.reasoning.trim().is_empty() {
            format!(
                "gap analysis (understanding {:.2}) targeted: {}",
                analysis.understanding,
                analysis.knowledge_gaps.join("; ")
            )
        } else {
            analysis.reasoning
        };
        Ok((queries, note))
    }

    /// Deterministic follow-up: an overview query for sequential
    /// strategies, unissued sub-questions, then unissued variants, then key
    /// terms of the strongest active items, then angle suffixes. Never
    /// returns an issued query.
    fn follow_up_queries(&self, wanted: usize) -> Vec<String> {
        let text = self.query.text();
        let han = text.chars().any(is_han);
        let separator = if han { "" } else { " " };

        let key_terms = self
            .key_terms()
            .into_iter()
            .map(|term| format!("{text}{separator}{term}"));
        let suffixed = angle_suffixes(han).iter().map(|s| format!("{text} {s}"));
        let overview = self
            .strategy
            .opens_with_overview()
            .then(|| format!("{text} {}", overview_suffix(han)));

        let mut seen = HashSet::new();
        overview
            .into_iter()
            .chain(self.profile.sub_questions.iter().cloned())
            .chain(self.profile.variants.iter().cloned())
            .chain(key_terms)
            .chain(suffixed)
            .filter(|q| {
                let key = query_key(q);
                !key.is_empty() && !self.issued_keys.contains(&key) && seen.insert(key)
            })
            .take(wanted)
            .collect()
    }

    /// Terms frequent in the strongest active items but absent from the query.
    fn key_terms(&self) -> Vec<String> {
        let query_terms = salient_terms(self.query.text());
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        let top = self.knowledge.top_active(CONTEXT_ITEMS);
        for item in &top {
            for term in item.terms() {
                if !query_terms.contains(term) {
                    *counts.entry(term.as_str()).or_insert(0) += 1;
                }
            }
        }
        let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
            .into_iter()
            .take(CONTEXT_ITEMS)
            .map(|(t, _)| t.to_string())
            .collect()
    }
}

fn query_key(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn source_context(item: &KnowledgeItem) -> SourceContext<'_> {
    SourceContext {
        title: &item.title,
        url: &item.url,
        score: item.composite_score,
        content: &item.content,
    }
}

/// Rebuilds per-call reports for a round whose calls all failed.
fn failed_output(queries: &[String], error: AgentError) -> RoundOutput {
    let failures = match error {
        AgentError::RoundFailed { failures, .. } => failures,
        other => vec![other.to_string(); queries.len()],
    };
    let calls = queries
        .iter()
        .zip(failures.into_iter().map(Some).chain(std::iter::repeat(None)))
        .map(|(query, error)| CallReport {
            query: query.clone(),
            hits: 0,
            status: CallStatus::Failed,
            error,
            elapsed_ms: 0,
        })
        .collect();
    RoundOutput {
        results: Vec::new(),
        calls,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::{ChatRequest, ChatResponse, TokenUsage};
    use crate::agent::prompt::REASONING_SYSTEM_PROMPT;
    use crate::agent::provider::TextStream;
    use crate::config::Config;
    use crate::search::classifier::{Tier, classify};
    use crate::search::provider::{RawHit, WebSearch};
    use crate::search::strategy::{StrategyOverrides, select_strategy};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Returns a distinct, on-topic page per query from a rotating set of
    /// domains, until `budget` calls have been answered.
    struct Rotating {
        domains: Vec<&'static str>,
        budget: usize,
        calls: Mutex<Vec<String>>,
        included: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl WebSearch for Rotating {
        fn name(&self) -> &'static str {
            "rotating"
        }

        async fn search(
            &self,
            query: &str,
            params: &SearchParams,
        ) -> Result<Vec<RawHit>, AgentError> {
            if let Ok(mut included) = self.included.lock() {
                included.push(params.include_domains.clone());
            }
            let n = {
                let mut calls = self
                    .calls
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                calls.push(query.to_string());
                calls.len()
            };
            if n > self.budget {
                return Ok(Vec::new());
            }
            let domain = self.domains[n % self.domains.len()];
            Ok(vec![RawHit {
                url: format!("https://{domain}/page{n}"),
                title: query.to_string(),
                content: format!("{query} detail{n} topic{n}"),
                score: 0.9,
                published_at: None,
            }])
        }
    }

    struct Down;

    #[async_trait]
    impl WebSearch for Down {
        fn name(&self) -> &'static str {
            "down"
        }

        async fn search(&self, _q: &str, _p: &SearchParams) -> Result<Vec<RawHit>, AgentError> {
            Err(AgentError::ProviderError {
                provider: "down".to_string(),
                message: "503".to_string(),
                status: Some(503),
            })
        }
    }

    struct Scripted {
        reply: String,
    }

    #[async_trait]
    impl LlmProvider for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            Ok(ChatResponse {
                content: self.reply.clone(),
                usage: TokenUsage::default(),
                finish_reason: None,
            })
        }

        async fn chat_stream(&self, _request: &ChatRequest) -> Result<TextStream, AgentError> {
            Err(AgentError::Stream {
                message: "unused".to_string(),
            })
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    fn executor(search: Arc<dyn WebSearch>) -> RoundExecutor {
        RoundExecutor::new(search, Duration::from_secs(1))
    }

    async fn run(
        text: &str,
        search: Arc<dyn WebSearch>,
        overrides: StrategyOverrides,
        advisor: Option<Advisor<'_>>,
    ) -> LoopOutcome {
        let query = Query::new(text);
        let profile = classify(&query);
        let strategy = select_strategy(profile.tier, &overrides);
        let executor = executor(search);
        let knowledge = KnowledgeConfig {
            quality_threshold: strategy.quality_threshold,
            ..KnowledgeConfig::default()
        };
        let mut controller =
            ReflectionController::new(&query, &profile, strategy, &executor, knowledge, now());
        if let Some(advisor) = advisor {
            controller = controller.with_advisor(advisor);
        }
        controller.run(&CancellationToken::new()).await
    }

    fn rotating(domains: Vec<&'static str>, budget: usize) -> Arc<Rotating> {
        Arc::new(Rotating {
            domains,
            budget,
            calls: Mutex::new(Vec::new()),
            included: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_queries_never_repeat() {
        let search = rotating(vec!["a.com"], 100);
        let overrides = StrategyOverrides {
            quality_threshold: Some(1.0),
            ..StrategyOverrides::default()
        };
        let outcome = run(
            "How does Rust compare to Go for building web servers",
            search.clone(),
            overrides,
            None,
        )
        .await;
        let issued: Vec<String> = outcome
            .rounds
            .iter()
            .flat_map(|r| r.queries.iter().map(|q| query_key(q)))
            .collect();
        let unique: HashSet<&String> = issued.iter().collect();
        assert_eq!(unique.len(), issued.len());
        assert!(outcome.rounds.len() <= 5);
    }

    #[tokio::test]
    async fn test_total_outage_terminates() {
        let outcome = run(
            "How does Rust compare to Go for building web servers",
            Arc::new(Down),
            StrategyOverrides::default(),
            None,
        )
        .await;
        assert_eq!(outcome.rounds.len(), DRY_ROUNDS_TO_STOP);
        assert_eq!(outcome.stop_reason, StopReason::NoNewInformation);
        assert!(outcome.rounds.iter().all(|r| r.failed));
        assert!(
            outcome.rounds[0]
                .calls
                .iter()
                .all(|c| c.status == CallStatus::Failed && c.error.is_some())
        );
    }

    #[tokio::test]
    async fn test_quality_stop() {
        let search = rotating(
            vec!["arxiv.org", "nature.com", "ieee.org", "acm.org", "mit.edu", "nasa.gov"],
            100,
        );
        let overrides = StrategyOverrides {
            quality_threshold: Some(0.3),
            sufficiency_threshold: Some(0.3),
            diversity_threshold: Some(0.5),
            ..StrategyOverrides::default()
        };
        let outcome = run(
            "How does Rust compare to Go for building web servers",
            search,
            overrides,
            None,
        )
        .await;
        assert_eq!(outcome.stop_reason, StopReason::QualitySatisfied);
        assert_eq!(outcome.rounds.len(), 1);
        assert_eq!(
            outcome.rounds[0].reflection_decision,
            ReflectionDecision::Stop
        );
    }

    #[tokio::test]
    async fn test_quality_stop_needs_sufficiency() {
        let search = rotating(
            vec!["arxiv.org", "nature.com", "ieee.org", "acm.org", "mit.edu", "nasa.gov"],
            100,
        );
        let overrides = StrategyOverrides {
            max_rounds: Some(2),
            quality_threshold: Some(0.3),
            sufficiency_threshold: Some(1.0),
            diversity_threshold: Some(0.5),
            ..StrategyOverrides::default()
        };
        let outcome = run(
            "How does Rust compare to Go for building web servers",
            search,
            overrides,
            None,
        )
        .await;
        let first = &outcome.rounds[0];
        assert!(first.active_total > 0);
        assert!(first.mean_composite >= 0.3);
        assert!(first.diversity >= 0.5);
        assert_eq!(first.reflection_decision, ReflectionDecision::Continue);
        assert_eq!(outcome.rounds.len(), 2);
        assert_eq!(outcome.stop_reason, StopReason::BudgetExhausted);
    }

    #[tokio::test]
    async fn test_sequential_follow_up_prefers_overview_and_priority_domains() {
        let query = Query::new("latest research papers on rust compiler optimization");
        let profile = classify(&query);
        let overrides = StrategyOverrides {
            max_rounds: Some(2),
            quality_threshold: Some(0.0),
            sufficiency_threshold: Some(1.0),
            diversity_threshold: Some(0.0),
            ..StrategyOverrides::default()
        };
        let strategy = select_strategy(Tier::Complex, &overrides);
        let search = rotating(vec!["a.com", "b.com"], 100);
        let executor = executor(search.clone());
        let outcome = ReflectionController::new(
            &query,
            &profile,
            strategy,
            &executor,
            KnowledgeConfig::default(),
            now(),
        )
        .run(&CancellationToken::new())
        .await;

        let preferred: Vec<String> = ["arxiv.org", "scholar.google.com", "reuters.com", "bbc.com"]
            .iter()
            .map(|d| (*d).to_string())
            .collect();
        assert_eq!(outcome.rounds.len(), 2);
        assert!(outcome.rounds[0].included_domains.is_empty());
        assert_eq!(outcome.rounds[1].included_domains, preferred);
        assert_eq!(outcome.rounds[1].query_source, QuerySource::FollowUpRule);
        assert_eq!(
            outcome.rounds[1].queries[0],
            "latest research papers on rust compiler optimization overview"
        );

        let included = search.included.lock().map(|i| i.clone()).unwrap_or_default();
        let first_round_calls = outcome.rounds[0].queries.len();
        assert!(included[..first_round_calls].iter().all(Vec::is_empty));
        assert!(included[first_round_calls..].iter().all(|d| *d == preferred));
    }

    #[tokio::test]
    async fn test_diversity_exclusions_suppress_priority_domains() {
        let query = Query::new("latest research papers on rust compiler optimization");
        let profile = classify(&query);
        let overrides = StrategyOverrides {
            max_rounds: Some(2),
            quality_threshold: Some(0.0),
            sufficiency_threshold: Some(1.0),
            diversity_threshold: Some(0.9),
            ..StrategyOverrides::default()
        };
        let strategy = select_strategy(Tier::MultiHop, &overrides);
        let executor = executor(rotating(vec!["wiki.example.org"], 100));
        let outcome = ReflectionController::new(
            &query,
            &profile,
            strategy,
            &executor,
            KnowledgeConfig::default(),
            now(),
        )
        .run(&CancellationToken::new())
        .await;
        assert_eq!(outcome.rounds.len(), 2);
        assert_eq!(
            outcome.rounds[1].excluded_domains,
            vec!["wiki.example.org".to_string()]
        );
        assert!(outcome.rounds[1].included_domains.is_empty());
    }

    #[tokio::test]
    async fn test_advisor_queries_are_used_and_filtered() {
        let search = rotating(vec!["a.com"], 100);
        let reply = r#"{"reasoning": "need benchmarks", "should_continue": false,
            "queries": ["how does rust  compare to go for building web servers",
                        "rust go benchmark latency"]}"#;
        let provider = Scripted {
            reply: reply.to_string(),
        };
        let config = Config::builder()
            .search_api_key("t")
            .llm_api_key("k")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let analyst = GapAnalyst::new(&config, REASONING_SYSTEM_PROMPT.to_string());
        let overrides = StrategyOverrides {
            max_rounds: Some(2),
            quality_threshold: Some(1.0),
            ..StrategyOverrides::default()
        };
        let outcome = run(
            "How does Rust compare to Go for building web servers",
            search,
            overrides,
            Some(Advisor {
                provider: &provider,
                analyst: &analyst,
            }),
        )
        .await;
        assert_eq!(outcome.rounds.len(), 2);
        assert_eq!(outcome.llm_calls, 1);
        let second = &outcome.rounds[1];
        assert_eq!(second.query_source, QuerySource::GapAnalysis);
        assert_eq!(second.queries, vec!["rust go benchmark latency"]);
        assert_eq!(second.reasoning_note, "need benchmarks");
        assert_eq!(outcome.stop_reason, StopReason::NoNewInformation);
    }

    #[tokio::test]
    async fn test_bad_advisor_output_falls_back_to_rule() {
        let search = rotating(vec!["a.com"], 100);
        let provider = Scripted {
            reply: "not json".to_string(),
        };
        let config = Config::builder()
            .search_api_key("t")
            .llm_api_key("k")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let analyst = GapAnalyst::new(&config, REASONING_SYSTEM_PROMPT.to_string());
        let overrides = StrategyOverrides {
            max_rounds: Some(2),
            quality_threshold: Some(1.0),
            ..StrategyOverrides::default()
        };
        let outcome = run(
            "How does Rust compare to Go for building web servers",
            search,
            overrides,
            Some(Advisor {
                provider: &provider,
                analyst: &analyst,
            }),
        )
        .await;
        assert_eq!(outcome.rounds[1].query_source, QuerySource::FollowUpRule);
        assert!(!outcome.rounds[1].queries.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_round() {
        let query = Query::new("what is quantum computing");
        let profile = classify(&query);
        let strategy = select_strategy(profile.tier, &StrategyOverrides::default());
        let search = rotating(vec!["a.com"], 100);
        let executor = executor(search.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = ReflectionController::new(
            &query,
            &profile,
            strategy,
            &executor,
            KnowledgeConfig::default(),
            now(),
        )
        .run(&cancel)
        .await;
        assert!(outcome.rounds.is_empty());
        assert_eq!(outcome.stop_reason, StopReason::Cancelled);
        let calls = search.calls.lock().map(|c| c.len()).unwrap_or_default();
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_dominant_domain_is_excluded_next_round() {
        let search = rotating(vec!["wiki.example.org"], 100);
        let overrides = StrategyOverrides {
            max_rounds: Some(2),
            quality_threshold: Some(0.0),
            diversity_threshold: Some(0.9),
            ..StrategyOverrides::default()
        };
        let outcome = run(
            "How does Rust compare to Go for building web servers",
            search,
            overrides,
            None,
        )
        .await;
        assert_eq!(outcome.rounds.len(), 2);
        assert!(outcome.rounds[0].excluded_domains.is_empty());
        assert_eq!(
            outcome.rounds[1].excluded_domains,
            vec!["wiki.example.org".to_string()]
        );
    }

    #[test]
    fn test_failed_output_rebuilds_calls() {
        let queries = vec!["a".to_string(), "b".to_string()];
        let output = failed_output(
            &queries,
            AgentError::RoundFailed {
                round: 0,
                failures: vec!["x".to_string(), "y".to_string()],
            },
        );
        assert_eq!(output.calls.len(), 2);
        assert_eq!(output.calls[1].error.as_deref(), Some("y"));
        assert_eq!(output.failed_calls(), 2);
    }

    #[test]
    fn test_query_key_normalizes() {
        assert_eq!(query_key("  Rust   VS go "), "rust vs go");
    }
}
