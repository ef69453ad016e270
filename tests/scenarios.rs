//! End-to-end runs of the research loop against scripted backends.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use deepsearch::core::jaccard;
use deepsearch::search::{CallStatus, RawHit, SearchParams};
use deepsearch::{
    AgentError, Config, DeepSearch, Query, StopReason, StrategyName, Tier, WebSearch, classify,
    insights,
};
use proptest::prelude::*;

const SIMPLE: &str = "what is quantum computing";
const COMPARATIVE: &str = "How does Rust compare to Go for building web servers";

fn config() -> Config {
    Config::builder()
        .search_api_key("tvly-test")
        .llm_provider("none")
        .build()
        .unwrap_or_else(|_| unreachable!())
}

fn variants(text: &str) -> HashSet<String> {
    classify(&Query::new(text)).variants.into_iter().collect()
}

/// Answers only the queries it was seeded with; everything else is empty.
struct Seeded {
    original: &'static str,
    answer_for: HashSet<String>,
    domain: &'static str,
    calls: AtomicUsize,
}

#[async_trait]
impl WebSearch for Seeded {
    fn name(&self) -> &'static str {
        "seeded"
    }

    async fn search(&self, query: &str, _params: &SearchParams) -> Result<Vec<RawHit>, AgentError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.answer_for.contains(query) {
            return Ok(Vec::new());
        }
        Ok((0..2)
            .map(|i| RawHit {
                url: format!("https://{}/article-{n}-{i}", self.domain),
                title: format!("{} part {n}{i}", self.original),
                content: format!(
                    "{}. alpha{n}{i} bravo{n}{i} charlie{n}{i} delta{n}{i} echo{n}{i} foxtrot{n}{i}",
                    self.original
                ),
                score: 0.9,
                published_at: None,
            })
            .collect())
    }
}

/// Fails every call.
struct Outage;

#[async_trait]
impl WebSearch for Outage {
    fn name(&self) -> &'static str {
        "outage"
    }

    async fn search(&self, _q: &str, _p: &SearchParams) -> Result<Vec<RawHit>, AgentError> {
        Err(AgentError::ProviderError {
            provider: "outage".to_string(),
            message: "503 Service Unavailable".to_string(),
            status: Some(503),
        })
    }
}

/// Returns the same page under a different URL spelling per round.
struct SamePage {
    round_zero: HashSet<String>,
}

#[async_trait]
impl WebSearch for SamePage {
    fn name(&self) -> &'static str {
        "same_page"
    }

    async fn search(&self, query: &str, _p: &SearchParams) -> Result<Vec<RawHit>, AgentError> {
        let url = if self.round_zero.contains(query) {
            "https://Example.com/Guide?utm_source=feed"
        } else {
            "http://www.example.com/guide/#intro"
        };
        Ok(vec![RawHit {
            url: url.to_string(),
            title: "Rust and Go web servers".to_string(),
            content: format!("{COMPARATIVE}: a guide."),
            score: 0.8,
            published_at: None,
        }])
    }
}

#[tokio::test]
async fn simple_query_runs_one_direct_round() {
    let search = Arc::new(Seeded {
        original: SIMPLE,
        answer_for: variants(SIMPLE),
        domain: "en.wikipedia.org",
        calls: AtomicUsize::new(0),
    });
    let engine = DeepSearch::new(config(), search.clone(), None);
    let process = engine
        .run_query(SIMPLE)
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(process.profile.tier, Tier::Simple);
    assert_eq!(process.strategy.name, StrategyName::Direct);
    assert_eq!(process.strategy.max_rounds, 1);
    assert_eq!(process.rounds.len(), 1);
    assert_eq!(process.rounds[0].queries, vec![SIMPLE.to_string()]);
    assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    assert!(process.active_knowledge().count() > 0);
    assert!(!process.final_answer.is_empty());
}

#[tokio::test]
async fn comparative_query_stops_after_two_empty_rounds() {
    let engine = DeepSearch::new(
        config(),
        Arc::new(Seeded {
            original: COMPARATIVE,
            answer_for: variants(COMPARATIVE),
            domain: "blog.example.net",
            calls: AtomicUsize::new(0),
        }),
        None,
    );
    let process = engine
        .run_query(COMPARATIVE)
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(process.profile.tier, Tier::MultiHop);
    assert_eq!(process.strategy.name, StrategyName::ParallelDeep);
    assert_eq!(process.strategy.max_rounds, 5);
    assert_eq!(process.stop_reason, StopReason::NoNewInformation);
    assert_eq!(process.rounds.len(), 3);
    assert!(process.rounds[0].new_knowledge_count > 0);
    assert_eq!(process.rounds[1].new_knowledge_count, 0);
    assert_eq!(process.rounds[2].new_knowledge_count, 0);
    assert_eq!(
        process.rounds[1].excluded_domains,
        vec!["blog.example.net".to_string()]
    );

    let report = insights(&process);
    assert_eq!(report.first_dry_round, Some(1));
    assert_eq!(report.rounds_run, 3);
    assert!(report.source_diversity < 0.5);
}

#[tokio::test]
async fn provider_outage_yields_zero_count_rounds() {
    let engine = DeepSearch::new(config(), Arc::new(Outage), None);
    let process = engine
        .run_query(COMPARATIVE)
        .await
        .unwrap_or_else(|_| unreachable!());

    let first = &process.rounds[0];
    assert!(first.failed);
    assert_eq!(first.results_received, 0);
    assert_eq!(first.new_knowledge_count, 0);
    assert!(
        first
            .calls
            .iter()
            .all(|c| c.status == CallStatus::Failed && c.error.is_some())
    );
    assert_eq!(process.stop_reason, StopReason::NoNewInformation);
    assert!(process.rounds.len() <= process.strategy.max_rounds);
    assert!(process.answer_degraded);
    assert!(process.final_answer.contains("No reliable sources"));

    let report = insights(&process);
    assert!(report.degraded);
    assert_eq!(report.failed_rounds, process.rounds.len());
}

#[tokio::test]
async fn simple_query_outage_exhausts_budget() {
    let engine = DeepSearch::new(config(), Arc::new(Outage), None);
    let process = engine
        .run_query(SIMPLE)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(process.rounds.len(), 1);
    assert_eq!(process.stop_reason, StopReason::BudgetExhausted);
}

#[tokio::test]
async fn same_url_across_rounds_is_one_item() {
    let config = Config::builder()
        .search_api_key("tvly-test")
        .llm_provider("none")
        .quality_threshold(1.0)
        .build()
        .unwrap_or_else(|_| unreachable!());
    let engine = DeepSearch::new(
        config,
        Arc::new(SamePage {
            round_zero: variants(COMPARATIVE),
        }),
        None,
    );
    let process = engine
        .run_query(COMPARATIVE)
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(process.rounds.len() >= 2);
    assert_eq!(process.knowledge_base.len(), 1);
    let item = &process.knowledge_base[0];
    assert_eq!(item.canonical_url, "example.com/guide");
    assert!(item.contributing_rounds.contains(&0));
    assert!(item.contributing_rounds.contains(&1));
}

#[tokio::test]
async fn history_is_kept_across_queries() {
    let engine = DeepSearch::new(config(), Arc::new(Outage), None);
    for text in [SIMPLE, COMPARATIVE] {
        let _ = engine.run_query(text).await;
    }
    let history = engine.history().snapshot();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].query.text(), SIMPLE);
    let stats = engine.history().stats();
    assert_eq!(stats.queries, 2);
    assert_eq!(stats.degraded_answers, 2);
}

/// Fails the calls whose index is flagged in `pattern`.
struct Flaky {
    pattern: Vec<bool>,
    calls: AtomicUsize,
}

#[async_trait]
impl WebSearch for Flaky {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn search(&self, query: &str, _p: &SearchParams) -> Result<Vec<RawHit>, AgentError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.pattern.get(n % self.pattern.len()).copied().unwrap_or(true) {
            return Err(AgentError::ProviderTimeout {
                provider: "flaky".to_string(),
                timeout: std::time::Duration::from_secs(1),
            });
        }
        Ok(vec![RawHit {
            url: format!("https://site{}.example.org/{n}", n % 3),
            title: query.to_string(),
            content: format!("{query} note{n}"),
            score: 0.7,
            published_at: None,
        }])
    }
}

/// One scripted hit: which page, how its URL is spelled, which body it carries.
#[derive(Debug, Clone, Copy)]
struct Hit {
    page: usize,
    spelling: usize,
    body: usize,
}

const BODIES: [&str; 4] = [
    "rust go web servers throughput latency benchmarks async runtime",
    "rust go web servers throughput latency benchmarks async runtime",
    "go goroutines scheduler garbage collector pauses http handlers",
    "rust ownership borrow checker tokio hyper axum memory safety",
];

fn hit_url(hit: Hit) -> String {
    let host = ["docs.example.org", "blog.example.com", "news.example.net"][hit.page % 3];
    let page = hit.page;
    match hit.spelling % 4 {
        0 => format!("https://{host}/page{page}"),
        1 => format!("https://{}/page{page}?utm_source=feed", host.to_uppercase()),
        2 => format!("http://www.{host}/page{page}/"),
        _ => format!("https://{host}/page{page}#section"),
    }
}

/// Replays a random script of hits, one batch per call, cycling.
struct Scripted {
    batches: Vec<Vec<Hit>>,
    calls: AtomicUsize,
}

#[async_trait]
impl WebSearch for Scripted {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn search(&self, query: &str, _p: &SearchParams) -> Result<Vec<RawHit>, AgentError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let batch = self.batches.get(n % self.batches.len()).cloned().unwrap_or_default();
        Ok(batch
            .into_iter()
            .map(|hit| RawHit {
                url: hit_url(hit),
                title: if hit.body % 2 == 0 {
                    "Rust and Go for web servers".to_string()
                } else {
                    query.to_string()
                },
                content: BODIES[hit.body % BODIES.len()].to_string(),
                score: 0.8,
                published_at: None,
            })
            .collect())
    }
}

fn hit_strategy() -> impl Strategy<Value = Hit> {
    (0usize..8, 0usize..4, 0usize..4).prop_map(|(page, spelling, body)| Hit {
        page,
        spelling,
        body,
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn knowledge_stays_deduplicated_across_rounds(
        max_rounds in 1usize..5,
        quality in 0.0f64..1.0,
        dedup in 0.3f64..0.95,
        batches in proptest::collection::vec(proptest::collection::vec(hit_strategy(), 0..5), 1..6),
        comparative in any::<bool>(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap_or_else(|_| unreachable!());
        let config = Config::builder()
            .search_api_key("tvly-test")
            .llm_provider("none")
            .max_rounds(max_rounds)
            .quality_threshold(quality)
            .dedup_threshold(dedup)
            .build()
            .unwrap_or_else(|_| unreachable!());
        let engine = DeepSearch::new(
            config,
            Arc::new(Scripted { batches, calls: AtomicUsize::new(0) }),
            None,
        );
        let text = if comparative { COMPARATIVE } else { SIMPLE };
        let process = rt
            .block_on(engine.run_query(text))
            .unwrap_or_else(|_| unreachable!());

        let rounds = process.rounds.len();
        prop_assert!((1..=max_rounds).contains(&rounds));
        for item in &process.knowledge_base {
            prop_assert!(!item.contributing_rounds.is_empty());
            prop_assert!(item.contributing_rounds.iter().all(|r| *r < rounds));
        }
        let items = &process.knowledge_base;
        for (i, a) in items.iter().enumerate() {
            for b in &items[i + 1..] {
                prop_assert_ne!(&a.canonical_url, &b.canonical_url);
                if !a.terms().is_empty() && !b.terms().is_empty() {
                    prop_assert!(jaccard(a.terms(), b.terms()) <= dedup);
                }
            }
        }
    }

    #[test]
    fn rounds_never_exceed_budget(
        max_rounds in 1usize..6,
        pattern in proptest::collection::vec(any::<bool>(), 1..8),
        comparative in any::<bool>(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap_or_else(|_| unreachable!());
        let config = Config::builder()
            .search_api_key("tvly-test")
            .llm_provider("none")
            .max_rounds(max_rounds)
            .build()
            .unwrap_or_else(|_| unreachable!());
        let engine = DeepSearch::new(
            config,
            Arc::new(Flaky { pattern, calls: AtomicUsize::new(0) }),
            None,
        );
        let text = if comparative { COMPARATIVE } else { SIMPLE };
        let process = rt
            .block_on(engine.run_query(text))
            .unwrap_or_else(|_| unreachable!());

        prop_assert!(!process.rounds.is_empty());
        prop_assert!(process.rounds.len() <= max_rounds);
        prop_assert!(!process.final_answer.is_empty());
        let issued: Vec<String> = process
            .rounds
            .iter()
            .flat_map(|r| r.queries.iter().map(|q| q.to_lowercase()))
            .collect();
        let unique: HashSet<&String> = issued.iter().collect();
        prop_assert_eq!(unique.len(), issued.len());
    }
}
