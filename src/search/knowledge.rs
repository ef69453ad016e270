//! Knowledge accumulation across rounds.
//!
//! The [`KnowledgeBase`] owns every item a query has seen. Each round's
//! results are merged in one step:
//!
//! 1. **Dedup**: a result matches an existing item when their canonical URLs
//!    are equal or their salient-term Jaccard overlap exceeds the dedup
//!    threshold. Matches are merged: the round index is recorded and the
//!    score components become an authority-weighted average of the two.
//! 2. **Scoring**: new items get relevance, authority and recency scores
//!    fused into a composite by [`FusionWeights`].
//! 3. **Filtering**: items below the quality threshold go to the side pool.
//!    Pool items are rescored when new reference queries arrive and are
//!    promoted once they clear the threshold.
//! 4. **Diversity**: per-domain counts over active items.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::executor::SearchResult;
use super::scoring::{AuthorityTable, FusionWeights, recency_score, relevance_score};
use crate::core::{canonicalize_url, domain_of, jaccard, salient_terms};

/// Default salient-term overlap above which two results are duplicates.
pub const DEFAULT_DEDUP_THRESHOLD: f64 = 0.85;
/// Minimum share of active items for a domain to count as dominant.
pub const DOMINANT_SHARE: f64 = 0.3;
/// Minimum item count for a domain to count as dominant.
pub const DOMINANT_MIN_COUNT: usize = 2;

/// A deduplicated, scored piece of knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    /// Canonical URL (identity of the item).
    pub canonical_url: String,
    /// URL of the first result that created the item.
    pub url: String,
    /// Title of the first result.
    pub title: String,
    /// Lowercase host without `www.`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Content of the first result.
    pub content: String,
    /// Similarity to the query and its variants, in `[0, 1]`.
    pub relevance_score: f64,
    /// Source reputation, in `[0, 1]`.
    pub authority_score: f64,
    /// Freshness, in `[0, 1]`.
    pub recency_score: f64,
    /// Weighted combination of the three, in `[0, 1]`.
    pub composite_score: f64,
    /// Provider score of the first result.
    pub source_score: f64,
    /// Publication time, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Rounds that returned this item. Only ever grows.
    pub contributing_rounds: BTreeSet<usize>,
    /// Whether the item clears the quality threshold.
    pub active: bool,
    #[serde(skip)]
    terms: BTreeSet<String>,
}

impl KnowledgeItem {
    /// Salient terms of title and content.
    #[must_use]
    pub const fn terms(&self) -> &BTreeSet<String> {
        &self.terms
    }
}

/// Score components of one result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemScores {
    /// Relevance component.
    pub relevance: f64,
    /// Authority component.
    pub authority: f64,
    /// Recency component.
    pub recency: f64,
    /// Composite score.
    pub composite: f64,
}

/// Settings of the accumulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Jaccard overlap above which results are merged.
    pub dedup_threshold: f64,
    /// Composite weights.
    pub weights: FusionWeights,
    /// Minimum composite for an item to be active.
    pub quality_threshold: f64,
    /// Domain reputation table.
    pub authority: AuthorityTable,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            dedup_threshold: DEFAULT_DEDUP_THRESHOLD,
            weights: FusionWeights::default(),
            quality_threshold: super::strategy::DEFAULT_QUALITY_THRESHOLD,
            authority: AuthorityTable::default(),
        }
    }
}

/// What one merge step changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Results received.
    pub received: usize,
    /// Results that created a new item.
    pub added: usize,
    /// Results merged into an existing item.
    pub merged: usize,
    /// Pool items promoted to active.
    pub promoted: usize,
    /// Items that became active in this step (new or promoted).
    pub new_active: usize,
}

/// Deduplicated knowledge for one query.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    config: KnowledgeConfig,
    items: Vec<KnowledgeItem>,
    references: Vec<BTreeSet<String>>,
}

impl KnowledgeBase {
    /// Creates an empty knowledge base scored against `query` and `variants`.
    #[must_use]
    pub fn new(config: KnowledgeConfig, query: &str, variants: &[String]) -> Self {
        let mut kb = Self {
            config,
            items: Vec::new(),
            references: Vec::new(),
        };
        kb.add_reference(query);
        for variant in variants {
            kb.add_reference(variant);
        }
        kb
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &KnowledgeConfig {
        &self.config
    }

    /// Adds a reference text for relevance scoring. Returns `true` if its
    /// term set was new.
    pub fn add_reference(&mut self, text: &str) -> bool {
        let terms = salient_terms(text);
        if terms.is_empty() || self.references.contains(&terms) {
            return false;
        }
        self.references.push(terms);
        true
    }

    /// Merges one round's results: registers the issued queries as
    /// references, rescores the side pool, then ingests the results.
    ///
    /// The whole update happens in one call so callers never observe a
    /// partially merged round.
    pub fn observe_round(
        &mut self,
        round: usize,
        queries: &[String],
        results: Vec<SearchResult>,
        now: DateTime<Utc>,
    ) -> MergeReport {
        let before = self.active_urls();

        let mut references_changed = false;
        for query in queries {
            references_changed |= self.add_reference(query);
        }
        let promoted = if references_changed {
            self.rescore_pool()
        } else {
            0
        };

        let mut report = self.ingest(round, results, now);
        report.promoted += promoted;

        let after = self.active_urls();
        report.new_active = after.difference(&before).count();
        debug!(
            round,
            received = report.received,
            added = report.added,
            merged = report.merged,
            promoted = report.promoted,
            new_active = report.new_active,
            "merged round into knowledge base"
        );
        report
    }

    /// Deduplicates, scores and stores `results` fetched in `round`.
    pub fn ingest(
        &mut self,
        round: usize,
        results: Vec<SearchResult>,
        now: DateTime<Utc>,
    ) -> MergeReport {
        let mut report = MergeReport {
            received: results.len(),
            ..MergeReport::default()
        };

        for result in results {
            let canonical_url = canonicalize_url(&result.url);
            let terms = salient_terms(&format!("{} {}", result.title, result.content));
            let domain = domain_of(&result.url);
            let scores = self.score(&terms, domain.as_deref(), &result, now);

            if let Some(idx) = self.find_duplicate(&canonical_url, &terms) {
                let threshold = self.config.quality_threshold;
                let weights = self.config.weights;
                let item = &mut self.items[idx];
                let was_active = item.active;
                merge_into(item, &scores, &weights, round, result.published_at);
                item.active = item.composite_score >= threshold;
                if item.active && !was_active {
                    report.promoted += 1;
                }
                report.merged += 1;
                continue;
            }

            let mut contributing_rounds = BTreeSet::new();
            contributing_rounds.insert(round);
            self.items.push(KnowledgeItem {
                canonical_url,
                url: result.url,
                title: result.title,
                domain,
                content: result.content,
                relevance_score: scores.relevance,
                authority_score: scores.authority,
                recency_score: scores.recency,
                composite_score: scores.composite,
                source_score: result.source_score,
                published_at: result.published_at,
                contributing_rounds,
                active: scores.composite >= self.config.quality_threshold,
                terms,
            });
            report.added += 1;
        }

        report
    }

    /// Scores a result with the current references.
    #[must_use]
    pub fn score(
        &self,
        terms: &BTreeSet<String>,
        domain: Option<&str>,
        result: &SearchResult,
        now: DateTime<Utc>,
    ) -> ItemScores {
        let relevance = relevance_score(&self.references, terms, result.source_score);
        let authority = self.config.authority.score(domain);
        let recency = recency_score(result.published_at, now);
        ItemScores {
            relevance,
            authority,
            recency,
            composite: self.config.weights.composite(relevance, authority, recency),
        }
    }

    /// Recomputes relevance for side-pool items and promotes those that now
    /// clear the threshold. Scores only ever rise here. Returns the number
    /// of promotions.
    pub fn rescore_pool(&mut self) -> usize {
        let mut promoted = 0;
        for item in self.items.iter_mut().filter(|i| !i.active) {
            let fresh = relevance_score(&self.references, &item.terms, item.source_score);
            if fresh > item.relevance_score {
                item.relevance_score = fresh;
                item.composite_score = self.config.weights.composite(
                    item.relevance_score,
                    item.authority_score,
                    item.recency_score,
                );
            }
            if item.composite_score >= self.config.quality_threshold {
                item.active = true;
                promoted += 1;
            }
        }
        promoted
    }

    fn find_duplicate(&self, canonical_url: &str, terms: &BTreeSet<String>) -> Option<usize> {
        if let Some(idx) = self
            .items
            .iter()
            .position(|i| i.canonical_url == canonical_url)
        {
            return Some(idx);
        }
        if terms.is_empty() {
            return None;
        }
        self.items.iter().position(|i| {
            !i.terms.is_empty() && jaccard(&i.terms, terms) > self.config.dedup_threshold
        })
    }

    fn active_urls(&self) -> BTreeSet<String> {
        self.active().map(|i| i.canonical_url.clone()).collect()
    }

    /// All items, active and pooled, in insertion order.
    #[must_use]
    pub fn items(&self) -> &[KnowledgeItem] {
        &self.items
    }

    /// Active items in insertion order.
    pub fn active(&self) -> impl Iterator<Item = &KnowledgeItem> {
        self.items.iter().filter(|i| i.active)
    }

    /// Side-pool items in insertion order.
    pub fn side_pool(&self) -> impl Iterator<Item = &KnowledgeItem> {
        self.items.iter().filter(|i| !i.active)
    }

    /// Number of active items.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    /// Mean composite of active items; `0.0` when there are none.
    #[must_use]
    pub fn mean_active_composite(&self) -> f64 {
        mean(self.active().map(|i| i.composite_score))
    }

    /// Active items per domain.
    #[must_use]
    pub fn domain_counts(&self) -> BTreeMap<String, usize> {
        domain_counts(self.active())
    }

    /// Distinct domains over active items; `0.0` when there are none.
    #[must_use]
    pub fn diversity(&self) -> f64 {
        diversity(self.active())
    }

    /// Domains holding at least [`DOMINANT_SHARE`] of the active items (and
    /// at least [`DOMINANT_MIN_COUNT`] of them), most frequent first.
    #[must_use]
    pub fn dominant_domains(&self) -> Vec<String> {
        let total = self.active_count();
        if total == 0 {
            return Vec::new();
        }
        let mut dominant: Vec<(String, usize)> = self
            .domain_counts()
            .into_iter()
            .filter(|(_, n)| *n >= DOMINANT_MIN_COUNT && *n as f64 / total as f64 >= DOMINANT_SHARE)
            .collect();
        dominant.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        dominant.into_iter().map(|(d, _)| d).collect()
    }

    /// The `n` strongest active items, highest composite first.
    #[must_use]
    pub fn top_active(&self, n: usize) -> Vec<&KnowledgeItem> {
        let mut active: Vec<&KnowledgeItem> = self.active().collect();
        active.sort_by(|a, b| {
            b.composite_score
                .total_cmp(&a.composite_score)
                .then_with(|| a.canonical_url.cmp(&b.canonical_url))
        });
        active.truncate(n);
        active
    }

    /// Consumes the knowledge base, returning its items.
    #[must_use]
    pub fn into_items(self) -> Vec<KnowledgeItem> {
        self.items
    }
}

/// Folds `scores` into `item` as an authority-weighted average.
fn merge_into(
    item: &mut KnowledgeItem,
    scores: &ItemScores,
    weights: &FusionWeights,
    round: usize,
    published_at: Option<DateTime<Utc>>,
) {
    let total = item.authority_score + scores.authority;
    let w_new = if total > 0.0 {
        scores.authority / total
    } else {
        0.5
    };
    let blend = |old: f64, new: f64| (1.0 - w_new).mul_add(old, w_new * new);

    item.relevance_score = blend(item.relevance_score, scores.relevance);
    item.authority_score = blend(item.authority_score, scores.authority);
    item.recency_score = blend(item.recency_score, scores.recency);
    item.composite_score =
        weights.composite(item.relevance_score, item.authority_score, item.recency_score);
    if item.published_at.is_none() {
        item.published_at = published_at;
    }
    item.contributing_rounds.insert(round);
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

/// Counts items per domain. Items without a domain are counted under their
/// canonical URL so they still add diversity.
pub(crate) fn domain_counts<'a>(
    items: impl Iterator<Item = &'a KnowledgeItem>,
) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for item in items {
        let key = item
            .domain
            .clone()
            .unwrap_or_else(|| item.canonical_url.clone());
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

/// Distinct domains divided by item count; `0.0` for no items.
pub(crate) fn diversity<'a>(items: impl Iterator<Item = &'a KnowledgeItem>) -> f64 {
    let items: Vec<&KnowledgeItem> = items.collect();
    if items.is_empty() {
        return 0.0;
    }
    domain_counts(items.iter().copied()).len() as f64 / items.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    fn result(url: &str, title: &str, content: &str, score: f64, round: usize) -> SearchResult {
        SearchResult {
            url: url.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            source_score: score,
            fetched_in_round: round,
            published_at: None,
            query: "q".to_string(),
        }
    }

    fn kb() -> KnowledgeBase {
        KnowledgeBase::new(KnowledgeConfig::default(), "quantum computing", &[])
    }

    #[test]
    fn test_same_url_different_case_and_query_merges() {
        let mut kb = kb();
        kb.ingest(
            0,
            vec![result(
                "https://Example.com/Quantum?utm=1",
                "Quantum computing",
                "quantum computing explained",
                0.9,
                0,
            )],
            now(),
        );
        let report = kb.ingest(
            2,
            vec![result(
                "http://www.example.com/quantum/",
                "Other title",
                "different words entirely",
                0.2,
                2,
            )],
            now(),
        );
        assert_eq!(report.merged, 1);
        assert_eq!(kb.items().len(), 1);
        let item = &kb.items()[0];
        assert_eq!(item.contributing_rounds.iter().copied().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(item.content, "quantum computing explained");
    }

    #[test]
    fn test_near_duplicate_content_merges() {
        let mut kb = kb();
        let text = "quantum computing uses qubits superposition entanglement interference";
        kb.ingest(0, vec![result("https://a.com/x", "Quantum", text, 0.5, 0)], now());
        kb.ingest(1, vec![result("https://b.org/y", "Quantum", text, 0.5, 1)], now());
        assert_eq!(kb.items().len(), 1);
        assert_eq!(kb.items()[0].contributing_rounds.len(), 2);
    }

    #[test]
    fn test_low_quality_goes_to_pool() {
        let mut kb = kb();
        let report = kb.ingest(
            0,
            vec![
                result("https://arxiv.org/abs/1", "Quantum computing", "quantum computing", 1.0, 0),
                result("https://reddit.com/r/x", "cooking", "pasta recipes", 0.0, 0),
            ],
            now(),
        );
        assert_eq!(report.added, 2);
        assert_eq!(kb.active_count(), 1);
        assert_eq!(kb.side_pool().count(), 1);
        assert!(kb.mean_active_composite() >= 0.6);
    }

    #[test]
    fn test_pool_promotion_on_new_reference() {
        let mut kb = KnowledgeBase::new(KnowledgeConfig::default(), "rust ownership", &[]);
        kb.ingest(
            0,
            vec![result(
                "https://docs.rs/borrowck",
                "Borrow checker",
                "borrow checker lifetimes",
                1.0,
                0,
            )],
            now(),
        );
        assert_eq!(kb.active_count(), 0);
        let report = kb.observe_round(
            1,
            &["borrow checker lifetimes".to_string()],
            Vec::new(),
            now(),
        );
        assert_eq!(report.promoted, 1);
        assert_eq!(report.new_active, 1);
        assert_eq!(kb.active_count(), 1);
    }

    #[test]
    fn test_observe_round_counts_new_active_once() {
        let mut kb = kb();
        let batch = vec![result(
            "https://en.wikipedia.org/wiki/Quantum_computing",
            "Quantum computing",
            "quantum computing",
            0.9,
            0,
        )];
        let first = kb.observe_round(0, &["quantum computing".to_string()], batch.clone(), now());
        assert_eq!(first.new_active, 1);
        let second = kb.observe_round(1, &["quantum computing".to_string()], batch, now());
        assert_eq!(second.new_active, 0);
        assert_eq!(second.merged, 1);
    }

    #[test]
    fn test_diversity_and_dominant_domains() {
        let mut kb = kb();
        let batch = (0..4)
            .map(|i| {
                result(
                    &format!("https://en.wikipedia.org/wiki/Q{i}"),
                    "Quantum computing",
                    &format!("quantum computing article {i} variant{i}"),
                    1.0,
                    0,
                )
            })
            .chain(std::iter::once(result(
                "https://arxiv.org/abs/2",
                "Quantum computing survey",
                "quantum computing survey",
                1.0,
                0,
            )))
            .collect();
        kb.ingest(0, batch, now());
        assert_eq!(kb.active_count(), 5);
        assert!((kb.diversity() - 0.4).abs() < 1e-9);
        assert_eq!(kb.dominant_domains(), vec!["en.wikipedia.org".to_string()]);
        assert_eq!(kb.domain_counts().get("arxiv.org"), Some(&1));
        let top = kb.top_active(2);
        assert_eq!(top.len(), 2);
        assert!(top[0].composite_score >= top[1].composite_score);
    }

    #[test]
    fn test_empty_base() {
        let kb = kb();
        assert!(kb.mean_active_composite().abs() < f64::EPSILON);
        assert!(kb.diversity().abs() < f64::EPSILON);
        assert!(kb.dominant_domains().is_empty());
    }

    fn arb_result() -> impl Strategy<Value = SearchResult> {
        (
            prop::sample::select(vec![
                "https://arxiv.org/a",
                "https://ARXIV.org/a?x=1",
                "https://reddit.com/r/q",
                "https://example.com/q",
                "https://www.example.com/q/",
                "https://github.com/q",
            ]),
            "[a-z]{3,8}( [a-z]{3,8}){0,6}",
            0.0..=1.0_f64,
        )
            .prop_map(|(url, content, score)| result(url, "quantum", &content, score, 0))
    }

    proptest! {
        #[test]
        fn prop_dedup_is_idempotent(batch in prop::collection::vec(arb_result(), 0..12)) {
            let mut kb = kb();
            kb.ingest(0, batch.clone(), now());
            let count = kb.items().len();
            let report = kb.ingest(1, batch, now());
            prop_assert_eq!(kb.items().len(), count);
            prop_assert_eq!(report.added, 0);
        }

        #[test]
        fn prop_merge_stays_within_constituents(a in arb_result(), b in arb_result()) {
            let b = SearchResult { url: a.url.clone(), ..b };

            let mut only_a = kb();
            only_a.ingest(0, vec![a.clone()], now());
            let mut only_b = kb();
            only_b.ingest(1, vec![b.clone()], now());
            let mut both = kb();
            both.ingest(0, vec![a], now());
            both.ingest(1, vec![b], now());

            let ca = only_a.items()[0].composite_score;
            let cb = only_b.items()[0].composite_score;
            let merged = both.items()[0].composite_score;
            prop_assert_eq!(both.items().len(), 1);
            prop_assert!(merged >= ca.min(cb) - 1e-9);
            prop_assert!(merged <= ca.max(cb) + 1e-9);
            prop_assert!((0.0..=1.0).contains(&merged));
        }
    }
}
