//! Score components for knowledge items.
//!
//! - relevance: term coverage of the query and its variants, blended with the
//!   provider score
//! - authority: static domain reputation table
//! - recency: exponential decay with a one-year half-life, `0.5` when the
//!   publication date is unknown
//!
//! [`FusionWeights`] combine the three into a composite in `[0, 1]`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::coverage;

/// Neutral score for unknown recency or authority.
pub const NEUTRAL_SCORE: f64 = 0.5;
/// Recency half-life in days.
pub const RECENCY_HALF_LIFE_DAYS: f64 = 365.0;
/// Share of relevance taken from term coverage (the rest is provider score).
const COVERAGE_SHARE: f64 = 0.7;

/// Weights of the composite score, normalized to sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    /// Relevance weight.
    pub relevance: f64,
    /// Authority weight.
    pub authority: f64,
    /// Recency weight.
    pub recency: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            relevance: 0.5,
            authority: 0.3,
            recency: 0.2,
        }
    }
}

impl FusionWeights {
    /// Creates normalized weights.
    ///
    /// Returns `None` if any weight is negative or not finite, or if all are
    /// zero.
    #[must_use]
    pub fn new(relevance: f64, authority: f64, recency: f64) -> Option<Self> {
        let parts = [relevance, authority, recency];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return None;
        }
        let sum: f64 = parts.iter().sum();
        if sum <= 0.0 {
            return None;
        }
        Some(Self {
            relevance: relevance / sum,
            authority: authority / sum,
            recency: recency / sum,
        })
    }

    /// Combines the components, clamped to `[0, 1]`.
    #[must_use]
    pub fn composite(&self, relevance: f64, authority: f64, recency: f64) -> f64 {
        (self.relevance * relevance + self.authority * authority + self.recency * recency)
            .clamp(0.0, 1.0)
    }
}

/// Static domain reputation table.
///
/// Rules are matched on the domain suffix; the first match wins. Domains not
/// in the table score [`NEUTRAL_SCORE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorityTable {
    rules: Vec<(String, f64)>,
}

impl Default for AuthorityTable {
    fn default() -> Self {
        let rules: &[(&str, f64)] = &[
            (".gov", 0.9),
            (".edu", 0.9),
            ("arxiv.org", 0.9),
            ("nature.com", 0.9),
            ("ieee.org", 0.9),
            ("acm.org", 0.9),
            ("wikipedia.org", 0.85),
            ("docs.rs", 0.85),
            ("rust-lang.org", 0.85),
            ("python.org", 0.85),
            ("developer.mozilla.org", 0.85),
            ("github.com", 0.8),
            ("reuters.com", 0.8),
            ("bbc.com", 0.8),
            ("bbc.co.uk", 0.8),
            ("bloomberg.com", 0.8),
            ("nytimes.com", 0.8),
            ("stackoverflow.com", 0.75),
            ("medium.com", 0.55),
            ("reddit.com", 0.35),
            ("twitter.com", 0.35),
            ("x.com", 0.35),
            ("facebook.com", 0.35),
            ("quora.com", 0.35),
        ];
        Self {
            rules: rules.iter().map(|(d, s)| ((*d).to_string(), *s)).collect(),
        }
    }
}

impl AuthorityTable {
    /// Creates a table from `(suffix, score)` rules.
    #[must_use]
    pub fn new(rules: Vec<(String, f64)>) -> Self {
        Self {
            rules: rules
                .into_iter()
                .map(|(d, s)| (d.to_lowercase(), s.clamp(0.0, 1.0)))
                .collect(),
        }
    }

    /// Authority of `domain` (lowercase host without `www.`).
    #[must_use]
    pub fn score(&self, domain: Option<&str>) -> f64 {
        let Some(domain) = domain else {
            return NEUTRAL_SCORE;
        };
        self.rules
            .iter()
            .find(|(rule, _)| suffix_matches(domain, rule))
            .map_or(NEUTRAL_SCORE, |(_, s)| *s)
    }
}

fn suffix_matches(domain: &str, rule: &str) -> bool {
    if rule.starts_with('.') {
        return domain.ends_with(rule);
    }
    domain == rule
        || domain
            .strip_suffix(rule)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Recency of a document published at `published_at`, seen at `now`.
///
/// Halves every [`RECENCY_HALF_LIFE_DAYS`]; future dates score 1.
#[must_use]
pub fn recency_score(published_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(published) = published_at else {
        return NEUTRAL_SCORE;
    };
    let age_days = (now - published).num_seconds() as f64 / 86_400.0;
    if age_days <= 0.0 {
        return 1.0;
    }
    0.5_f64.powf(age_days / RECENCY_HALF_LIFE_DAYS)
}

/// Relevance of a document's terms to a set of reference term sets.
///
/// Uses the best coverage over the references, blended with the provider
/// score.
#[must_use]
pub fn relevance_score(
    references: &[BTreeSet<String>],
    document: &BTreeSet<String>,
    source_score: f64,
) -> f64 {
    let best = references
        .iter()
        .map(|r| coverage(r, document))
        .fold(0.0_f64, f64::max);
    (COVERAGE_SHARE * best + (1.0 - COVERAGE_SHARE) * source_score.clamp(0.0, 1.0)).clamp(0.0, 1.0)
}
