//! Strategy selection.
//!
//! Maps a [`Tier`] to a [`Strategy`]. The mapping is a pure table lookup,
//! deterministic and free of I/O, so it can be tested in isolation.
//!
//! # Resolution Chain
//!
//! Numbers are resolved in priority order:
//! **Overrides → Table**
//!
//! The tier → strategy name mapping is fixed; only the numeric parameters
//! can be overridden.

use serde::{Deserialize, Serialize};

use super::classifier::{DomainHint, Tier};
use super::provider::SearchDepth;

/// Default minimum composite score for an item to count as active.
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.6;
/// Default minimum mean active composite for the quality stop rule.
pub const DEFAULT_SUFFICIENCY_THRESHOLD: f64 = 0.7;
/// Default minimum source diversity for the quality stop rule.
pub const DEFAULT_DIVERSITY_THRESHOLD: f64 = 0.5;
/// Upper bound on concurrent queries in a `parallel_deep` round.
pub const PARALLEL_DEEP_FAN_OUT: usize = 6;
/// Queries issued per `multi_angle` round.
pub const MULTI_ANGLE_FAN_OUT: usize = 3;

/// Priority domains taken from each detected hint.
pub const PRIORITY_DOMAINS_PER_HINT: usize = 2;
/// Upper bound on priority domains for one query.
pub const MAX_PRIORITY_DOMAINS: usize = 5;

/// Social-media domains excluded from `sequential` rounds.
const SOCIAL_DOMAINS: &[&str] = &["reddit.com", "twitter.com", "x.com", "facebook.com"];

const ACADEMIC_DOMAINS: &[&str] = &[
    "arxiv.org",
    "scholar.google.com",
    "pubmed.ncbi.nlm.nih.gov",
    "ieee.org",
];
const TECHNICAL_DOMAINS: &[&str] = &[
    "github.com",
    "stackoverflow.com",
    "docs.python.org",
    "developer.mozilla.org",
];
const BUSINESS_DOMAINS: &[&str] = &["harvard.edu", "mit.edu", "stanford.edu", "fortune.com"];
const NEWS_DOMAINS: &[&str] = &["reuters.com", "bbc.com", "cnn.com", "bloomberg.com"];

/// Closed set of search strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyName {
    /// One query, one round.
    Direct,
    /// Several phrasings of the query in parallel.
    MultiAngle,
    /// One query per round, each building on the previous.
    Sequential,
    /// Wide concurrent fan-out over several rounds.
    ParallelDeep,
}

impl StrategyName {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::MultiAngle => "multi_angle",
            Self::Sequential => "sequential",
            Self::ParallelDeep => "parallel_deep",
        }
    }
}

impl std::fmt::Display for StrategyName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters that drive the retrieval loop for one query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    /// Strategy name.
    pub name: StrategyName,
    /// Round budget (at least 1).
    pub max_rounds: usize,
    /// Result cap per search call (at least 1).
    pub results_per_round: usize,
    /// Minimum composite score for an item to be active.
    pub quality_threshold: f64,
    /// Minimum mean active composite for the quality stop rule. Never below
    /// `quality_threshold`, since every active item already clears that.
    pub sufficiency_threshold: f64,
    /// Minimum distinct-domain ratio for the quality stop rule.
    pub diversity_threshold: f64,
}

impl Strategy {
    /// Maximum number of queries issued in one round.
    #[must_use]
    pub const fn queries_per_round(&self) -> usize {
        match self.name {
            StrategyName::Direct | StrategyName::Sequential => 1,
            StrategyName::MultiAngle => MULTI_ANGLE_FAN_OUT,
            StrategyName::ParallelDeep => PARALLEL_DEEP_FAN_OUT,
        }
    }

    /// Search depth hint passed to the provider.
    #[must_use]
    pub const fn search_depth(&self) -> SearchDepth {
        match self.name {
            StrategyName::Direct => SearchDepth::Basic,
            _ => SearchDepth::Advanced,
        }
    }

    /// Domains always excluded by this strategy.
    #[must_use]
    pub const fn excluded_domains(&self) -> &'static [&'static str] {
        match self.name {
            StrategyName::Sequential => SOCIAL_DOMAINS,
            _ => &[],
        }
    }

    /// Whether the first follow-up asks for an overview before deepening.
    #[must_use]
    pub const fn opens_with_overview(&self) -> bool {
        matches!(self.name, StrategyName::Sequential)
    }
}

/// Suffix of the overview query issued by [`Strategy::opens_with_overview`].
#[must_use]
pub const fn overview_suffix(han: bool) -> &'static str {
    if han { "概述" } else { "overview" }
}

/// Sources known to cover a topic area well, strongest first.
#[must_use]
pub const fn hint_domains(hint: DomainHint) -> &'static [&'static str] {
    match hint {
        DomainHint::Academic => ACADEMIC_DOMAINS,
        DomainHint::Technical => TECHNICAL_DOMAINS,
        DomainHint::Business => BUSINESS_DOMAINS,
        DomainHint::News => NEWS_DOMAINS,
    }
}

/// Priority domains for a query's hints: the first
/// [`PRIORITY_DOMAINS_PER_HINT`] of each, deduplicated, at most
/// [`MAX_PRIORITY_DOMAINS`].
#[must_use]
pub fn priority_domains(hints: &[DomainHint]) -> Vec<String> {
    let mut domains: Vec<String> = Vec::new();
    for hint in hints {
        for domain in hint_domains(*hint).iter().take(PRIORITY_DOMAINS_PER_HINT) {
            if !domains.iter().any(|d| d == domain) {
                domains.push((*domain).to_string());
            }
        }
    }
    domains.truncate(MAX_PRIORITY_DOMAINS);
    domains
}

/// Numeric overrides applied on top of the table.
///
/// `None` means "use the table value". Out-of-range values are clamped:
/// counts to at least 1, thresholds to `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyOverrides {
    /// Override the round budget.
    pub max_rounds: Option<usize>,
    /// Override the per-call result cap.
    pub results_per_round: Option<usize>,
    /// Override the quality threshold.
    pub quality_threshold: Option<f64>,
    /// Override the sufficiency threshold.
    pub sufficiency_threshold: Option<f64>,
    /// Override the diversity threshold.
    pub diversity_threshold: Option<f64>,
}

/// Returns the table strategy for `tier`.
///
/// This is a pure function: no I/O, no config reads, fully deterministic.
///
/// | Tier        | Strategy        | Max Rounds | Results/Round |
/// |-------------|-----------------|------------|---------------|
/// | simple      | direct          | 1          | 10            |
/// | moderate    | `multi_angle`   | 2          | 10            |
/// | complex     | sequential      | 3          | 12            |
/// | `multi_hop` | `parallel_deep` | 5          | 15            |
#[must_use]
pub const fn strategy_for(tier: Tier) -> Strategy {
    let (name, max_rounds, results_per_round) = match tier {
        Tier::Simple => (StrategyName::Direct, 1, 10),
        Tier::Moderate => (StrategyName::MultiAngle, 2, 10),
        Tier::Complex => (StrategyName::Sequential, 3, 12),
        Tier::MultiHop => (StrategyName::ParallelDeep, 5, 15),
    };
    Strategy {
        name,
        max_rounds,
        results_per_round,
        quality_threshold: DEFAULT_QUALITY_THRESHOLD,
        sufficiency_threshold: DEFAULT_SUFFICIENCY_THRESHOLD,
        diversity_threshold: DEFAULT_DIVERSITY_THRESHOLD,
    }
}

/// Returns the strategy for `tier` with `overrides` applied.
#[must_use]
pub fn select_strategy(tier: Tier, overrides: &StrategyOverrides) -> Strategy {
    let base = strategy_for(tier);
    let quality_threshold =
        clamp_unit(overrides.quality_threshold.unwrap_or(base.quality_threshold));
    Strategy {
        name: base.name,
        max_rounds: overrides.max_rounds.unwrap_or(base.max_rounds).max(1),
        results_per_round: overrides
            .results_per_round
            .unwrap_or(base.results_per_round)
            .max(1),
        quality_threshold,
        sufficiency_threshold: clamp_unit(
            overrides
                .sufficiency_threshold
                .unwrap_or(base.sufficiency_threshold),
        )
        .max(quality_threshold),
        diversity_threshold: clamp_unit(
            overrides
                .diversity_threshold
                .unwrap_or(base.diversity_threshold),
        ),
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
