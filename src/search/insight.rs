//! Read-only analytics over a finished [`SearchProcess`].

use serde::Serialize;

use super::classifier::Tier;
use super::executor::CallStatus;
use super::knowledge::{diversity, domain_counts};
use super::process::{SearchProcess, StopReason};
use super::strategy::StrategyName;

/// Number of domains listed in [`InsightReport::top_domains`].
const TOP_DOMAINS: usize = 5;

/// Summary of how a query's retrieval loop went.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightReport {
    /// Query text.
    pub query: String,
    /// Complexity tier.
    pub tier: Tier,
    /// Strategy used.
    pub strategy: StrategyName,
    /// Rounds run.
    pub rounds_run: usize,
    /// Round budget.
    pub max_rounds: usize,
    /// Why the loop stopped.
    pub stop_reason: StopReason,
    /// New active items per round.
    pub yield_curve: Vec<usize>,
    /// Running total of the yield curve.
    pub cumulative_yield: Vec<usize>,
    /// First round that added nothing, if any.
    pub first_dry_round: Option<usize>,
    /// Search results received.
    pub total_results: usize,
    /// Active knowledge items.
    pub active_items: usize,
    /// Side-pool items.
    pub pooled_items: usize,
    /// Distinct domains divided by active items.
    pub source_diversity: f64,
    /// Most frequent domains among active items.
    pub top_domains: Vec<(String, usize)>,
    /// Mean composite of active items.
    pub mean_composite: f64,
    /// Calls that failed or timed out.
    pub failed_calls: usize,
    /// Calls that returned nothing.
    pub empty_calls: usize,
    /// Rounds where every call failed.
    pub failed_rounds: usize,
    /// Whether the run degraded (a failed round or a model-less answer).
    pub degraded: bool,
    /// Model calls made.
    pub llm_calls: usize,
    /// Wall time in seconds.
    pub elapsed_secs: f64,
}

/// Builds the insight report for `process`.
#[must_use]
pub fn insights(process: &SearchProcess) -> InsightReport {
    let yield_curve: Vec<usize> = process
        .rounds
        .iter()
        .map(|r| r.new_knowledge_count)
        .collect();
    let cumulative_yield = yield_curve
        .iter()
        .scan(0, |total, n| {
            *total += n;
            Some(*total)
        })
        .collect();
    let first_dry_round = process
        .rounds
        .iter()
        .find(|r| r.new_knowledge_count == 0)
        .map(|r| r.round_index);

    let active: Vec<_> = process.active_knowledge().collect();
    let mean_composite = if active.is_empty() {
        0.0
    } else {
        active.iter().map(|i| i.composite_score).sum::<f64>() / active.len() as f64
    };

    let mut top_domains: Vec<(String, usize)> =
        domain_counts(active.iter().copied()).into_iter().collect();
    top_domains.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_domains.truncate(TOP_DOMAINS);

    let calls = process.rounds.iter().flat_map(|r| r.calls.iter());
    let (failed_calls, empty_calls) = calls.fold((0, 0), |(f, e), c| match c.status {
        CallStatus::Failed => (f + 1, e),
        CallStatus::Empty => (f, e + 1),
        CallStatus::Ok => (f, e),
    });
    let failed_rounds = process.failed_rounds();

    InsightReport {
        query: process.query.text().to_string(),
        tier: process.profile.tier,
        strategy: process.strategy.name,
        rounds_run: process.rounds.len(),
        max_rounds: process.strategy.max_rounds,
        stop_reason: process.stop_reason,
        yield_curve,
        cumulative_yield,
        first_dry_round,
        total_results: process.total_results(),
        active_items: active.len(),
        pooled_items: process.knowledge_base.len() - active.len(),
        source_diversity: diversity(active.iter().copied()),
        top_domains,
        mean_composite,
        failed_calls,
        empty_calls,
        failed_rounds,
        degraded: failed_rounds > 0 || process.answer_degraded,
        llm_calls: process.llm_calls,
        elapsed_secs: process.elapsed.as_secs_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::executor::CallReport;
    use crate::search::process::tests::{process, round};

    #[test]
    fn test_yield_curve() {
        let p = process(
            "rust vs go",
            vec![round(0, 10, 4), round(1, 8, 2), round(2, 5, 0), round(3, 5, 0)],
        );
        let report = insights(&p);
        assert_eq!(report.yield_curve, vec![4, 2, 0, 0]);
        assert_eq!(report.cumulative_yield, vec![4, 6, 6, 6]);
        assert_eq!(report.first_dry_round, Some(2));
        assert_eq!(report.total_results, 28);
        assert_eq!(report.rounds_run, 4);
        assert!(!report.degraded);
    }

    #[test]
    fn test_empty_process() {
        let report = insights(&process("x", Vec::new()));
        assert!(report.yield_curve.is_empty());
        assert_eq!(report.first_dry_round, None);
        assert_eq!(report.active_items, 0);
        assert!(report.source_diversity.abs() < f64::EPSILON);
        assert!(report.mean_composite.abs() < f64::EPSILON);
    }

    #[test]
    fn test_failures_mark_degraded() {
        let mut failed = round(0, 0, 0);
        failed.failed = true;
        failed.calls = vec![CallReport {
            query: "q".to_string(),
            hits: 0,
            status: CallStatus::Failed,
            error: Some("boom".to_string()),
            elapsed_ms: 3,
        }];
        let mut empty = round(1, 0, 0);
        empty.calls = vec![CallReport {
            query: "q2".to_string(),
            hits: 0,
            status: CallStatus::Empty,
            error: None,
            elapsed_ms: 1,
        }];
        let report = insights(&process("x", vec![failed, empty]));
        assert_eq!(report.failed_calls, 1);
        assert_eq!(report.empty_calls, 1);
        assert_eq!(report.failed_rounds, 1);
        assert!(report.degraded);
    }

    #[test]
    fn test_report_is_pure() {
        let p = process("rust", vec![round(0, 3, 1)]);
        assert_eq!(insights(&p), insights(&p));
    }
}
