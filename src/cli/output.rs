//! Output rendering for CLI commands.
//!
//! Text output is meant for humans; JSON and NDJSON are stable enough to
//! pipe into `jq`.

#![allow(clippy::format_push_string)]

use std::fmt::Write;
use std::sync::Arc;

use serde::Serialize;

use crate::search::classifier::ComplexityProfile;
use crate::search::executor::CallStatus;
use crate::search::insight::InsightReport;
use crate::search::process::{SearchProcess, SessionStats};
use crate::search::strategy::{Strategy, priority_domains};

/// Characters of a history entry's answer shown in text output.
const ANSWER_PREVIEW_CHARS: usize = 80;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
    /// One compact JSON document per line.
    Ndjson,
}

impl OutputFormat {
    /// Parses a format name; unknown names fall back to text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "ndjson" | "jsonl" => Self::Ndjson,
            _ => Self::Text,
        }
    }

    /// Whether this is a JSON flavour.
    #[must_use]
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json | Self::Ndjson)
    }

    /// Serializes `value` in this format's JSON flavour.
    #[must_use]
    pub fn to_json<T: Serialize + ?Sized>(self, value: &T) -> String {
        let rendered = match self {
            Self::Ndjson => serde_json::to_string(value),
            _ => serde_json::to_string_pretty(value),
        };
        rendered.unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
    }
}

/// Renders a classification.
#[must_use]
pub fn format_profile(
    profile: &ComplexityProfile,
    strategy: &Strategy,
    format: OutputFormat,
) -> String {
    if format.is_json() {
        return format.to_json(&serde_json::json!({
            "profile": profile,
            "strategy": strategy,
        }));
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "Tier: {} (score {:.2}; lexical {:.2}, syntactic {:.2}, semantic {:.2})",
        profile.tier,
        profile.signals.score,
        profile.signals.lexical,
        profile.signals.syntactic,
        profile.signals.semantic,
    );
    if profile.fallback {
        out.push_str("No concepts found; using the query as-is.\n");
    }
    let _ = writeln!(out, "Concepts: {}", list_or_none(&profile.concepts));
    if profile.requires_multi_hop {
        out.push_str("Multi-hop: yes\n");
    }
    if !profile.sub_questions.is_empty() {
        out.push_str("Sub-questions:\n");
        for q in &profile.sub_questions {
            let _ = writeln!(out, "  - {q}");
        }
    }
    out.push_str("Variants:\n");
    for v in &profile.variants {
        let _ = writeln!(out, "  - {v}");
    }
    if !profile.domain_hints.is_empty() {
        let hints: Vec<String> = profile.domain_hints.iter().map(ToString::to_string).collect();
        let _ = writeln!(
            out,
            "Domains: {} (prefer {})",
            hints.join(", "),
            priority_domains(&profile.domain_hints).join(", ")
        );
    }
    let _ = writeln!(
        out,
        "Strategy: {} ({} round(s), {} result(s)/call, {} quer{}/round, {} depth)",
        strategy.name,
        strategy.max_rounds,
        strategy.results_per_round,
        strategy.queries_per_round(),
        if strategy.queries_per_round() == 1 { "y" } else { "ies" },
        strategy.search_depth(),
    );
    let _ = writeln!(
        out,
        "Stop: quality {:.2}, sufficiency {:.2}, diversity {:.2}",
        strategy.quality_threshold, strategy.sufficiency_threshold, strategy.diversity_threshold,
    );
    out
}

/// Renders a finished process with its insight report.
#[must_use]
pub fn format_process(
    process: &SearchProcess,
    report: &InsightReport,
    show_rounds: bool,
    show_answer: bool,
    format: OutputFormat,
) -> String {
    if format.is_json() {
        return format.to_json(&serde_json::json!({
            "process": process,
            "insights": report,
        }));
    }

    let mut out = String::new();
    if show_answer {
        out.push_str(process.final_answer.trim_end());
        out.push('\n');
    }
    if show_rounds {
        out.push('\n');
        out.push_str(&format_rounds(process));
    }
    out.push_str("\n---\n");
    out.push_str(&summary_line(report));
    out.push('\n');
    out
}

/// One-line summary of an insight report.
#[must_use]
pub fn summary_line(report: &InsightReport) -> String {
    let mut line = format!(
        "Tier: {} | Strategy: {} | Rounds: {}/{} | Stop: {} | Sources: {} active, {} pooled | \
         Quality: {:.2} | Diversity: {:.2} | Time: {:.1}s",
        report.tier,
        report.strategy,
        report.rounds_run,
        report.max_rounds,
        report.stop_reason,
        report.active_items,
        report.pooled_items,
        report.mean_composite,
        report.source_diversity,
        report.elapsed_secs,
    );
    if report.failed_calls > 0 {
        line.push_str(&format!(" | Failed calls: {}", report.failed_calls));
    }
    if report.degraded {
        line.push_str(" | degraded");
    }
    line
}

/// Per-round trace of a process.
#[must_use]
pub fn format_rounds(process: &SearchProcess) -> String {
    let mut out = String::new();
    for r in &process.rounds {
        let _ = writeln!(
            out,
            "Round {} [{:?}] {}",
            r.round_index + 1,
            r.query_source,
            r.reasoning_note
        );
        for call in &r.calls {
            let status = match call.status {
                CallStatus::Ok => format!("{} hit(s)", call.hits),
                CallStatus::Empty => "empty".to_string(),
                CallStatus::Failed => {
                    format!("failed: {}", call.error.as_deref().unwrap_or("unknown"))
                }
            };
            let _ = writeln!(out, "  - \"{}\" -> {status} ({} ms)", call.query, call.elapsed_ms);
        }
        if !r.included_domains.is_empty() {
            let _ = writeln!(out, "  preferred: {}", r.included_domains.join(", "));
        }
        if !r.excluded_domains.is_empty() {
            let _ = writeln!(out, "  excluded: {}", r.excluded_domains.join(", "));
        }
        let _ = writeln!(
            out,
            "  {} -> {:?}",
            r.observation_summary, r.reflection_decision
        );
    }
    out
}

/// Renders an insight report.
#[must_use]
pub fn format_insights(report: &InsightReport, format: OutputFormat) -> String {
    if format.is_json() {
        return format.to_json(report);
    }

    let mut out = String::new();
    let _ = writeln!(out, "Query: {}", report.query);
    let _ = writeln!(
        out,
        "Tier: {} | Strategy: {} | Rounds: {}/{} | Stop: {}",
        report.tier, report.strategy, report.rounds_run, report.max_rounds, report.stop_reason
    );
    let _ = writeln!(
        out,
        "Yield per round: {} (cumulative {})",
        join_counts(&report.yield_curve),
        join_counts(&report.cumulative_yield)
    );
    if let Some(round) = report.first_dry_round {
        let _ = writeln!(out, "First dry round: {}", round + 1);
    }
    let _ = writeln!(
        out,
        "Results: {} received, {} active, {} pooled",
        report.total_results, report.active_items, report.pooled_items
    );
    let _ = writeln!(
        out,
        "Mean quality: {:.2} | Source diversity: {:.2}",
        report.mean_composite, report.source_diversity
    );
    if !report.top_domains.is_empty() {
        let domains: Vec<String> = report
            .top_domains
            .iter()
            .map(|(d, n)| format!("{d} ({n})"))
            .collect();
        let _ = writeln!(out, "Top domains: {}", domains.join(", "));
    }
    let _ = writeln!(
        out,
        "Calls: {} failed, {} empty | Failed rounds: {} | Model calls: {}",
        report.failed_calls, report.empty_calls, report.failed_rounds, report.llm_calls
    );
    let _ = writeln!(
        out,
        "Degraded: {} | Time: {:.1}s",
        if report.degraded { "yes" } else { "no" },
        report.elapsed_secs
    );
    out
}

/// Renders the session history, oldest first.
#[must_use]
pub fn format_history(processes: &[Arc<SearchProcess>], format: OutputFormat) -> String {
    if format.is_json() {
        let entries: Vec<serde_json::Value> = processes
            .iter()
            .map(|p| {
                serde_json::json!({
                    "query": p.query.text(),
                    "tier": p.profile.tier,
                    "strategy": p.strategy.name,
                    "rounds": p.rounds.len(),
                    "stop_reason": p.stop_reason,
                    "started_at": p.started_at,
                })
            })
            .collect();
        return format.to_json(&entries);
    }

    if processes.is_empty() {
        return "No queries yet.\n".to_string();
    }
    let mut out = String::new();
    for (i, p) in processes.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} [{} / {} rounds / {}]",
            i + 1,
            p.query,
            p.strategy.name,
            p.rounds.len(),
            p.stop_reason
        );
        let _ = writeln!(out, "   {}", preview(&p.final_answer));
    }
    out
}

/// Renders session statistics.
#[must_use]
pub fn format_stats(stats: &SessionStats, format: OutputFormat) -> String {
    if format.is_json() {
        return format.to_json(stats);
    }
    format!(
        "Queries: {}\nRounds: {}\nResults: {}\nActive sources: {}\nModel calls: {}\n\
         Degraded answers: {}\n",
        stats.queries,
        stats.rounds,
        stats.results,
        stats.active_items,
        stats.llm_calls,
        stats.degraded_answers,
    )
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

fn join_counts(counts: &[usize]) -> String {
    if counts.is_empty() {
        return "-".to_string();
    }
    counts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn preview(answer: &str) -> String {
    let flat = answer.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(ANSWER_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}
