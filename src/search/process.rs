//! Records of a finished retrieval loop and the session log.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::classifier::ComplexityProfile;
use super::executor::CallReport;
use super::knowledge::KnowledgeItem;
use super::strategy::Strategy;
use crate::core::Query;

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The round budget was used up.
    BudgetExhausted,
    /// Mean active quality and source diversity both cleared their thresholds.
    QualitySatisfied,
    /// Two consecutive rounds added no active knowledge.
    NoNewInformation,
    /// The caller cancelled between rounds.
    Cancelled,
}

impl StopReason {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BudgetExhausted => "budget_exhausted",
            Self::QualitySatisfied => "quality_satisfied",
            Self::NoNewInformation => "no_new_information",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the reflect phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionDecision {
    /// Run another round.
    Continue,
    /// Stop the loop.
    Stop,
}

/// Where a round's queries came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuerySource {
    /// Classifier variants (round 0).
    Variants,
    /// Model gap analysis.
    GapAnalysis,
    /// Deterministic follow-up rule.
    FollowUpRule,
}

/// One completed round. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    /// Zero-based round index.
    pub round_index: usize,
    /// Why these queries were chosen.
    pub reasoning_note: String,
    /// What the round did, in one line.
    pub action_taken: String,
    /// Queries issued.
    pub queries: Vec<String>,
    /// Origin of the queries.
    pub query_source: QuerySource,
    /// Domains excluded for this round.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_domains: Vec<String>,
    /// Domains the round asked the provider to prefer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included_domains: Vec<String>,
    /// Per-call outcomes.
    pub calls: Vec<CallReport>,
    /// Whether every call failed.
    pub failed: bool,
    /// Results received from the provider.
    pub results_received: usize,
    /// Items that became active this round.
    pub new_knowledge_count: usize,
    /// Active items after the round.
    pub active_total: usize,
    /// Mean active composite after the round.
    pub mean_composite: f64,
    /// Source diversity after the round.
    pub diversity: f64,
    /// What was observed, in one line.
    pub observation_summary: String,
    /// Continue or stop.
    pub reflection_decision: ReflectionDecision,
    /// Wall time of the round.
    #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
    pub elapsed: Duration,
}

/// A finished retrieval loop. Read-only once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchProcess {
    /// The query.
    pub query: Query,
    /// Its classification.
    pub profile: ComplexityProfile,
    /// The strategy that drove the loop.
    pub strategy: Strategy,
    /// One record per completed round.
    pub rounds: Vec<RoundRecord>,
    /// All knowledge items, active and pooled.
    pub knowledge_base: Vec<KnowledgeItem>,
    /// Best-effort answer.
    pub final_answer: String,
    /// Set when the answer was built without the model.
    pub answer_degraded: bool,
    /// Why the loop stopped.
    pub stop_reason: StopReason,
    /// Model calls made (gap analysis and answer).
    pub llm_calls: usize,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// Total wall time.
    #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
    pub elapsed: Duration,
}

impl SearchProcess {
    /// Active knowledge items in insertion order.
    pub fn active_knowledge(&self) -> impl Iterator<Item = &KnowledgeItem> {
        self.knowledge_base.iter().filter(|i| i.active)
    }

    /// Results received across all rounds.
    #[must_use]
    pub fn total_results(&self) -> usize {
        self.rounds.iter().map(|r| r.results_received).sum()
    }

    /// Rounds in which every call failed.
    #[must_use]
    pub fn failed_rounds(&self) -> usize {
        self.rounds.iter().filter(|r| r.failed).count()
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_duration<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_f64(d.as_secs_f64())
}

fn deserialize_duration<'de, D>(d: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let secs = f64::deserialize(d)?;
    Ok(Duration::try_from_secs_f64(secs).unwrap_or_default())
}

/// Append-only log of finished processes, shared across callers.
///
/// Readers get snapshots; nothing but [`SessionHistory::clear`] removes
/// entries.
#[derive(Debug, Default)]
pub struct SessionHistory {
    entries: RwLock<Vec<Arc<SearchProcess>>>,
}

impl SessionHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a finished process and returns the shared handle.
    pub fn push(&self, process: SearchProcess) -> Arc<SearchProcess> {
        let process = Arc::new(process);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&process));
        process
    }

    /// Copy of the current entries, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<SearchProcess>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Most recent entry.
    #[must_use]
    pub fn last(&self) -> Option<Arc<SearchProcess>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Aggregate statistics over the current entries.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        SessionStats::from_processes(&self.snapshot())
    }
}

/// Totals folded from the session history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Queries answered.
    pub queries: usize,
    /// Rounds run.
    pub rounds: usize,
    /// Search results received.
    pub results: usize,
    /// Active knowledge items kept.
    pub active_items: usize,
    /// Model calls made.
    pub llm_calls: usize,
    /// Answers built without the model.
    pub degraded_answers: usize,
}

impl SessionStats {
    /// Folds statistics from `processes`.
    #[must_use]
    pub fn from_processes(processes: &[Arc<SearchProcess>]) -> Self {
        processes.iter().fold(Self::default(), |mut acc, p| {
            acc.queries += 1;
            acc.rounds += p.rounds.len();
            acc.results += p.total_results();
            acc.active_items += p.active_knowledge().count();
            acc.llm_calls += p.llm_calls;
            acc.degraded_answers += usize::from(p.answer_degraded);
            acc
        })
    }
}
