//! Adaptive multi-round retrieval.
//!
//! A query flows through six stages:
//!
//! ```text
//! Query ─► classifier ─► strategy ─► controller ─┬─► executor ─► WebSearch
//!                                     ▲          │
//!                                     │          ▼
//!                                     └──── knowledge base
//!                                                │
//!                                                ▼
//!                                  SearchProcess ─► insight
//! ```
//!
//! Classification and strategy selection are pure. The controller owns the
//! round loop and is the only component that decides when to stop. The
//! executor absorbs per-call failures, so a bad provider degrades a round
//! instead of aborting the query.

pub mod classifier;
pub mod controller;
pub mod executor;
pub mod insight;
pub mod knowledge;
pub mod process;
pub mod provider;
pub mod providers;
pub mod scoring;
pub mod strategy;

pub use classifier::{
    Classifier, ClassifierConfig, ComplexityProfile, DomainHint, Signals, Tier, classify,
};
pub use controller::{Advisor, LoopOutcome, Phase, ReflectionController};
pub use executor::{CallReport, CallStatus, RoundExecutor, RoundOutput, SearchResult};
pub use insight::{InsightReport, insights};
pub use knowledge::{KnowledgeBase, KnowledgeConfig, KnowledgeItem, MergeReport};
pub use process::{
    QuerySource, ReflectionDecision, RoundRecord, SearchProcess, SessionHistory, SessionStats,
    StopReason,
};
pub use provider::{RawHit, SearchDepth, SearchParams, WebSearch};
pub use scoring::{AuthorityTable, FusionWeights};
pub use strategy::{
    Strategy, StrategyName, StrategyOverrides, priority_domains, select_strategy, strategy_for,
};
