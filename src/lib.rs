//! # deepsearch
//!
//! Adaptive multi-round web research.
//!
//! A query is classified by complexity, mapped to a search strategy, and
//! answered by a Reason → Act → Observe → Reflect loop that issues web
//! searches, fuses and deduplicates the results into a scored knowledge
//! base, and stops when quality is reached, information dries up or the
//! round budget runs out. A language model, when configured, proposes
//! follow-up queries and writes the final answer; without one the loop runs
//! on deterministic rules and answers extractively.
//!
//! ## Example
//!
//! ```no_run
//! use deepsearch::{Config, DeepSearch, insights};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::builder().from_env().build()?;
//! let engine = DeepSearch::from_config(config)?;
//! let process = engine.run_query("How does Rust compare to Go for web servers").await?;
//! let report = insights(&process);
//! assert!(report.rounds_run <= report.max_rounds);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod search;

pub use config::{Config, ConfigBuilder};
pub use core::{Query, Script};
pub use engine::{DeepSearch, RunOptions, insights};
pub use error::{AgentError, CommandError, Error, Result};
pub use search::{
    ComplexityProfile, InsightReport, KnowledgeItem, RoundRecord, SearchProcess, SessionHistory,
    SessionStats, StopReason, Strategy, StrategyName, Tier, WebSearch, classify,
};
