//! CLI layer for deepsearch.
//!
//! Provides the command-line interface using clap: one-shot research,
//! offline classification, an interactive session and prompt scaffolding.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands, RunArgs};
