//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{ConfigBuilder, NO_LLM_PROVIDER};

/// deepsearch: adaptive multi-round web research.
///
/// Classifies a query, picks a search strategy, and runs search rounds
/// until the gathered sources are good enough, stop adding anything, or
/// the round budget is spent.
#[derive(Parser, Debug)]
#[command(name = "deepsearch")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (debug logging on stderr).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json, ndjson).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Research a question and print the answer.
    ///
    /// Requires `TAVILY_API_KEY`, and `DEEPSEEK_API_KEY` (or
    /// `OPENAI_API_KEY`) unless `--no-llm` is given.
    #[command(after_help = r#"Examples:
  deepsearch ask "what is quantum computing"
  deepsearch ask "How does Rust compare to Go for web servers" --rounds
  deepsearch ask "latest CRISPR trials" --stream
  deepsearch ask "rust async runtimes" --no-llm --max-rounds 2
  deepsearch --format json ask "zig comptime" | jq '.insights.stop_reason'
"#)]
    Ask {
        /// Question to research.
        query: String,

        /// Stream the answer as it is generated (text format only).
        #[arg(long)]
        stream: bool,

        /// Print the per-round trace after the answer.
        #[arg(long)]
        rounds: bool,

        /// Run overrides.
        #[command(flatten)]
        run: RunArgs,
    },

    /// Classify a question without searching.
    ///
    /// Shows the complexity tier, extracted concepts, sub-questions,
    /// search variants and the strategy that would be used. Needs no keys.
    #[command(after_help = r#"Examples:
  deepsearch classify "what is quantum computing"
  deepsearch --format json classify "is postgres better than mysql for analytics"
"#)]
    Classify {
        /// Question to classify.
        query: String,

        /// Run overrides applied to the shown strategy.
        #[command(flatten)]
        run: RunArgs,
    },

    /// Start an interactive research session.
    ///
    /// Every line is researched in turn. Commands: /history, /stats,
    /// /insights, /clear, /help, /quit.
    Repl {
        /// Run overrides.
        #[command(flatten)]
        run: RunArgs,
    },

    /// Write the default prompt templates to a directory.
    ///
    /// Existing files are kept. Edit the written files to customize the
    /// reasoning and answer prompts.
    InitPrompts {
        /// Target directory (default: ~/.config/deepsearch-rs/prompts).
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

/// Overrides shared by the research commands.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Override the round budget.
    #[arg(long)]
    pub max_rounds: Option<usize>,

    /// Override the per-call result cap.
    #[arg(long)]
    pub results_per_round: Option<usize>,

    /// Override the quality threshold (0.0-1.0).
    #[arg(long)]
    pub quality_threshold: Option<f64>,

    /// Mean active quality that ends research early (0.0-1.0).
    #[arg(long)]
    pub sufficiency_threshold: Option<f64>,

    /// Override the diversity threshold (0.0-1.0).
    #[arg(long)]
    pub diversity_threshold: Option<f64>,

    /// Maximum concurrent search calls.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Chat model for reasoning and answers.
    #[arg(long)]
    pub model: Option<String>,

    /// Run without a language model (rule-based queries, extractive answer).
    #[arg(long)]
    pub no_llm: bool,

    /// Directory containing prompt template files.
    #[arg(long, env = "DEEPSEARCH_PROMPT_DIR")]
    pub prompt_dir: Option<PathBuf>,
}

impl RunArgs {
    /// Applies the overrides on top of `builder`.
    #[must_use]
    pub fn apply(&self, mut builder: ConfigBuilder) -> ConfigBuilder {
        if let Some(n) = self.max_rounds {
            builder = builder.max_rounds(n);
        }
        if let Some(n) = self.results_per_round {
            builder = builder.results_per_round(n);
        }
        if let Some(t) = self.quality_threshold {
            builder = builder.quality_threshold(t);
        }
        if let Some(t) = self.sufficiency_threshold {
            builder = builder.sufficiency_threshold(t);
        }
        if let Some(t) = self.diversity_threshold {
            builder = builder.diversity_threshold(t);
        }
        if let Some(n) = self.concurrency {
            builder = builder.max_concurrency(n);
        }
        if let Some(model) = &self.model {
            builder = builder.model(model.clone());
        }
        if self.no_llm {
            builder = builder.llm_provider(NO_LLM_PROVIDER);
        }
        if let Some(dir) = &self.prompt_dir {
            builder = builder.prompt_dir(dir.clone());
        }
        builder
    }
}
