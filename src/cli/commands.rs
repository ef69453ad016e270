//! CLI command implementations.
//!
//! Contains the business logic for each CLI command. Research commands
//! build a tokio runtime as the sync/async bridge; `classify` and
//! `init-prompts` run without one.

#![allow(clippy::format_push_string)]

use std::fmt::Write as FmtWrite;
use std::io::{self, BufRead, Write as IoWrite};
use std::path::{Path, PathBuf};

use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::agent::prompt::PromptSet;
use crate::cli::output::{
    OutputFormat, format_history, format_insights, format_process, format_profile, format_stats,
};
use crate::cli::parser::{Cli, Commands, RunArgs};
use crate::config::Config;
use crate::core::Query;
use crate::engine::{DeepSearch, RunOptions, insights};
use crate::error::{CommandError, Result};
use crate::search::classifier::classify;
use crate::search::strategy::{StrategyOverrides, select_strategy};

const REPL_HELP: &str = "\
Type a question to research it. Commands:
  /history   list earlier queries
  /stats     session totals
  /insights  insight report of the last query
  /clear     forget history and conversation memory
  /help      show this help
  /quit      leave the session
";

/// Executes the CLI command.
///
/// Returns whatever is left to print once the command finishes; streamed
/// answers and REPL output are written to stdout as they happen.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the command fails.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Ask {
            query,
            stream,
            rounds,
            run,
        } => cmd_ask(query, *stream, *rounds, run, format),
        Commands::Classify { query, run } => cmd_classify(query, run, format),
        Commands::Repl { run } => cmd_repl(run, format),
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format),
    }
}

/// Builds the configuration from the environment and CLI overrides.
fn load_config(run: &RunArgs) -> Result<Config> {
    run.apply(Config::builder().from_env())
        .build()
        .map_err(|e| CommandError::ExecutionFailed(format!("Configuration error: {e}")).into())
}

fn runtime() -> Result<Runtime> {
    Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}")).into()
    })
}

fn engine(run: &RunArgs) -> Result<DeepSearch> {
    let config = load_config(run)?;
    DeepSearch::from_config(config).map_err(|e| {
        CommandError::ExecutionFailed(format!("Backend initialization failed: {e}")).into()
    })
}

fn cmd_classify(query: &str, run: &RunArgs, format: OutputFormat) -> Result<String> {
    let query = Query::new(query);
    if query.is_empty() {
        return Err(CommandError::InvalidArgument("query cannot be empty".to_string()).into());
    }
    let profile = classify(&query);
    let overrides = StrategyOverrides {
        max_rounds: run.max_rounds,
        results_per_round: run.results_per_round,
        quality_threshold: run.quality_threshold,
        sufficiency_threshold: run.sufficiency_threshold,
        diversity_threshold: run.diversity_threshold,
    };
    let strategy = select_strategy(profile.tier, &overrides);
    Ok(format_profile(&profile, &strategy, format))
}

fn cmd_ask(
    query: &str,
    stream: bool,
    show_rounds: bool,
    run: &RunArgs,
    format: OutputFormat,
) -> Result<String> {
    let engine = engine(run)?;
    let rt = runtime()?;
    let stream = stream && !format.is_json();

    let process = rt.block_on(async {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("interrupt received, stopping after the current round");
                on_interrupt.cancel();
            }
        });

        let (answer_stream, printer) = if stream {
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
            let printer = tokio::spawn(async move {
                let mut stdout = io::stdout();
                while let Some(chunk) = rx.recv().await {
                    let _ = stdout.write_all(chunk.as_bytes());
                    let _ = stdout.flush();
                }
            });
            (Some(tx), Some(printer))
        } else {
            (None, None)
        };

        let result = engine
            .run_query_with(
                query,
                RunOptions {
                    cancel: Some(cancel),
                    answer_stream,
                },
            )
            .await;
        if let Some(printer) = printer {
            let _ = printer.await;
        }
        result
    });

    let process =
        process.map_err(|e| CommandError::ExecutionFailed(format!("Query failed: {e}")))?;
    let report = insights(&process);
    Ok(format_process(&process, &report, show_rounds, !stream, format))
}

fn cmd_repl(run: &RunArgs, format: OutputFormat) -> Result<String> {
    let engine = engine(run)?;
    let rt = runtime()?;
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    repl_loop(&engine, &rt, stdin.lock(), &mut stdout, format)?;
    Ok(String::new())
}

/// What the REPL should do with one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplAction {
    Skip,
    Quit,
    Help,
    History,
    Stats,
    Insights,
    Clear,
    Unknown(String),
    Query(String),
}

fn parse_repl_line(line: &str) -> ReplAction {
    let line = line.trim();
    if line.is_empty() {
        return ReplAction::Skip;
    }
    match line {
        "/quit" | "/exit" | "/q" => ReplAction::Quit,
        "/help" | "/?" => ReplAction::Help,
        "/history" => ReplAction::History,
        "/stats" => ReplAction::Stats,
        "/insights" => ReplAction::Insights,
        "/clear" => ReplAction::Clear,
        other if other.starts_with('/') => ReplAction::Unknown(other.to_string()),
        other => ReplAction::Query(other.to_string()),
    }
}

/// Runs the REPL over `input` until EOF or `/quit`.
fn repl_loop<R: BufRead, W: IoWrite>(
    engine: &DeepSearch,
    rt: &Runtime,
    input: R,
    out: &mut W,
    format: OutputFormat,
) -> Result<()> {
    if !format.is_json() {
        writeln!(
            out,
            "deepsearch {} - type /help for commands",
            env!("CARGO_PKG_VERSION")
        )?;
    }
    prompt(out, format)?;

    for line in input.lines() {
        let line = line?;
        let rendered = match parse_repl_line(&line) {
            ReplAction::Skip => String::new(),
            ReplAction::Quit => break,
            ReplAction::Help => REPL_HELP.to_string(),
            ReplAction::History => format_history(&engine.history().snapshot(), format),
            ReplAction::Stats => format_stats(&engine.history().stats(), format),
            ReplAction::Insights => engine.history().last().map_or_else(
                || "No queries yet.\n".to_string(),
                |p| format_insights(&insights(&p), format),
            ),
            ReplAction::Clear => {
                engine.clear_history();
                engine.clear_conversation();
                "History and conversation cleared.\n".to_string()
            }
            ReplAction::Unknown(cmd) => format!("Unknown command: {cmd} (try /help)\n"),
            ReplAction::Query(query) => match rt.block_on(engine.run_query(&query)) {
                Ok(process) => format_process(&process, &insights(&process), false, true, format),
                Err(e) => format!("Query failed: {e}\n"),
            },
        };
        out.write_all(rendered.as_bytes())?;
        if format.is_json() && !rendered.is_empty() && !rendered.ends_with('\n') {
            writeln!(out)?;
        }
        prompt(out, format)?;
    }
    if !format.is_json() {
        writeln!(out)?;
    }
    Ok(())
}

fn prompt<W: IoWrite>(out: &mut W, format: OutputFormat) -> io::Result<()> {
    if !format.is_json() {
        write!(out, "> ")?;
    }
    out.flush()
}

fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(PathBuf::from)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed(
                "Could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write prompt templates: {e}"))
    })?;

    if format.is_json() {
        let json = serde_json::json!({
            "directory": target_dir.to_string_lossy(),
            "written": written.iter().map(|p| p.to_string_lossy().into_owned()).collect::<Vec<_>>(),
            "count": written.len()
        });
        return Ok(format.to_json(&json));
    }

    if written.is_empty() {
        return Ok(format!(
            "All prompt templates already exist in: {}\n",
            target_dir.display()
        ));
    }
    let mut output = format!(
        "Wrote {} prompt template(s) to: {}\n",
        written.len(),
        target_dir.display()
    );
    for path in &written {
        let _ = writeln!(
            output,
            "  {}",
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown")
        );
    }
    output.push_str("\nEdit these files to customize the reasoning and answer prompts.\n");
    Ok(output)
}
