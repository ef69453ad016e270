//! Error types for deepsearch-rs.
//!
//! [`AgentError`] covers everything that can go wrong while talking to the
//! external search and language-model collaborators or assembling a run.
//! [`CommandError`] covers the CLI layer. [`Error`] unifies both for callers
//! that do not care which layer failed.

use std::time::Duration;

use thiserror::Error;

/// Result alias using the crate-wide [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the retrieval loop and its collaborators.
///
/// Most of these never escape a query: per-call failures are absorbed by the
/// round executor and recorded as zero-yield contributions. Only
/// configuration problems and invalid input reach the caller.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A required credential was not configured.
    #[error("missing API key for {credential}")]
    ApiKeyMissing {
        /// Which credential is missing (`"search"` or `"llm"`).
        credential: &'static str,
    },

    /// The configured provider name is not known.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Provider name as configured.
        name: String,
    },

    /// An external call did not answer within its timeout.
    #[error("{provider} timed out after {}s", timeout.as_secs_f64())]
    ProviderTimeout {
        /// Provider that timed out.
        provider: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// An external call failed for a reason other than a timeout.
    #[error("{provider} request failed: {message}")]
    ProviderError {
        /// Provider that failed.
        provider: String,
        /// Error message.
        message: String,
        /// HTTP status, when the failure came from an HTTP response.
        status: Option<u16>,
    },

    /// The search provider answered but returned nothing usable.
    #[error("no results for query: {query}")]
    EmptyResultSet {
        /// Query that produced no results.
        query: String,
    },

    /// A model response could not be parsed into the expected shape.
    #[error("failed to parse response: {message}")]
    ResponseParse {
        /// Parse error description.
        message: String,
        /// Raw content that failed to parse.
        content: String,
    },

    /// A streaming response broke off.
    #[error("stream error: {message}")]
    Stream {
        /// Stream error description.
        message: String,
    },

    /// Every search call issued in a round failed.
    #[error("round {round} failed: all {} search calls failed", failures.len())]
    RoundFailed {
        /// Index of the failed round.
        round: usize,
        /// One message per failed call.
        failures: Vec<String>,
    },

    /// The run could not be assembled (empty query, bad input, ...).
    #[error("orchestration error: {message}")]
    Orchestration {
        /// Error description.
        message: String,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error description.
        message: String,
    },
}

impl AgentError {
    /// Returns `true` for failures caused by an external collaborator
    /// (timeouts, transport errors, empty answers).
    #[must_use]
    pub const fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            Self::ProviderTimeout { .. } | Self::ProviderError { .. } | Self::EmptyResultSet { .. }
        )
    }
}

/// Errors raised by CLI command handling.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command could not complete.
    #[error("{0}")]
    ExecutionFailed(String),

    /// A CLI argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Output could not be rendered.
    #[error("output error: {0}")]
    OutputFormat(String),
}

/// Crate-wide error.
#[derive(Debug, Error)]
pub enum Error {
    /// Retrieval loop or collaborator error.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// CLI command error.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
