//! Top-level research engine.
//!
//! [`DeepSearch`] wires the pipeline together for one session:
//! classify → select strategy → run the reflection loop → answer. Every
//! finished query is appended to the session history, and its question and
//! answer are kept as conversation memory for later answer calls.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::message::{ChatMessage, Exchange};
use crate::agent::prompt::{PromptSet, SourceContext};
use crate::agent::provider::LlmProvider;
use crate::agent::reasoner::GapAnalyst;
use crate::agent::synthesizer::{AnswerAgent, degraded_answer, forward};
use crate::config::Config;
use crate::core::Query;
use crate::error::AgentError;
use crate::search::classifier::Classifier;
use crate::search::controller::{Advisor, ReflectionController};
use crate::search::executor::RoundExecutor;
use crate::search::knowledge::KnowledgeItem;
use crate::search::process::{SearchProcess, SessionHistory};
use crate::search::provider::WebSearch;
use crate::search::strategy::select_strategy;

pub use crate::search::insight::insights;

/// Active items handed to the answer call.
const ANSWER_SOURCES: usize = 10;

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stops the loop between rounds once cancelled.
    pub cancel: Option<CancellationToken>,
    /// Receives answer chunks as they are generated.
    pub answer_stream: Option<UnboundedSender<String>>,
}

/// A research session.
pub struct DeepSearch {
    config: Config,
    executor: RoundExecutor,
    llm: Option<Arc<dyn LlmProvider>>,
    classifier: Classifier,
    analyst: GapAnalyst,
    answerer: AnswerAgent,
    history: SessionHistory,
    conversation: Mutex<VecDeque<Exchange>>,
}

impl DeepSearch {
    /// Creates a session over the given backends.
    ///
    /// With `llm` set to `None` the loop runs on its deterministic rules
    /// and every answer is extractive.
    #[must_use]
    pub fn new(
        config: Config,
        search: Arc<dyn WebSearch>,
        llm: Option<Arc<dyn LlmProvider>>,
    ) -> Self {
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        let executor = RoundExecutor::new(search, config.search_timeout)
            .with_max_concurrency(config.max_concurrency)
            .with_max_search_results(config.max_search_results)
            .with_request_delay(config.request_delay);
        Self {
            analyst: GapAnalyst::new(&config, prompts.reasoning),
            answerer: AnswerAgent::new(&config, prompts.answer),
            executor,
            llm,
            classifier: Classifier::default(),
            history: SessionHistory::new(),
            conversation: Mutex::new(VecDeque::new()),
            config,
        }
    }

    /// Creates a session with the backends named by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] if a backend cannot be built or is not
    /// compiled in.
    pub fn from_config(config: Config) -> Result<Self, AgentError> {
        let search = search_backend(&config)?;
        let llm = crate::agent::client::create_provider(&config)?;
        Ok(Self::new(config, search, llm))
    }

    /// Replaces the classifier.
    #[must_use]
    pub const fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Whether a language model is attached.
    #[must_use]
    pub fn llm_enabled(&self) -> bool {
        self.llm.is_some()
    }

    /// Runs one query with default options.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Orchestration`] for an empty query. Provider
    /// failures never surface here; they degrade the process instead.
    pub async fn run_query(&self, text: &str) -> Result<Arc<SearchProcess>, AgentError> {
        self.run_query_with(text, RunOptions::default()).await
    }

    /// Runs one query.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Orchestration`] for an empty query.
    pub async fn run_query_with(
        &self,
        text: &str,
        options: RunOptions,
    ) -> Result<Arc<SearchProcess>, AgentError> {
        let query = Query::new(text);
        if query.is_empty() {
            return Err(AgentError::Orchestration {
                message: "Query cannot be empty".to_string(),
            });
        }

        let start = Instant::now();
        let started_at = Utc::now();

        let profile = self.classifier.classify(&query);
        let strategy = select_strategy(profile.tier, &self.config.strategy);
        info!(
            tier = %profile.tier,
            strategy = %strategy.name,
            max_rounds = strategy.max_rounds,
            "starting research"
        );

        let mut controller = ReflectionController::new(
            &query,
            &profile,
            strategy,
            &self.executor,
            self.config.knowledge(strategy.quality_threshold),
            started_at,
        );
        if let Some(llm) = &self.llm {
            controller = controller.with_advisor(Advisor {
                provider: llm.as_ref(),
                analyst: &self.analyst,
            });
        }
        let cancel = options.cancel.unwrap_or_else(CancellationToken::new);
        let outcome = controller.run(&cancel).await;
        let mut llm_calls = outcome.llm_calls;

        let sources: Vec<SourceContext<'_>> = outcome
            .knowledge
            .top_active(ANSWER_SOURCES)
            .into_iter()
            .map(source_context)
            .collect();
        let (final_answer, answer_degraded) = match &self.llm {
            Some(llm) => {
                llm_calls += 1;
                let history = self.conversation_messages();
                match self
                    .answerer
                    .answer(
                        llm.as_ref(),
                        &history,
                        query.text(),
                        &sources,
                        options.answer_stream.as_ref(),
                    )
                    .await
                {
                    Ok(generated) => (generated.content, false),
                    Err(error) => {
                        warn!(%error, "answer generation failed, using extractive answer");
                        (degraded_answer(query.text(), &sources, outcome.rounds.len()), true)
                    }
                }
            }
            None => (degraded_answer(query.text(), &sources, outcome.rounds.len()), true),
        };
        if answer_degraded && let Some(tx) = &options.answer_stream {
            forward(tx, final_answer.clone());
        }

        self.remember(Exchange {
            question: query.text().to_string(),
            answer: final_answer.clone(),
        });

        let process = SearchProcess {
            query,
            profile,
            strategy,
            rounds: outcome.rounds,
            knowledge_base: outcome.knowledge.into_items(),
            final_answer,
            answer_degraded,
            stop_reason: outcome.stop_reason,
            llm_calls,
            started_at,
            elapsed: start.elapsed(),
        };
        info!(
            rounds = process.rounds.len(),
            stop_reason = %process.stop_reason,
            active = process.active_knowledge().count(),
            degraded = process.answer_degraded,
            elapsed_secs = process.elapsed.as_secs_f64(),
            "research finished"
        );
        Ok(self.history.push(process))
    }

    /// Finished processes of this session.
    #[must_use]
    pub const fn history(&self) -> &SessionHistory {
        &self.history
    }

    /// Forgets every finished process. Conversation memory is kept.
    pub fn clear_history(&self) {
        self.history.clear();
    }

    /// Forgets conversation memory. Search history is kept.
    pub fn clear_conversation(&self) {
        self.conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of remembered exchanges.
    #[must_use]
    pub fn conversation_len(&self) -> usize {
        self.conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn remember(&self, exchange: Exchange) {
        let cap = self.config.max_conversation_history;
        let mut conversation = self
            .conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        conversation.push_back(exchange);
        while conversation.len() > cap {
            conversation.pop_front();
        }
    }

    fn conversation_messages(&self) -> Vec<ChatMessage> {
        self.conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .flat_map(Exchange::to_messages)
            .collect()
    }
}

impl std::fmt::Debug for DeepSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeepSearch")
            .field("executor", &self.executor)
            .field("llm", &self.llm.as_ref().map(|l| l.name()))
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

fn source_context(item: &KnowledgeItem) -> SourceContext<'_> {
    SourceContext {
        title: &item.title,
        url: &item.url,
        score: item.composite_score,
        content: &item.content,
    }
}

#[cfg(feature = "tavily")]
fn search_backend(config: &Config) -> Result<Arc<dyn WebSearch>, AgentError> {
    Ok(Arc::new(crate::search::providers::TavilySearch::new(
        config.search_api_key.clone(),
        config.search_timeout,
    )?))
}

#[cfg(not(feature = "tavily"))]
fn search_backend(_config: &Config) -> Result<Arc<dyn WebSearch>, AgentError> {
    Err(AgentError::UnsupportedProvider {
        name: "tavily".to_string(),
    })
}
