//! Language-model side of the retrieval loop.
//!
//! Provides the two model roles and a pluggable provider abstraction backed
//! by OpenAI-compatible APIs.
//!
//! # Architecture
//!
//! ```text
//! Reflection controller
//!   ├── GapAnalyst (after each round, advisory follow-up queries)
//!   └── AnswerAgent (once, final answer; streamed on request)
//!         └── degraded_answer() when the model is absent or fails
//! ```
//!
//! # Feature Gate
//!
//! The concrete `OpenAiProvider` requires the `openai` feature (on by
//! default). Without it, only the `"none"` provider is available and the loop
//! runs on its deterministic rules.

pub mod client;
pub mod message;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod reasoner;
pub mod synthesizer;
pub mod traits;

// Re-export key types
pub use client::create_provider;
pub use message::{ChatMessage, ChatRequest, ChatResponse, Exchange, Role, TokenUsage};
pub use prompt::PromptSet;
pub use provider::{LlmProvider, TextStream};
pub use reasoner::{GapAnalysis, GapAnalyst};
pub use synthesizer::{AnswerAgent, GeneratedAnswer, degraded_answer};
pub use traits::{Agent, AgentResponse};
