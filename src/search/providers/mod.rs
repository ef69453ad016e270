//! Search backend implementations.

#[cfg(feature = "tavily")]
pub mod tavily;

#[cfg(feature = "tavily")]
pub use tavily::TavilySearch;
