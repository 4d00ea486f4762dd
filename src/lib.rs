//! Multi-source scholarly paper retrieval.
//!
//! A [`Query`] fans out to arXiv, Google Scholar, IEEE Xplore and the ACM
//! Digital Library. Each source walks its own fallback chain of strategies,
//! and the [`SearchEngine`] merges what comes back into one deduplicated,
//! capped list of [`Paper`]s.

pub mod client;
pub mod config;
pub mod error;
pub mod resilience;

pub use client::providers::{SourceAdapter, SourceError, Strategy, StrategyContext};
pub use client::{
    dedupe, ChainOutcome, Paper, PartialResults, Query, SearchEngine, SearchResult, SourceId,
    SourceOutcome, SourceReport,
};
pub use config::Config;
pub use error::{Error, ErrorCategory, Result};
pub use resilience::RetryConfig;
