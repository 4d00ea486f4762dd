use crate::client::fallback::ChainOutcome;
use crate::client::{HttpSession, Paper, PartialResults, SourceId};
use crate::error::ErrorCategory;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Group of strategies that hit the same upstream endpoint.
///
/// Once the throttle gives up on a family, every remaining strategy of that
/// family in the chain is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointFamily {
    ArxivApi,
    ScholarWeb,
    IeeeWeb,
    AcmWeb,
    WebSearch,
    Offline,
}

impl EndpointFamily {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ArxivApi => "arxiv-api",
            Self::ScholarWeb => "scholar-web",
            Self::IeeeWeb => "ieee-web",
            Self::AcmWeb => "acm-web",
            Self::WebSearch => "web-search",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for EndpointFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur inside a single retrieval strategy
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Transport error: {message}")]
    Transport { message: String, proxy_failure: bool },

    #[error("Request timed out")]
    Timeout,

    #[error("Unexpected HTTP status {status}")]
    Status { status: u16 },

    #[error("Rate limited by upstream (HTTP {status})")]
    RateLimited { status: u16 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Strategy unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    /// Map a non-success HTTP status
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            403 | 429 => Self::RateLimited { status },
            _ => Self::Status { status },
        }
    }

    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport { .. } | Self::Timeout => ErrorCategory::Transient,
            Self::Status { status } if *status >= 500 => ErrorCategory::Transient,
            Self::Status { .. } | Self::Parse(_) => ErrorCategory::Permanent,
            Self::RateLimited { .. } => ErrorCategory::RateLimited,
            Self::Unavailable(_) => ErrorCategory::Unavailable,
        }
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Transient)
    }

    /// Whether the failure should make the session switch to a backup proxy
    #[must_use]
    pub const fn is_proxy_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                proxy_failure: true,
                ..
            }
        )
    }
}

/// Everything a strategy may touch while it runs
pub struct StrategyContext {
    /// Normalised search topic
    pub topic: String,
    /// Maximum number of papers this source should return
    pub limit: usize,
    /// Transport shared by every strategy of the chain
    pub session: HttpSession,
    /// Buffer for papers accepted so far by the running strategy
    pub sink: PartialResults,
}

impl StrategyContext {
    #[must_use]
    pub fn new(topic: &str, limit: usize, session: HttpSession, sink: PartialResults) -> Self {
        Self {
            topic: topic.to_string(),
            limit,
            session,
            sink,
        }
    }
}

/// One way of fetching papers from a source
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Name used in logs and in the chain outcome
    fn name(&self) -> &'static str;

    /// Endpoint family this strategy talks to
    fn family(&self) -> EndpointFamily;

    /// Fetch papers; an empty list is a valid outcome
    async fn run(&self, ctx: &mut StrategyContext) -> Result<Vec<Paper>, SourceError>;
}

/// A source of papers as seen by the search engine
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> SourceId;

    /// Retrieve up to `limit` papers for `topic`.
    ///
    /// Never fails: errors are logged and turn into an empty or partial list.
    /// Papers accepted so far are mirrored into `sink` so that the caller can
    /// recover them if this future is cancelled.
    async fn retrieve(&self, topic: &str, limit: usize, sink: PartialResults) -> Vec<Paper>;

    /// Like [`retrieve`](Self::retrieve), also reporting which strategies ran
    async fn retrieve_detailed(
        &self,
        topic: &str,
        limit: usize,
        sink: PartialResults,
    ) -> ChainOutcome {
        ChainOutcome::from_papers(self.retrieve(topic, limit, sink).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            SourceError::from_status(429),
            SourceError::RateLimited { status: 429 }
        );
        assert_eq!(
            SourceError::from_status(403),
            SourceError::RateLimited { status: 403 }
        );
        assert_eq!(
            SourceError::from_status(502),
            SourceError::Status { status: 502 }
        );
    }

    #[test]
    fn test_categories() {
        assert!(SourceError::from_status(502).is_retryable());
        assert!(!SourceError::from_status(404).is_retryable());
        assert_eq!(
            SourceError::Unavailable("no key".to_string()).category(),
            ErrorCategory::Unavailable
        );

        let proxy = SourceError::Transport {
            message: "connect refused".to_string(),
            proxy_failure: true,
        };
        assert!(proxy.is_proxy_failure());
        assert!(proxy.is_retryable());
        assert!(!SourceError::Timeout.is_proxy_failure());
    }

    #[test]
    fn test_family_names() {
        assert_eq!(EndpointFamily::WebSearch.to_string(), "web-search");
        assert_eq!(EndpointFamily::ArxivApi.as_str(), "arxiv-api");
    }
}
