pub mod dedup;
pub mod fallback;
pub mod html;
pub mod http;
pub mod meta_search;
pub mod providers;
pub mod proxy;
pub mod rate_limiter;

pub use dedup::{dedup_key, dedupe};
pub use fallback::{AttemptStatus, ChainAdapter, ChainOutcome, FallbackChain, StrategyAttempt};
pub use http::HttpSession;
pub use meta_search::{SearchEngine, SearchResult, SourceOutcome, SourceReport};
pub use proxy::{ProxyRouter, ProxySession, ProxyTier, ResolvedProxy};
pub use rate_limiter::{PolitenessProfile, PolitenessThrottle};

use crate::config::SearchConfig;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// HTTP client configuration shared by every source session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Maximum redirects to follow
    pub max_redirects: usize,
    /// Rotate browser user agents instead of sending `user_agent`
    pub rotate_user_agents: bool,
    /// User agent string used when rotation is off
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            max_redirects: 10,
            rotate_user_agents: true,
            user_agent: "research-harvest/0.1.0 (Academic Research Tool)".to_string(),
        }
    }
}

impl HttpClientConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Identifier of an external paper source, in canonical priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    /// arXiv preprint API
    Arxiv,
    /// Google Scholar (scraped)
    Scholar,
    /// IEEE Xplore (publisher A)
    Ieee,
    /// ACM Digital Library (publisher B)
    Acm,
}

impl SourceId {
    /// All sources, highest priority first
    pub const PRIORITY: [Self; 4] = [Self::Arxiv, Self::Scholar, Self::Ieee, Self::Acm];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Arxiv => "arxiv",
            Self::Scholar => "scholar",
            Self::Ieee => "ieee",
            Self::Acm => "acm",
        }
    }

    /// Site key used for per-site proxy and throttle lookups
    #[must_use]
    pub const fn site(self) -> &'static str {
        self.as_str()
    }

    /// Position in the canonical priority order (0 = highest)
    #[must_use]
    pub const fn rank(self) -> usize {
        match self {
            Self::Arxiv => 0,
            Self::Scholar => 1,
            Self::Ieee => 2,
            Self::Acm => 3,
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "arxiv" | "preprint" | "arxiv.org" => Ok(Self::Arxiv),
            "scholar" | "scraped-scholar" | "scholar.google.com" | "google-scholar" => {
                Ok(Self::Scholar)
            }
            "ieee" | "publisher-a" | "ieee.org" | "ieeexplore.ieee.org" => Ok(Self::Ieee),
            "acm" | "publisher-b" | "acm.org" | "dl.acm.org" => Ok(Self::Acm),
            other => Err(crate::Error::InvalidInput {
                field: "source".to_string(),
                reason: format!("unknown source '{other}'"),
            }),
        }
    }
}

/// Paper metadata produced by a source adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    /// Paper title (dedup key, must be non-empty to be kept)
    pub title: String,
    /// Authors in the order the source listed them
    pub authors: Vec<String>,
    /// Publication year
    pub year: Option<u32>,
    /// Abstract or snippet, possibly empty
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Landing page or PDF link
    pub url: String,
    /// Source that produced this record
    pub source: SourceId,
    /// Source-specific identifier (entry id, DOI, article number, hash)
    pub external_id: String,
}

impl Paper {
    /// Create a paper with only a title; the remaining fields are best-effort
    #[must_use]
    pub fn new(title: impl Into<String>, source: SourceId) -> Self {
        Self {
            title: title.into(),
            authors: Vec::new(),
            year: None,
            abstract_text: String::new(),
            url: String::new(),
            source,
            external_id: String::new(),
        }
    }

    /// A paper is structurally valid once it carries a non-blank title
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty()
    }
}

/// Immutable input to one search invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub topic: String,
    pub sources: Vec<SourceId>,
    pub max_results: usize,
    pub timeout_budget: Duration,
}

impl Query {
    /// Default result cap
    pub const DEFAULT_MAX_RESULTS: usize = 100;
    /// Default wall-clock budget
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

    /// Create a query against every source with default limits
    pub fn new(topic: &str) -> Result<Self> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(crate::Error::InvalidInput {
                field: "topic".to_string(),
                reason: "topic cannot be empty".to_string(),
            });
        }

        Ok(Self {
            topic: topic.to_string(),
            sources: SourceId::PRIORITY.to_vec(),
            max_results: Self::DEFAULT_MAX_RESULTS,
            timeout_budget: Self::DEFAULT_TIMEOUT,
        })
    }

    /// Create a query using the configured defaults
    pub fn from_config(topic: &str, config: &SearchConfig) -> Result<Self> {
        Ok(Self::new(topic)?
            .with_max_results(config.max_results)
            .with_timeout(Duration::from_secs(config.timeout_secs)))
    }

    /// Restrict the query to the given sources; repeated entries are dropped
    #[must_use]
    pub fn with_sources(mut self, sources: impl IntoIterator<Item = SourceId>) -> Self {
        let mut unique: Vec<SourceId> = Vec::new();
        for source in sources {
            if !unique.contains(&source) {
                unique.push(source);
            }
        }
        self.sources = unique;
        self
    }

    #[must_use]
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout_budget: Duration) -> Self {
        self.timeout_budget = timeout_budget;
        self
    }

    /// Requested sources in canonical priority order
    #[must_use]
    pub fn sources_by_priority(&self) -> Vec<SourceId> {
        SourceId::PRIORITY
            .into_iter()
            .filter(|source| self.sources.contains(source))
            .collect()
    }
}

/// Papers held by the strategy currently running for one source.
///
/// The aggregator keeps a clone of this handle so that a source cancelled by
/// the overall timeout still contributes whatever it had collected.
#[derive(Debug, Clone, Default)]
pub struct PartialResults {
    inner: Arc<Mutex<Vec<Paper>>>,
}

impl PartialResults {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, paper: Paper) {
        self.lock().push(paper);
    }

    pub fn replace(&self, papers: Vec<Paper>) {
        *self.lock() = papers;
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<Paper> {
        self.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Paper>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
