//! # Configuration
//!
//! Layered configuration for the retrieval engine. Values are resolved in this
//! order, later layers overriding earlier ones:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. An optional TOML file
//! 3. `RESEARCH_HARVEST__SECTION__KEY` environment variables
//! 4. The flat legacy variables (`USE_PROXY`, `HTTP_PROXY`, `SCHOLAR_PROXY`,
//!    `SERPER_API_KEY`, `MAX_PAPERS`, ...)
//!
//! The resulting [`Config`] is read-only for the lifetime of a search.

use crate::client::rate_limiter::PolitenessProfile;
use crate::client::{HttpClientConfig, Paper, SourceId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const ENV_PREFIX: &str = "RESEARCH_HARVEST";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: SearchConfig,
    pub proxy: ProxyConfig,
    pub throttle: ThrottleConfig,
    pub limits: LimitsConfig,
    pub endpoints: EndpointsConfig,
    pub http: HttpClientConfig,
    pub web_search: WebSearchConfig,
    pub seed: Vec<SeedEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            proxy: ProxyConfig::default(),
            throttle: ThrottleConfig::default(),
            limits: LimitsConfig::default(),
            endpoints: EndpointsConfig::default(),
            http: HttpClientConfig::default(),
            web_search: WebSearchConfig::default(),
            seed: vec![SeedEntry::np_completeness()],
        }
    }
}

/// Search-wide defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Default result cap for a query
    pub max_results: usize,
    /// Default wall-clock budget for a query, in seconds
    pub timeout_secs: u64,
    /// Attempts per request, and consecutive errors before an endpoint family is abandoned
    pub max_retries: u32,
    /// Number of source chains allowed to run at the same time
    pub max_parallel_sources: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 100,
            timeout_secs: 600,
            max_retries: 3,
            max_parallel_sources: 4,
        }
    }
}

/// General (non site-specific) proxy URIs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralProxy {
    pub http: Option<String>,
    pub https: Option<String>,
    pub socks: Option<String>,
}

impl GeneralProxy {
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.http.is_some() || self.https.is_some() || self.socks.is_some()
    }

    fn uris(&self) -> impl Iterator<Item = &String> {
        self.http.iter().chain(self.https.iter()).chain(self.socks.iter())
    }
}

/// Backup proxies used after a proxy failure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupProxyConfig {
    /// Site key -> backup proxy URI
    pub per_site: HashMap<String, String>,
    pub general: GeneralProxy,
}

/// Proxy routing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Global switch; when off no request is proxied
    pub enabled: bool,
    /// Site key (`arxiv`, `scholar`, `ieee`, `acm`) -> proxy URI
    pub per_site: HashMap<String, String>,
    pub general: GeneralProxy,
    /// Swap to the backup tier after a proxy failure
    pub backup_enabled: bool,
    pub backup: BackupProxyConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            per_site: HashMap::new(),
            general: GeneralProxy::default(),
            backup_enabled: true,
            backup: BackupProxyConfig::default(),
        }
    }
}

/// Politeness profiles per source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub arxiv: PolitenessProfile,
    pub scholar: PolitenessProfile,
    pub ieee: PolitenessProfile,
    pub acm: PolitenessProfile,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            arxiv: PolitenessProfile::official_api(),
            scholar: PolitenessProfile::scraped_search(),
            ieee: PolitenessProfile::publisher_site(),
            acm: PolitenessProfile::publisher_site(),
        }
    }
}

impl ThrottleConfig {
    #[must_use]
    pub const fn profile(&self, source: SourceId) -> &PolitenessProfile {
        match source {
            SourceId::Arxiv => &self.arxiv,
            SourceId::Scholar => &self.scholar,
            SourceId::Ieee => &self.ieee,
            SourceId::Acm => &self.acm,
        }
    }

    /// Profile with every delay set to zero, for tests and local mirrors
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            arxiv: PolitenessProfile::none(),
            scholar: PolitenessProfile::none(),
            ieee: PolitenessProfile::none(),
            acm: PolitenessProfile::none(),
        }
    }
}

/// How many results each source is asked for
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Share of `max_results` requested from the preprint API
    pub arxiv_share: f64,
    /// Share of `max_results` iterated from Scholar
    pub scholar_share: f64,
    /// Hard cap on Scholar publications per search
    pub scholar_cap: usize,
    /// Rows per IEEE REST request
    pub ieee_rows: usize,
    /// Page size of the ACM HTML listing
    pub acm_page_size: usize,
    /// Page size of the ACM JSON endpoint
    pub acm_json_page_size: usize,
    /// Hits requested from the web-search tier
    pub web_search_hits: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            arxiv_share: 0.3,
            scholar_share: 0.2,
            scholar_cap: 20,
            ieee_rows: 25,
            acm_page_size: 50,
            acm_json_page_size: 25,
            web_search_hits: 10,
        }
    }
}

impl LimitsConfig {
    /// Number of papers a source is asked for when the query allows `max_results`
    #[must_use]
    pub fn for_source(&self, source: SourceId, max_results: usize) -> usize {
        if max_results == 0 {
            return 0;
        }
        match source {
            SourceId::Arxiv => share_of(max_results, self.arxiv_share),
            SourceId::Scholar => share_of(max_results, self.scholar_share).min(self.scholar_cap),
            SourceId::Ieee => max_results.min(self.ieee_rows),
            SourceId::Acm => max_results.min(self.acm_page_size),
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn share_of(max_results: usize, share: f64) -> usize {
    ((max_results as f64 * share).ceil() as usize).max(1)
}

/// Base URLs of every external endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub arxiv: String,
    pub scholar: String,
    pub ieee: String,
    pub acm: String,
    pub web_search: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            arxiv: "http://export.arxiv.org/api/query".to_string(),
            scholar: "https://scholar.google.com/scholar".to_string(),
            ieee: "https://ieeexplore.ieee.org".to_string(),
            acm: "https://dl.acm.org".to_string(),
            web_search: "https://google.serper.dev/search".to_string(),
        }
    }
}

/// Third-party web-search tier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchConfig {
    /// API key; when absent the tier is silently unavailable
    pub api_key: Option<String>,
}

/// Seed papers returned for known demo topics when every other tier failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedEntry {
    /// Topics (matched case-insensitively after trimming)
    pub topics: Vec<String>,
    pub papers: Vec<SeedPaper>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedPaper {
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub id: String,
}

impl SeedPaper {
    #[must_use]
    pub fn to_paper(&self, source: SourceId) -> Paper {
        Paper {
            title: self.title.clone(),
            authors: self.authors.clone(),
            year: self.year,
            abstract_text: self.abstract_text.clone(),
            url: self.url.clone(),
            source,
            external_id: self.id.clone(),
        }
    }
}

impl SeedEntry {
    /// Built-in demo entry for NP-completeness
    #[must_use]
    pub fn np_completeness() -> Self {
        Self {
            topics: vec![
                "np完全问题".to_string(),
                "np-complete".to_string(),
                "np completeness".to_string(),
            ],
            papers: vec![
                SeedPaper {
                    title: "The complexity of theorem-proving procedures".to_string(),
                    authors: vec!["Stephen A. Cook".to_string()],
                    year: Some(1971),
                    abstract_text: "It is shown that any recognition problem solved by a polynomial \
                        time-bounded nondeterministic Turing machine can be 'reduced' to the problem \
                        of determining whether a given propositional formula is a tautology."
                        .to_string(),
                    url: "https://dl.acm.org/doi/10.1145/800157.805047".to_string(),
                    id: "10.1145/800157.805047".to_string(),
                },
                SeedPaper {
                    title: "Computers and Intractability: A Guide to the Theory of NP-Completeness"
                        .to_string(),
                    authors: vec!["Michael R. Garey".to_string(), "David S. Johnson".to_string()],
                    year: Some(1979),
                    abstract_text: "This book has become the standard reference for anyone working \
                        with NP-complete problems."
                        .to_string(),
                    url: "https://dl.acm.org/doi/book/10.5555/574848".to_string(),
                    id: "10.5555/574848".to_string(),
                },
            ],
        }
    }

    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        let topic = topic.trim().to_lowercase();
        self.topics.iter().any(|t| t.trim().to_lowercase() == topic)
    }
}

/// Flat environment variables understood for compatibility with existing deployments
#[derive(Debug, Default, Deserialize)]
pub struct LegacyEnv {
    pub use_proxy: Option<String>,
    pub use_backup_proxy: Option<String>,
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub socks_proxy: Option<String>,
    pub scholar_proxy: Option<String>,
    pub arxiv_proxy: Option<String>,
    pub ieee_proxy: Option<String>,
    pub acm_proxy: Option<String>,
    pub backup_http_proxy: Option<String>,
    pub backup_https_proxy: Option<String>,
    pub backup_socks_proxy: Option<String>,
    pub serper_api_key: Option<String>,
    pub max_papers: Option<usize>,
    pub search_timeout: Option<u64>,
    pub max_retries: Option<u32>,
}

impl LegacyEnv {
    /// Read the flat variables from `vars`.
    ///
    /// Only upper-case names are considered. `envy` folds names to lower
    /// case, so `HTTP_PROXY` and `http_proxy` would otherwise collide.
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        let upper = vars
            .into_iter()
            .filter(|(key, _)| !key.chars().any(|c| c.is_ascii_lowercase()));
        Ok(envy::from_iter(upper)?)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

impl Config {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = Self::from_layers(path.as_deref(), true)?;

        let vars = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
        let legacy = LegacyEnv::from_vars(vars)?;
        config.apply_legacy_env(legacy);
        config.validate()?;

        info!(
            "Configuration loaded (proxy: {}, web search: {})",
            config.proxy.enabled,
            config.web_search.api_key.is_some()
        );
        Ok(config)
    }

    /// Load configuration from defaults and a file only
    pub fn from_file(path: &Path) -> Result<Self> {
        let config = Self::from_layers(Some(path), false)?;
        config.validate()?;
        Ok(config)
    }

    /// Default config file location
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("research-harvest").join("config.toml"))
    }

    fn from_layers(path: Option<&Path>, with_env: bool) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            debug!("Reading configuration file {}", path.display());
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }

        if with_env {
            builder = builder.add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Fold the flat legacy variables into this configuration
    pub fn apply_legacy_env(&mut self, env: LegacyEnv) {
        if let Some(flag) = env.use_proxy.as_deref() {
            self.proxy.enabled = parse_flag(flag);
        }
        if let Some(flag) = env.use_backup_proxy.as_deref() {
            self.proxy.backup_enabled = parse_flag(flag);
        }

        let general = &mut self.proxy.general;
        general.http = env.http_proxy.or(general.http.take());
        general.https = env.https_proxy.or(general.https.take());
        general.socks = env.socks_proxy.or(general.socks.take());

        for (site, uri) in [
            (SourceId::Scholar, env.scholar_proxy),
            (SourceId::Arxiv, env.arxiv_proxy),
            (SourceId::Ieee, env.ieee_proxy),
            (SourceId::Acm, env.acm_proxy),
        ] {
            if let Some(uri) = uri {
                self.proxy.per_site.insert(site.site().to_string(), uri);
            }
        }

        let backup = &mut self.proxy.backup.general;
        backup.http = env.backup_http_proxy.or(backup.http.take());
        backup.https = env.backup_https_proxy.or(backup.https.take());
        backup.socks = env.backup_socks_proxy.or(backup.socks.take());

        if env.serper_api_key.is_some() {
            self.web_search.api_key = env.serper_api_key;
        }
        if let Some(max_papers) = env.max_papers {
            self.search.max_results = max_papers;
        }
        if let Some(timeout) = env.search_timeout {
            self.search.timeout_secs = timeout;
        }
        if let Some(retries) = env.max_retries {
            self.search.max_retries = retries;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.search.timeout_secs == 0 {
            return Err(invalid("search.timeout_secs", "timeout must be at least one second"));
        }
        if self.search.max_retries == 0 {
            return Err(invalid("search.max_retries", "at least one attempt is required"));
        }
        if self.search.max_parallel_sources == 0 {
            return Err(invalid(
                "search.max_parallel_sources",
                "at least one source must be allowed to run",
            ));
        }

        for source in SourceId::PRIORITY {
            self.throttle
                .profile(source)
                .validate()
                .map_err(|reason| invalid(&format!("throttle.{source}"), &reason))?;
        }

        for (name, share) in [
            ("limits.arxiv_share", self.limits.arxiv_share),
            ("limits.scholar_share", self.limits.scholar_share),
        ] {
            if !(share > 0.0 && share <= 1.0) {
                return Err(invalid(name, "share must be in (0, 1]"));
            }
        }

        let proxy_uris = self
            .proxy
            .per_site
            .values()
            .chain(self.proxy.general.uris())
            .chain(self.proxy.backup.per_site.values())
            .chain(self.proxy.backup.general.uris());
        for uri in proxy_uris {
            url::Url::parse(uri)
                .map_err(|e| invalid("proxy", &format!("invalid proxy URI '{uri}': {e}")))?;
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> Error {
    Error::InvalidInput {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
