use crate::client::providers::SourceError;
use crate::config::{GeneralProxy, ProxyConfig};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a resolved proxy route came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyTier {
    PerSite,
    General,
    PerSiteBackup,
    GeneralBackup,
}

impl ProxyTier {
    #[must_use]
    pub const fn is_backup(self) -> bool {
        matches!(self, Self::PerSiteBackup | Self::GeneralBackup)
    }
}

impl fmt::Display for ProxyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PerSite => "per-site",
            Self::General => "general",
            Self::PerSiteBackup => "per-site backup",
            Self::GeneralBackup => "general backup",
        })
    }
}

/// A proxy route for one site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProxy {
    pub tier: ProxyTier,
    /// Proxy for `http://` targets
    pub http: Option<String>,
    /// Proxy for `https://` targets
    pub https: Option<String>,
    /// Proxy for every scheme
    pub all: Option<String>,
}

impl ResolvedProxy {
    fn single(tier: ProxyTier, uri: &str) -> Self {
        Self {
            tier,
            http: None,
            https: None,
            all: Some(uri.to_string()),
        }
    }

    fn from_general(tier: ProxyTier, general: &GeneralProxy) -> Option<Self> {
        if general.http.is_some() || general.https.is_some() {
            return Some(Self {
                tier,
                http: general.http.clone(),
                https: general.https.clone(),
                all: None,
            });
        }
        general.socks.as_deref().map(|uri| Self::single(tier, uri))
    }

    /// Convert into `reqwest` proxy settings for a client builder
    pub fn to_reqwest(&self) -> Result<Vec<reqwest::Proxy>, SourceError> {
        let invalid = |uri: &str, e: reqwest::Error| SourceError::Transport {
            message: format!("invalid proxy '{uri}': {e}"),
            proxy_failure: true,
        };

        let mut proxies = Vec::new();
        if let Some(uri) = &self.all {
            proxies.push(reqwest::Proxy::all(uri).map_err(|e| invalid(uri, e))?);
        }
        if let Some(uri) = &self.http {
            proxies.push(reqwest::Proxy::http(uri).map_err(|e| invalid(uri, e))?);
        }
        if let Some(uri) = &self.https {
            proxies.push(reqwest::Proxy::https(uri).map_err(|e| invalid(uri, e))?);
        }
        Ok(proxies)
    }
}

impl fmt::Display for ResolvedProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let uris: Vec<&str> = [&self.all, &self.http, &self.https]
            .into_iter()
            .filter_map(Option::as_deref)
            .collect();
        write!(f, "{} proxy {}", self.tier, uris.join(", "))
    }
}

/// Read-only routing policy shared by every source
#[derive(Debug, Clone, Default)]
pub struct ProxyRouter {
    config: ProxyConfig,
}

impl ProxyRouter {
    #[must_use]
    pub const fn new(config: ProxyConfig) -> Self {
        Self { config }
    }

    /// Primary route for `site`, or `None` for a direct connection
    #[must_use]
    pub fn resolve(&self, site: &str) -> Option<ResolvedProxy> {
        if !self.config.enabled {
            return None;
        }

        if let Some(uri) = self.config.per_site.get(site) {
            return Some(ResolvedProxy::single(ProxyTier::PerSite, uri));
        }

        ResolvedProxy::from_general(ProxyTier::General, &self.config.general)
    }

    /// Route to switch to after `failed` broke, if any
    #[must_use]
    pub fn backup_for(&self, site: &str, failed: &ResolvedProxy) -> Option<ResolvedProxy> {
        if !self.config.enabled || !self.config.backup_enabled {
            return None;
        }

        let backup = &self.config.backup;
        match failed.tier {
            ProxyTier::PerSite => backup
                .per_site
                .get(site)
                .map(|uri| ResolvedProxy::single(ProxyTier::PerSiteBackup, uri))
                .or_else(|| ResolvedProxy::from_general(ProxyTier::GeneralBackup, &backup.general)),
            ProxyTier::General => {
                ResolvedProxy::from_general(ProxyTier::GeneralBackup, &backup.general)
            }
            ProxyTier::PerSiteBackup | ProxyTier::GeneralBackup => None,
        }
    }

    /// Start a proxy session for one retrieval call
    #[must_use]
    pub fn session(self: &Arc<Self>, site: &'static str) -> ProxySession {
        let current = self.resolve(site);
        if let Some(route) = &current {
            debug!("Routing {} through {}", site, route);
        }

        ProxySession {
            router: Arc::clone(self),
            site,
            current,
        }
    }
}

/// Proxy state of one source for the duration of a chain execution
#[derive(Debug, Clone)]
pub struct ProxySession {
    router: Arc<ProxyRouter>,
    site: &'static str,
    current: Option<ResolvedProxy>,
}

impl ProxySession {
    #[must_use]
    pub const fn current(&self) -> Option<&ResolvedProxy> {
        self.current.as_ref()
    }

    #[must_use]
    pub const fn is_proxied(&self) -> bool {
        self.current.is_some()
    }

    /// React to a proxy failure. Returns `true` when a backup route was taken.
    pub fn on_proxy_failure(&mut self) -> bool {
        let Some(failed) = &self.current else {
            return false;
        };

        match self.router.backup_for(self.site, failed) {
            Some(backup) => {
                warn!(
                    "Proxy failure for {} on {}, switching to {}",
                    self.site, failed, backup
                );
                self.current = Some(backup);
                true
            }
            None => {
                debug!("No backup route for {} after {} failed", self.site, failed);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn proxy_config() -> ProxyConfig {
        ProxyConfig {
            enabled: true,
            per_site: HashMap::from([(
                "scholar".to_string(),
                "socks5://127.0.0.1:1080".to_string(),
            )]),
            general: GeneralProxy {
                http: Some("http://127.0.0.1:7890".to_string()),
                https: Some("http://127.0.0.1:7891".to_string()),
                socks: Some("socks5://127.0.0.1:7892".to_string()),
            },
            backup_enabled: true,
            ..ProxyConfig::default()
        }
    }

    #[test]
    fn test_disabled_routes_nothing() {
        let config = ProxyConfig {
            enabled: false,
            ..proxy_config()
        };
        assert!(ProxyRouter::new(config).resolve("scholar").is_none());
    }

    #[test]
    fn test_per_site_wins_over_general() {
        let router = ProxyRouter::new(proxy_config());

        let scholar = router.resolve("scholar").unwrap();
        assert_eq!(scholar.tier, ProxyTier::PerSite);
        assert_eq!(scholar.all.as_deref(), Some("socks5://127.0.0.1:1080"));

        let arxiv = router.resolve("arxiv").unwrap();
        assert_eq!(arxiv.tier, ProxyTier::General);
        assert_eq!(arxiv.http.as_deref(), Some("http://127.0.0.1:7890"));
        assert!(arxiv.all.is_none());
    }

    #[test]
    fn test_socks_only_general_proxy() {
        let mut config = proxy_config();
        config.general.http = None;
        config.general.https = None;
        let route = ProxyRouter::new(config).resolve("ieee").unwrap();

        assert_eq!(route.tier, ProxyTier::General);
        assert_eq!(route.all.as_deref(), Some("socks5://127.0.0.1:7892"));
        assert_eq!(route.to_reqwest().unwrap().len(), 1);
    }

    #[test]
    fn test_per_site_failure_falls_back_to_site_backup() {
        let mut config = proxy_config();
        config
            .backup
            .per_site
            .insert("scholar".to_string(), "http://10.0.0.2:3128".to_string());
        config.backup.general.http = Some("http://10.0.0.9:3128".to_string());

        let router = Arc::new(ProxyRouter::new(config));
        let mut session = router.session("scholar");
        assert!(session.on_proxy_failure());

        let current = session.current().unwrap();
        assert_eq!(current.tier, ProxyTier::PerSiteBackup);
        assert_eq!(current.all.as_deref(), Some("http://10.0.0.2:3128"));

        // A backup is never swapped again
        assert!(!session.on_proxy_failure());
        assert_eq!(session.current().unwrap().tier, ProxyTier::PerSiteBackup);
    }

    #[test]
    fn test_per_site_failure_without_site_backup_uses_general_backup() {
        let mut config = proxy_config();
        config.backup.general.https = Some("http://10.0.0.9:3128".to_string());

        let router = Arc::new(ProxyRouter::new(config));
        let mut session = router.session("scholar");
        assert!(session.on_proxy_failure());
        assert_eq!(session.current().unwrap().tier, ProxyTier::GeneralBackup);
    }

    #[test]
    fn test_backup_disabled_keeps_route() {
        let mut config = proxy_config();
        config.backup_enabled = false;
        config.backup.general.http = Some("http://10.0.0.9:3128".to_string());

        let router = Arc::new(ProxyRouter::new(config));
        let mut session = router.session("arxiv");
        assert!(!session.on_proxy_failure());
        assert_eq!(session.current().unwrap().tier, ProxyTier::General);
    }

    #[test]
    fn test_sessions_do_not_share_swaps() {
        let mut config = proxy_config();
        config.backup.general.http = Some("http://10.0.0.9:3128".to_string());
        let router = Arc::new(ProxyRouter::new(config));

        let mut first = router.session("acm");
        let second = router.session("acm");
        assert!(first.on_proxy_failure());

        assert_eq!(first.current().unwrap().tier, ProxyTier::GeneralBackup);
        assert_eq!(second.current().unwrap().tier, ProxyTier::General);
    }
}
