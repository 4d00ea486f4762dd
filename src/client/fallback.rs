use crate::client::http::HttpSession;
use crate::client::providers::{SourceAdapter, SourceError, Strategy, StrategyContext};
use crate::client::proxy::ProxyRouter;
use crate::client::rate_limiter::{PolitenessProfile, PolitenessThrottle};
use crate::client::{HttpClientConfig, Paper, PartialResults, SourceId};
use crate::resilience::RetryConfig;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What happened to one strategy of a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptStatus {
    Success { count: usize },
    Empty,
    Failed { reason: String },
    /// The strategy cannot run with the current configuration
    Unavailable { reason: String },
    /// Not run because its endpoint family was exhausted
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyAttempt {
    pub strategy: &'static str,
    pub status: AttemptStatus,
}

/// Result of running a chain to completion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChainOutcome {
    #[serde(skip)]
    pub papers: Vec<Paper>,
    pub attempts: Vec<StrategyAttempt>,
    /// Name of the strategy whose papers were returned
    pub winner: Option<&'static str>,
}

impl ChainOutcome {
    /// Outcome of an adapter that does not report its strategies
    #[must_use]
    pub fn from_papers(papers: Vec<Paper>) -> Self {
        Self {
            papers,
            attempts: Vec::new(),
            winner: None,
        }
    }
}

/// Ordered strategies for one source, tried until one yields papers
pub struct FallbackChain {
    source: SourceId,
    strategies: Vec<Box<dyn Strategy>>,
}

impl FallbackChain {
    #[must_use]
    pub fn new(source: SourceId, strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { source, strategies }
    }

    #[must_use]
    pub const fn source(&self) -> SourceId {
        self.source
    }

    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run the strategies in order until one returns at least one valid paper
    pub async fn execute(&self, ctx: &mut StrategyContext) -> ChainOutcome {
        let mut outcome = ChainOutcome::default();
        let mut ran_any = false;

        for strategy in &self.strategies {
            let name = strategy.name();

            if ctx.session.throttle().is_exhausted(strategy.family()) {
                debug!(
                    "{} skipping {}: {} exhausted",
                    self.source,
                    name,
                    strategy.family()
                );
                outcome.attempts.push(StrategyAttempt {
                    strategy: name,
                    status: AttemptStatus::Skipped,
                });
                continue;
            }

            if ran_any {
                ctx.session.throttle().between_strategies().await;
            }
            ran_any = true;

            debug!("{} trying strategy {}", self.source, name);
            ctx.sink.clear();

            let status = match strategy.run(ctx).await {
                Ok(papers) => {
                    let valid: Vec<Paper> = papers
                        .into_iter()
                        .filter(Paper::is_valid)
                        .take(ctx.limit)
                        .collect();

                    if valid.is_empty() {
                        info!("{} strategy {} returned no papers", self.source, name);
                        ctx.sink.clear();
                        AttemptStatus::Empty
                    } else {
                        info!(
                            "{} strategy {} returned {} papers",
                            self.source,
                            name,
                            valid.len()
                        );
                        ctx.sink.replace(valid.clone());
                        outcome.attempts.push(StrategyAttempt {
                            strategy: name,
                            status: AttemptStatus::Success { count: valid.len() },
                        });
                        outcome.papers = valid;
                        outcome.winner = Some(name);
                        return outcome;
                    }
                }
                Err(SourceError::Unavailable(reason)) => {
                    debug!("{} strategy {} unavailable: {}", self.source, name, reason);
                    AttemptStatus::Unavailable { reason }
                }
                Err(e) => {
                    warn!("{} strategy {} failed: {}", self.source, name, e);
                    ctx.sink.clear();
                    AttemptStatus::Failed {
                        reason: e.to_string(),
                    }
                }
            };

            outcome.attempts.push(StrategyAttempt {
                strategy: name,
                status,
            });
        }

        info!(
            "{} fallback chain exhausted after {} strategies",
            self.source,
            outcome.attempts.len()
        );
        outcome
    }
}

/// [`SourceAdapter`] backed by a [`FallbackChain`].
///
/// Every call gets a fresh HTTP session (cookie jar, proxy route) and a fresh
/// politeness throttle.
pub struct ChainAdapter {
    chain: FallbackChain,
    router: Arc<ProxyRouter>,
    http: HttpClientConfig,
    profile: PolitenessProfile,
    max_retries: u32,
}

impl ChainAdapter {
    #[must_use]
    pub fn new(
        chain: FallbackChain,
        router: Arc<ProxyRouter>,
        http: HttpClientConfig,
        profile: PolitenessProfile,
        max_retries: u32,
    ) -> Self {
        Self {
            chain,
            router,
            http,
            profile,
            max_retries,
        }
    }

    #[must_use]
    pub const fn chain(&self) -> &FallbackChain {
        &self.chain
    }

    fn session(&self) -> Result<HttpSession, SourceError> {
        let source = self.chain.source();
        HttpSession::new(
            source,
            self.http.clone(),
            self.router.session(source.site()),
            PolitenessThrottle::new(source, self.profile.clone(), self.max_retries),
            RetryConfig::with_max_attempts(self.max_retries),
        )
    }
}

#[async_trait]
impl SourceAdapter for ChainAdapter {
    fn source(&self) -> SourceId {
        self.chain.source()
    }

    async fn retrieve(&self, topic: &str, limit: usize, sink: PartialResults) -> Vec<Paper> {
        self.retrieve_detailed(topic, limit, sink).await.papers
    }

    async fn retrieve_detailed(
        &self,
        topic: &str,
        limit: usize,
        sink: PartialResults,
    ) -> ChainOutcome {
        let session = match self.session() {
            Ok(session) => session,
            Err(e) => {
                error!("{} could not start an HTTP session: {}", self.source(), e);
                return ChainOutcome::default();
            }
        };

        let mut ctx = StrategyContext::new(topic, limit, session, sink);
        self.chain.execute(&mut ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::providers::EndpointFamily;
    use crate::config::ProxyConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        name: &'static str,
        family: EndpointFamily,
        result: Result<Vec<Paper>, SourceError>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Strategy for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        fn family(&self) -> EndpointFamily {
            self.family
        }

        async fn run(&self, ctx: &mut StrategyContext) -> Result<Vec<Paper>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(papers) = &self.result {
                for paper in papers {
                    ctx.sink.push(paper.clone());
                }
            }
            self.result.clone()
        }
    }

    fn scripted(
        name: &'static str,
        family: EndpointFamily,
        result: Result<Vec<Paper>, SourceError>,
    ) -> (Box<dyn Strategy>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = Scripted {
            name,
            family,
            result,
            calls: Arc::clone(&calls),
        };
        (Box::new(strategy), calls)
    }

    fn context(limit: usize) -> StrategyContext {
        let router = Arc::new(ProxyRouter::new(ProxyConfig::default()));
        let session = HttpSession::new(
            SourceId::Acm,
            HttpClientConfig::default(),
            router.session("acm"),
            PolitenessThrottle::new(SourceId::Acm, PolitenessProfile::none(), 1),
            RetryConfig::immediate(1),
        )
        .unwrap();
        StrategyContext::new("graph neural networks", limit, session, PartialResults::new())
    }

    fn papers(titles: &[&str]) -> Vec<Paper> {
        titles
            .iter()
            .map(|t| Paper::new(*t, SourceId::Acm))
            .collect()
    }

    #[tokio::test]
    async fn test_first_non_empty_strategy_wins() {
        let (html, html_calls) = scripted("acm_html", EndpointFamily::AcmWeb, Ok(papers(&["", " "])));
        let (json, json_calls) = scripted(
            "acm_json",
            EndpointFamily::AcmWeb,
            Ok(papers(&["A", "B", "C"])),
        );
        let (web, web_calls) = scripted("web_search", EndpointFamily::WebSearch, Ok(papers(&["D"])));

        let chain = FallbackChain::new(SourceId::Acm, vec![html, json, web]);
        let mut ctx = context(10);
        let outcome = chain.execute(&mut ctx).await;

        assert_eq!(outcome.winner, Some("acm_json"));
        assert_eq!(outcome.papers.len(), 3);
        assert_eq!(outcome.attempts[0].status, AttemptStatus::Empty);
        assert_eq!(
            outcome.attempts[1].status,
            AttemptStatus::Success { count: 3 }
        );
        assert_eq!(html_calls.load(Ordering::SeqCst), 1);
        assert_eq!(json_calls.load(Ordering::SeqCst), 1);
        assert_eq!(web_calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.sink.len(), 3);
    }

    #[tokio::test]
    async fn test_errors_move_to_next_strategy_and_chain_can_exhaust() {
        let (first, _) = scripted(
            "acm_html",
            EndpointFamily::AcmWeb,
            Err(SourceError::Parse("broken page".to_string())),
        );
        let (second, _) = scripted(
            "web_search",
            EndpointFamily::WebSearch,
            Err(SourceError::Unavailable("no API key".to_string())),
        );

        let chain = FallbackChain::new(SourceId::Acm, vec![first, second]);
        let mut ctx = context(10);
        let outcome = chain.execute(&mut ctx).await;

        assert!(outcome.papers.is_empty());
        assert!(outcome.winner.is_none());
        assert!(matches!(
            outcome.attempts[0].status,
            AttemptStatus::Failed { .. }
        ));
        assert!(matches!(
            outcome.attempts[1].status,
            AttemptStatus::Unavailable { .. }
        ));
        assert!(ctx.sink.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_family_is_skipped() {
        let (html, _) = scripted("acm_html", EndpointFamily::AcmWeb, Ok(Vec::new()));
        let (json, json_calls) = scripted("acm_json", EndpointFamily::AcmWeb, Ok(papers(&["A"])));
        let (web, _) = scripted("web_search", EndpointFamily::WebSearch, Ok(papers(&["B"])));

        let chain = FallbackChain::new(SourceId::Acm, vec![html, json, web]);
        let mut ctx = context(10);
        // max_consecutive_errors is 1 in this context
        ctx.session
            .throttle_mut()
            .record_error(EndpointFamily::AcmWeb)
            .await;

        let outcome = chain.execute(&mut ctx).await;

        assert_eq!(outcome.attempts[0].status, AttemptStatus::Skipped);
        assert_eq!(outcome.attempts[1].status, AttemptStatus::Skipped);
        assert_eq!(outcome.winner, Some("web_search"));
        assert_eq!(json_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_result_truncated_to_limit() {
        let (only, _) = scripted(
            "arxiv_api",
            EndpointFamily::ArxivApi,
            Ok(papers(&["A", "B", "C", "D"])),
        );
        let chain = FallbackChain::new(SourceId::Arxiv, vec![only]);
        let mut ctx = context(2);

        let outcome = chain.execute(&mut ctx).await;
        assert_eq!(outcome.papers.len(), 2);
        assert_eq!(chain.strategy_names(), vec!["arxiv_api"]);
    }
}
