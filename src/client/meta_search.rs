use crate::client::dedup::dedupe;
use crate::client::fallback::{ChainAdapter, ChainOutcome, StrategyAttempt};
use crate::client::providers::{chain_for, SourceAdapter};
use crate::client::proxy::ProxyRouter;
use crate::client::{Paper, PartialResults, Query, SourceId};
use crate::config::{Config, LimitsConfig};
use crate::{Error, Result};
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};

/// Default number of sources searched at the same time
pub const DEFAULT_MAX_PARALLEL_SOURCES: usize = 4;

/// How a source finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOutcome {
    /// The chain ran to completion
    Completed,
    /// The overall deadline passed; the partial result was kept
    TimedOut,
    /// The task panicked; the partial result was kept
    Failed,
}

impl fmt::Display for SourceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Completed => "completed",
            Self::TimedOut => "timed out",
            Self::Failed => "failed",
        })
    }
}

/// Per-source summary of a search
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: SourceId,
    /// Papers this source contributed before deduplication
    pub count: usize,
    pub outcome: SourceOutcome,
    /// Strategy whose papers were used
    pub winner: Option<&'static str>,
    pub attempts: Vec<StrategyAttempt>,
}

/// Deduplicated, capped papers of one search
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub topic: String,
    pub papers: Vec<Paper>,
    pub per_source: Vec<SourceReport>,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

impl SearchResult {
    fn empty(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            papers: Vec::new(),
            per_source: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.papers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }

    #[must_use]
    pub fn report(&self, source: SourceId) -> Option<&SourceReport> {
        self.per_source.iter().find(|r| r.source == source)
    }

    /// The papers, or [`Error::NoPapersFound`] when there are none
    pub fn into_papers(self) -> Result<Vec<Paper>> {
        if self.papers.is_empty() {
            return Err(Error::NoPapersFound { topic: self.topic });
        }
        Ok(self.papers)
    }
}

/// Fans a query out to every requested source and merges what comes back
pub struct SearchEngine {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    limits: LimitsConfig,
    max_parallel_sources: usize,
}

impl SearchEngine {
    /// Engine with the four real source chains
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let router = Arc::new(ProxyRouter::new(config.proxy.clone()));

        let adapters: Vec<Arc<dyn SourceAdapter>> = SourceId::PRIORITY
            .into_iter()
            .map(|source| {
                Arc::new(ChainAdapter::new(
                    chain_for(source, config),
                    Arc::clone(&router),
                    config.http.clone(),
                    config.throttle.profile(source).clone(),
                    config.search.max_retries,
                )) as Arc<dyn SourceAdapter>
            })
            .collect();

        info!("Initialized search engine with {} sources", adapters.len());

        Self {
            adapters,
            limits: config.limits.clone(),
            max_parallel_sources: config.search.max_parallel_sources.max(1),
        }
    }

    /// Engine over arbitrary adapters with default limits
    #[must_use]
    pub fn with_adapters(adapters: Vec<Arc<dyn SourceAdapter>>) -> Self {
        Self {
            adapters,
            limits: LimitsConfig::default(),
            max_parallel_sources: DEFAULT_MAX_PARALLEL_SOURCES,
        }
    }

    #[must_use]
    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn with_max_parallel_sources(mut self, max_parallel_sources: usize) -> Self {
        self.max_parallel_sources = max_parallel_sources.max(1);
        self
    }

    /// Sources this engine can query
    #[must_use]
    pub fn sources(&self) -> Vec<SourceId> {
        self.adapters.iter().map(|a| a.source()).collect()
    }

    fn adapter(&self, source: SourceId) -> Option<&Arc<dyn SourceAdapter>> {
        self.adapters.iter().find(|a| a.source() == source)
    }

    /// Run `query` against every requested source.
    ///
    /// Never fails. Sources still running when the budget is spent are
    /// cancelled and contribute whatever they had collected.
    pub async fn search(&self, query: &Query) -> SearchResult {
        let start = Instant::now();

        if query.max_results == 0 {
            info!("max_results is 0, skipping search for '{}'", query.topic);
            return SearchResult::empty(&query.topic);
        }

        info!(
            "Starting search for '{}' (max {} papers, budget {:?})",
            query.topic, query.max_results, query.timeout_budget
        );

        // A budget too large to represent means no deadline
        let deadline = start.checked_add(query.timeout_budget);
        let semaphore = Arc::new(Semaphore::new(self.max_parallel_sources));
        let mut running = Vec::new();

        for source in query.sources_by_priority() {
            let Some(adapter) = self.adapter(source) else {
                warn!("No adapter registered for {}", source);
                continue;
            };

            let adapter = Arc::clone(adapter);
            let limit = self.limits.for_source(source, query.max_results);
            let topic = query.topic.clone();
            let sink = PartialResults::new();
            let task_sink = sink.clone();
            let semaphore = Arc::clone(&semaphore);

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire().await.ok();
                adapter.retrieve_detailed(&topic, limit, task_sink).await
            });

            running.push((source, limit, sink, handle));
        }

        let mut collected = Vec::new();
        let mut per_source = Vec::new();

        for (source, limit, sink, mut handle) in running {
            let joined = match deadline {
                Some(deadline) => timeout_at(deadline, &mut handle).await,
                None => Ok((&mut handle).await),
            };

            let (papers, outcome, chain) = match joined {
                Ok(Ok(chain)) => {
                    let papers = chain.papers.clone();
                    (papers, SourceOutcome::Completed, chain)
                }
                Ok(Err(e)) => {
                    error!("{} task failed: {}", source, e);
                    (partial(&sink, limit), SourceOutcome::Failed, ChainOutcome::default())
                }
                Err(_) => {
                    handle.abort();
                    let papers = partial(&sink, limit);
                    warn!(
                        "{} timed out, keeping {} partial papers",
                        source,
                        papers.len()
                    );
                    (papers, SourceOutcome::TimedOut, ChainOutcome::default())
                }
            };

            info!("{} contributed {} papers ({})", source, papers.len(), outcome);
            per_source.push(SourceReport {
                source,
                count: papers.len(),
                outcome,
                winner: chain.winner,
                attempts: chain.attempts,
            });
            collected.extend(papers);
        }

        let mut papers = dedupe(collected);
        papers.truncate(query.max_results);

        let elapsed = start.elapsed();
        info!(
            "Search for '{}' finished with {} papers in {:.1}s",
            query.topic,
            papers.len(),
            elapsed.as_secs_f64()
        );

        SearchResult {
            topic: query.topic.clone(),
            papers,
            per_source,
            elapsed,
        }
    }
}

/// Valid papers a cancelled source had collected, capped at its limit
fn partial(sink: &PartialResults, limit: usize) -> Vec<Paper> {
    sink.snapshot()
        .into_iter()
        .filter(Paper::is_valid)
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_papers_on_empty_result() {
        let result = SearchResult::empty("graph neural networks");
        assert!(matches!(
            result.into_papers(),
            Err(Error::NoPapersFound { topic }) if topic == "graph neural networks"
        ));
    }

    #[test]
    fn test_result_serialization() {
        let mut result = SearchResult::empty("gnn");
        result.papers.push(Paper::new("A", SourceId::Arxiv));
        result.elapsed = Duration::from_millis(1500);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["papers"][0]["title"], "A");
        assert_eq!(json["elapsed_secs"], 1.5);
    }

    #[test]
    fn test_from_config_registers_every_source() {
        let engine = SearchEngine::from_config(&Config::default());
        assert_eq!(engine.sources(), SourceId::PRIORITY.to_vec());
    }
}
