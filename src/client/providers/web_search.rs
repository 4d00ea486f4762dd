use super::traits::{EndpointFamily, SourceError, Strategy, StrategyContext};
use crate::client::{Paper, SourceId};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic: Vec<OrganicHit>,
}

#[derive(Debug, Deserialize)]
struct OrganicHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

/// Site-restricted query against a Serper-compatible web-search API
pub struct WebSearchStrategy {
    endpoint: String,
    api_key: Option<String>,
    source: SourceId,
    /// Domain used in the `site:` filter
    site: &'static str,
    /// Lowercase fragment every kept link must contain
    host_marker: &'static str,
    /// Path fragment every kept link must contain
    path_marker: &'static str,
    title_suffixes: &'static [&'static str],
    hits: usize,
}

impl WebSearchStrategy {
    /// Web-search tier for IEEE Xplore documents
    #[must_use]
    pub fn ieee(endpoint: impl Into<String>, api_key: Option<String>, hits: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            source: SourceId::Ieee,
            site: "ieeexplore.ieee.org",
            host_marker: "ieee",
            path_marker: "/document/",
            title_suffixes: &[" - IEEE Xplore", " - IEEE Conference"],
            hits,
        }
    }

    /// Web-search tier for ACM Digital Library DOIs
    #[must_use]
    pub fn acm(endpoint: impl Into<String>, api_key: Option<String>, hits: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            source: SourceId::Acm,
            site: "dl.acm.org",
            host_marker: "acm",
            path_marker: "/doi/",
            title_suffixes: &[" | ACM Digital Library", " | ACM"],
            hits,
        }
    }

    fn to_paper(&self, hit: OrganicHit) -> Option<Paper> {
        let link = hit.link.to_lowercase();
        if !link.contains(self.host_marker) || !link.contains(self.path_marker) {
            debug!("Web search hit is not a {} document link: {}", self.source, hit.link);
            return None;
        }

        let title = self
            .title_suffixes
            .iter()
            .fold(hit.title, |title, suffix| title.replace(suffix, ""));
        let external_id = hit
            .link
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();

        Some(Paper {
            title: title.trim().to_string(),
            authors: Vec::new(),
            year: None,
            abstract_text: hit.snippet,
            url: hit.link,
            source: self.source,
            external_id,
        })
    }
}

#[async_trait]
impl Strategy for WebSearchStrategy {
    fn name(&self) -> &'static str {
        "web_search"
    }

    fn family(&self) -> EndpointFamily {
        EndpointFamily::WebSearch
    }

    async fn run(&self, ctx: &mut StrategyContext) -> Result<Vec<Paper>, SourceError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(SourceError::Unavailable(
                "no web-search API key configured".to_string(),
            ));
        };

        let query = format!("{} site:{}", ctx.topic, self.site);
        info!("Web search fallback for {}: {}", self.source, query);

        let response: SearchResponse = ctx
            .session
            .post_json(
                self.family(),
                &self.endpoint,
                &json!({ "q": query, "num": self.hits }),
                &[("X-API-KEY", api_key)],
            )
            .await?;

        let papers: Vec<Paper> = response
            .organic
            .into_iter()
            .filter_map(|hit| self.to_paper(hit))
            .collect();
        for paper in &papers {
            ctx.sink.push(paper.clone());
        }
        Ok(papers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(title: &str, link: &str) -> OrganicHit {
        OrganicHit {
            title: title.to_string(),
            link: link.to_string(),
            snippet: "snippet".to_string(),
        }
    }

    #[test]
    fn test_ieee_hits_filtered_and_cleaned() {
        let strategy = WebSearchStrategy::ieee("http://localhost", None, 10);

        let paper = strategy
            .to_paper(hit(
                "Graph Neural Networks for Power Systems - IEEE Xplore",
                "https://ieeexplore.ieee.org/document/9321511",
            ))
            .unwrap();
        assert_eq!(paper.title, "Graph Neural Networks for Power Systems");
        assert_eq!(paper.external_id, "9321511");
        assert_eq!(paper.abstract_text, "snippet");
        assert_eq!(paper.source, SourceId::Ieee);

        assert!(strategy
            .to_paper(hit("IEEE Xplore", "https://ieeexplore.ieee.org/Xplore/home.jsp"))
            .is_none());
        assert!(strategy
            .to_paper(hit("Mirror", "https://example.com/document/1"))
            .is_none());
    }

    #[test]
    fn test_acm_title_suffix() {
        let strategy = WebSearchStrategy::acm("http://localhost", None, 10);
        let paper = strategy
            .to_paper(hit(
                "How Powerful are Graph Neural Networks? | ACM Digital Library",
                "https://dl.acm.org/doi/10.5555/3454287.3454300",
            ))
            .unwrap();

        assert_eq!(paper.title, "How Powerful are Graph Neural Networks?");
        assert_eq!(paper.external_id, "3454287.3454300");
    }
}
