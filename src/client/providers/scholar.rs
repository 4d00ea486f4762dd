use super::traits::{EndpointFamily, SourceError, Strategy, StrategyContext};
use crate::client::html::{extract_first, AuthorRule, ScrapedItem, SelectorSet};
use crate::client::{Paper, SourceId};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use url::Url;

/// Results per Scholar page
const PAGE_SIZE: usize = 10;

const RESULT_SETS: &[SelectorSet] = &[SelectorSet {
    link: &["h3.gs_rt a"],
    authors: AuthorRule::Byline("div.gs_a"),
    year: &["div.gs_a"],
    abstract_text: &["div.gs_rs"],
    ..SelectorSet::new("gs_ri", "div.gs_ri", &["h3.gs_rt a", "h3.gs_rt"])
}];

/// Walks result pages one publication at a time, pausing between items
pub struct ScholarPagedStrategy {
    base_url: String,
}

impl ScholarPagedStrategy {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Strategy for ScholarPagedStrategy {
    fn name(&self) -> &'static str {
        "scholar_paged"
    }

    fn family(&self) -> EndpointFamily {
        EndpointFamily::ScholarWeb
    }

    async fn run(&self, ctx: &mut StrategyContext) -> Result<Vec<Paper>, SourceError> {
        info!("Searching Google Scholar for: {} (max {})", ctx.topic, ctx.limit);

        let page_url = parse_base(&self.base_url)?;
        let mut collected: Vec<Paper> = Vec::new();
        let mut start = 0;

        while collected.len() < ctx.limit {
            let offset = start.to_string();
            let query = [
                ("q", ctx.topic.as_str()),
                ("hl", "en"),
                ("start", offset.as_str()),
            ];

            let html = match ctx
                .session
                .get_text(self.family(), &self.base_url, &query)
                .await
            {
                Ok(html) => html,
                Err(e) if !collected.is_empty() => {
                    warn!(
                        "Scholar page at offset {} failed, keeping {} papers: {}",
                        start,
                        collected.len(),
                        e
                    );
                    break;
                }
                Err(e) => return Err(e),
            };

            let page = parse_results(&html, &page_url)?;
            if page.is_empty() {
                debug!("Scholar page at offset {} has no results", start);
                break;
            }
            let last_page = page.len() < PAGE_SIZE;

            for paper in page {
                ctx.sink.push(paper.clone());
                collected.push(paper);
                if collected.len() >= ctx.limit {
                    break;
                }
                ctx.session.throttle_mut().after_item().await;
            }

            if last_page {
                debug!("Scholar page at offset {} was the last one", start);
                break;
            }
            start += PAGE_SIZE;
        }

        info!("Google Scholar returned {} papers", collected.len());
        Ok(collected)
    }
}

/// Scrapes the first result page directly
pub struct ScholarHtmlStrategy {
    base_url: String,
}

impl ScholarHtmlStrategy {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Strategy for ScholarHtmlStrategy {
    fn name(&self) -> &'static str {
        "scholar_html"
    }

    fn family(&self) -> EndpointFamily {
        EndpointFamily::ScholarWeb
    }

    async fn run(&self, ctx: &mut StrategyContext) -> Result<Vec<Paper>, SourceError> {
        let page_url = parse_base(&self.base_url)?;
        let html = ctx
            .session
            .get_text(
                self.family(),
                &self.base_url,
                &[
                    ("q", ctx.topic.as_str()),
                    ("hl", "en"),
                    ("as_sdt", "0,5"),
                    ("start", "0"),
                ],
            )
            .await?;

        let mut papers = parse_results(&html, &page_url)?;
        papers.truncate(ctx.limit);
        for paper in &papers {
            ctx.sink.push(paper.clone());
        }
        Ok(papers)
    }
}

fn parse_base(base_url: &str) -> Result<Url, SourceError> {
    Url::parse(base_url).map_err(|e| SourceError::Parse(format!("invalid Scholar URL: {e}")))
}

/// Parse a Scholar result page
pub fn parse_results(html: &str, page_url: &Url) -> Result<Vec<Paper>, SourceError> {
    let items = extract_first(html, page_url, RESULT_SETS)?
        .map(|(_, items)| items)
        .unwrap_or_default();
    Ok(items.into_iter().map(to_paper).collect())
}

fn to_paper(item: ScrapedItem) -> Paper {
    let external_id = item
        .data_id
        .unwrap_or_else(|| format!("{:x}", Sha256::digest(item.title.as_bytes())));

    Paper {
        title: item.title,
        authors: item.authors,
        year: item.year,
        abstract_text: item.abstract_text,
        url: item.link.unwrap_or_default(),
        source: SourceId::Scholar,
        external_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body><div id="gs_res_ccl_mid">
  <div class="gs_r gs_or gs_scl">
    <div class="gs_ri">
      <h3 class="gs_rt"><a href="https://arxiv.org/abs/1609.02907">Semi-supervised classification with graph convolutional networks</a></h3>
      <div class="gs_a">TN Kipf, M Welling - arXiv preprint arXiv:1609.02907, 2016 - arxiv.org</div>
      <div class="gs_rs">We present a scalable approach for semi-supervised learning on graph-structured data.</div>
    </div>
  </div>
  <div class="gs_r gs_or gs_scl">
    <div class="gs_ri" data-cid="abc123">
      <h3 class="gs_rt"><span class="gs_ctc">[BOOK]</span> Graph representation learning</h3>
      <div class="gs_a">WL Hamilton - 2020 - Springer</div>
    </div>
  </div>
</div></body></html>"#;

    #[test]
    fn test_parse_results() {
        let base = Url::parse("https://scholar.google.com/scholar").unwrap();
        let papers = parse_results(PAGE, &base).unwrap();
        assert_eq!(papers.len(), 2);

        let gcn = &papers[0];
        assert_eq!(
            gcn.title,
            "Semi-supervised classification with graph convolutional networks"
        );
        assert_eq!(gcn.authors, vec!["TN Kipf", "M Welling"]);
        assert_eq!(gcn.year, Some(2016));
        assert_eq!(gcn.url, "https://arxiv.org/abs/1609.02907");
        assert_eq!(gcn.external_id.len(), 64);
        assert!(gcn.abstract_text.starts_with("We present"));

        let book = &papers[1];
        assert_eq!(book.title, "[BOOK] Graph representation learning");
        assert_eq!(book.external_id, "abc123");
        assert_eq!(book.year, Some(2020));
        assert!(book.url.is_empty());
    }

    #[test]
    fn test_blocked_page_has_no_results() {
        let base = Url::parse("https://scholar.google.com/scholar").unwrap();
        let html = "<html><body><h1>Please show you're not a robot</h1></body></html>";
        assert!(parse_results(html, &base).unwrap().is_empty());
    }
}
