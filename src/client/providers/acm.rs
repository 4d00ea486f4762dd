use super::traits::{EndpointFamily, SourceError, Strategy, StrategyContext};
use crate::client::html::{collapse_whitespace, extract_first, AuthorRule, ScrapedItem, SelectorSet};
use crate::client::{Paper, SourceId};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::{debug, info, warn};
use url::Url;

static DOI_IN_URL_RE: OnceLock<Regex> = OnceLock::new();

fn doi_in_url_re() -> &'static Regex {
    DOI_IN_URL_RE.get_or_init(|| Regex::new(r"doi/([\d.]+/[\w.]+)").expect("valid regex"))
}

const FALLBACK_TITLE: &[&str] = &[".issue-item__title a", "h5 a", "h3 a", ".title a"];

/// Builds a result set for one item container
const fn result_set(name: &'static str, item: &'static str, title: &'static [&'static str]) -> SelectorSet {
    SelectorSet {
        authors: AuthorRule::Elements("span.author-name"),
        year: &["div.bookPubDate", ".issue-item__detail", ".bookPubDate"],
        abstract_text: &["div.issue-item__abstract", ".abstract"],
        doi: &["a.issue-item__doi"],
        require_link: true,
        ..SelectorSet::new(name, item, title)
    }
}

const RESULT_SETS: &[SelectorSet] = &[
    result_set("issue-item", "div.issue-item", &["h5.issue-item__title a"]),
    result_set("search__item", "div.search__item", FALLBACK_TITLE),
    result_set("search-result__item", "div.search-result__item", FALLBACK_TITLE),
    result_set("li search__item", "li.search__item", FALLBACK_TITLE),
    result_set("item__content", "div.item__content", FALLBACK_TITLE),
];

/// Cookie warm-up, then a scrape of the search result page
pub struct AcmHtmlStrategy {
    base_url: String,
    page_size: usize,
}

impl AcmHtmlStrategy {
    #[must_use]
    pub fn new(base_url: impl Into<String>, page_size: usize) -> Self {
        Self {
            base_url: base_url.into(),
            page_size,
        }
    }
}

#[async_trait]
impl Strategy for AcmHtmlStrategy {
    fn name(&self) -> &'static str {
        "acm_html"
    }

    fn family(&self) -> EndpointFamily {
        EndpointFamily::AcmWeb
    }

    async fn run(&self, ctx: &mut StrategyContext) -> Result<Vec<Paper>, SourceError> {
        info!("Searching ACM Digital Library for: {}", ctx.topic);
        let base = self.base_url.trim_end_matches('/');
        let search_url = format!("{base}/action/doSearch");
        let page_url = Url::parse(&search_url)
            .map_err(|e| SourceError::Parse(format!("invalid ACM URL: {e}")))?;

        ctx.session.warm_up(&format!("{base}/")).await;

        let page_size = self.page_size.to_string();
        let html = ctx
            .session
            .get_text(
                self.family(),
                &search_url,
                &[
                    ("AllField", ctx.topic.as_str()),
                    ("pageSize", page_size.as_str()),
                ],
            )
            .await?;

        let papers = parse_search_page(&html, &page_url)?;
        for paper in &papers {
            ctx.sink.push(paper.clone());
        }
        Ok(papers)
    }
}

/// Parse the HTML search result page
pub fn parse_search_page(html: &str, page_url: &Url) -> Result<Vec<Paper>, SourceError> {
    let Some((set, items)) = extract_first(html, page_url, RESULT_SETS)? else {
        warn!("No ACM result items found on search page");
        return Ok(Vec::new());
    };

    debug!("Found {} ACM items with selector set '{}'", items.len(), set);
    Ok(items.into_iter().map(scraped_paper).collect())
}

fn scraped_paper(item: ScrapedItem) -> Paper {
    let url = item.link.unwrap_or_default();
    let external_id = item
        .doi
        .filter(|doi| !doi.is_empty())
        .or_else(|| {
            doi_in_url_re()
                .captures(&url)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        })
        .unwrap_or_default();

    Paper {
        title: item.title,
        authors: item.authors,
        year: item.year,
        abstract_text: item.abstract_text,
        url,
        source: SourceId::Acm,
        external_id,
    }
}

#[derive(Debug, Deserialize)]
struct JsonResponse {
    #[serde(default)]
    items: Vec<JsonItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: Vec<JsonAuthor>,
    publication_date: Option<String>,
    #[serde(default, rename = "abstract")]
    abstract_text: String,
    doi: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonAuthor {
    name: Option<String>,
}

/// The JSON flavour of the search endpoint
pub struct AcmJsonStrategy {
    base_url: String,
    page_size: usize,
}

impl AcmJsonStrategy {
    #[must_use]
    pub fn new(base_url: impl Into<String>, page_size: usize) -> Self {
        Self {
            base_url: base_url.into(),
            page_size,
        }
    }
}

#[async_trait]
impl Strategy for AcmJsonStrategy {
    fn name(&self) -> &'static str {
        "acm_json"
    }

    fn family(&self) -> EndpointFamily {
        EndpointFamily::AcmWeb
    }

    async fn run(&self, ctx: &mut StrategyContext) -> Result<Vec<Paper>, SourceError> {
        let base = self.base_url.trim_end_matches('/');
        let page_size = self.page_size.to_string();

        let response: JsonResponse = ctx
            .session
            .get_json(
                self.family(),
                &format!("{base}/action/doSearch"),
                &[
                    ("AllField", ctx.topic.as_str()),
                    ("startPage", "0"),
                    ("pageSize", page_size.as_str()),
                    ("format", "json"),
                ],
            )
            .await?;

        let papers = parse_items(response, base);
        for paper in &papers {
            ctx.sink.push(paper.clone());
        }
        Ok(papers)
    }
}

fn parse_items(response: JsonResponse, base: &str) -> Vec<Paper> {
    response
        .items
        .into_iter()
        .filter_map(|item| {
            let doi = item.doi.filter(|doi| !doi.trim().is_empty())?;
            Some(Paper {
                title: collapse_whitespace(&item.title),
                authors: item.authors.into_iter().filter_map(|a| a.name).collect(),
                year: item
                    .publication_date
                    .as_deref()
                    .and_then(|date| date.get(..4))
                    .and_then(|year| year.parse().ok()),
                abstract_text: item.abstract_text,
                url: format!("{base}/doi/{doi}"),
                source: SourceId::Acm,
                external_id: doi,
            })
        })
        .collect()
}
