use super::traits::{EndpointFamily, SourceError, Strategy, StrategyContext};
use crate::client::html::{collapse_whitespace, extract_first, AuthorRule, ScrapedItem, SelectorSet};
use crate::client::{Paper, SourceId};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::OnceLock;
use tracing::{debug, info, warn};
use url::Url;

static METADATA_RE: OnceLock<Regex> = OnceLock::new();

fn metadata_re() -> &'static Regex {
    METADATA_RE.get_or_init(|| {
        Regex::new(r"(?s)xplGlobal\.document\.metadata\s*=\s*(\{.*?\});").expect("valid regex")
    })
}

const TITLE: &[&str] = &["h2", "h3", "h2 a", "h3 a", ".title", ".article-title"];
const LINK: &[&str] = &["h2 a", "h3 a", ".title a", "a.result-title", "a[href*='/document/']"];
const YEAR: &[&str] = &[
    "div.publisher-info-container span.year",
    ".publication-year",
    ".year",
];

const RESULT_SETS: &[SelectorSet] = &[
    SelectorSet {
        link: LINK,
        authors: AuthorRule::Elements(".author"),
        year: YEAR,
        ..SelectorSet::new("List-results-items", "div.List-results-items", TITLE)
    },
    SelectorSet {
        link: LINK,
        authors: AuthorRule::Elements(".author"),
        year: YEAR,
        ..SelectorSet::new("article-list row", "div.article-list div.row", TITLE)
    },
    SelectorSet {
        link: LINK,
        authors: AuthorRule::Elements(".author"),
        year: YEAR,
        ..SelectorSet::new("row result-item", "div.row.result-item", TITLE)
    },
    // Navigation links are shorter than real titles
    SelectorSet {
        min_title_len: 11,
        require_link: true,
        ..SelectorSet::new("document links", "a[href*='/document/']", &[])
    },
];

#[derive(Debug, Deserialize)]
struct RestResponse {
    #[serde(default)]
    records: Vec<RestRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestRecord {
    article_title: Option<String>,
    #[serde(default)]
    authors: Vec<RestAuthor>,
    publication_year: Option<Value>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    document_link: Option<String>,
    html_link: Option<String>,
    article_number: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestAuthor {
    preferred_name: Option<String>,
    full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddedMetadata {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<EmbeddedAuthor>,
    publication_year: Option<Value>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    article_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct EmbeddedAuthor {
    name: Option<String>,
}

/// Render a JSON scalar (number or string) as text
fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn scalar_year(value: Option<&Value>) -> Option<u32> {
    scalar_text(value).and_then(|text| text.get(..4)?.parse().ok())
}

/// Cookie warm-up followed by a JSON POST to the search REST endpoint
pub struct IeeeRestStrategy {
    base_url: String,
    rows_cap: usize,
}

impl IeeeRestStrategy {
    #[must_use]
    pub fn new(base_url: impl Into<String>, rows_cap: usize) -> Self {
        Self {
            base_url: base_url.into(),
            rows_cap,
        }
    }
}

#[async_trait]
impl Strategy for IeeeRestStrategy {
    fn name(&self) -> &'static str {
        "ieee_rest"
    }

    fn family(&self) -> EndpointFamily {
        EndpointFamily::IeeeWeb
    }

    async fn run(&self, ctx: &mut StrategyContext) -> Result<Vec<Paper>, SourceError> {
        info!("Searching IEEE Xplore for: {}", ctx.topic);
        let base = self.base_url.trim_end_matches('/');

        ctx.session.warm_up(&format!("{base}/Xplore/home.jsp")).await;

        let payload = json!({
            "queryText": ctx.topic,
            "highlight": true,
            "returnFacets": ["ALL"],
            "returnType": "SEARCH",
            "matchPubs": true,
            "rowsPerPage": ctx.limit.min(self.rows_cap),
        });
        let referer = format!("{base}/search/searchresult.jsp");

        let response: RestResponse = ctx
            .session
            .post_json(
                self.family(),
                &format!("{base}/rest/search"),
                &payload,
                &[
                    ("Accept", "application/json, text/plain, */*"),
                    ("Origin", base),
                    ("Referer", referer.as_str()),
                ],
            )
            .await?;

        let papers = parse_records(response, base);
        for paper in &papers {
            ctx.sink.push(paper.clone());
        }
        Ok(papers)
    }
}

fn parse_records(response: RestResponse, base: &str) -> Vec<Paper> {
    response
        .records
        .into_iter()
        .filter_map(|record| {
            let title = record.article_title?;
            let authors = record
                .authors
                .into_iter()
                .filter_map(|a| a.preferred_name.or(a.full_name))
                .collect();
            let url = record
                .document_link
                .or(record.html_link)
                .map(|link| format!("{base}{link}"))
                .unwrap_or_default();

            Some(Paper {
                title: collapse_whitespace(&title),
                authors,
                year: scalar_year(record.publication_year.as_ref()),
                abstract_text: record.abstract_text.unwrap_or_default(),
                url,
                source: SourceId::Ieee,
                external_id: scalar_text(record.article_number.as_ref()).unwrap_or_default(),
            })
        })
        .collect()
}

/// Scrape of the public search result page
pub struct IeeeHtmlStrategy {
    base_url: String,
}

impl IeeeHtmlStrategy {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Strategy for IeeeHtmlStrategy {
    fn name(&self) -> &'static str {
        "ieee_html"
    }

    fn family(&self) -> EndpointFamily {
        EndpointFamily::IeeeWeb
    }

    async fn run(&self, ctx: &mut StrategyContext) -> Result<Vec<Paper>, SourceError> {
        let base = self.base_url.trim_end_matches('/');
        let search_url = format!("{base}/search/searchresult.jsp");
        let page_url = Url::parse(&search_url)
            .map_err(|e| SourceError::Parse(format!("invalid IEEE URL: {e}")))?;

        let html = ctx
            .session
            .get_text(self.family(), &search_url, &[("queryText", ctx.topic.as_str())])
            .await?;

        let mut papers = parse_search_page(&html, &page_url, base)?;
        papers.truncate(ctx.limit);
        for paper in &papers {
            ctx.sink.push(paper.clone());
        }
        Ok(papers)
    }
}

/// Parse a search result page: embedded metadata first, then selector sets
pub fn parse_search_page(html: &str, page_url: &Url, base: &str) -> Result<Vec<Paper>, SourceError> {
    let embedded = embedded_papers(html, base);
    if !embedded.is_empty() {
        debug!("Found {} papers in embedded IEEE metadata", embedded.len());
        return Ok(embedded);
    }

    let Some((set, items)) = extract_first(html, page_url, RESULT_SETS)? else {
        warn!("No IEEE result elements found on search page");
        return Ok(Vec::new());
    };

    debug!("IEEE results read with selector set '{}'", set);
    Ok(items.into_iter().map(scraped_paper).collect())
}

fn embedded_papers(html: &str, base: &str) -> Vec<Paper> {
    metadata_re()
        .captures_iter(html)
        .filter_map(|caps| {
            let raw = caps.get(1)?.as_str();
            match serde_json::from_str::<EmbeddedMetadata>(raw) {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    warn!("Could not decode embedded IEEE metadata: {}", e);
                    None
                }
            }
        })
        .filter_map(|metadata| {
            let title = collapse_whitespace(&metadata.title?);
            let article_id = scalar_text(metadata.article_id.as_ref()).unwrap_or_default();
            Some(Paper {
                title,
                authors: metadata.authors.into_iter().filter_map(|a| a.name).collect(),
                year: scalar_year(metadata.publication_year.as_ref()),
                abstract_text: metadata.abstract_text.unwrap_or_default(),
                url: format!("{base}/document/{article_id}"),
                source: SourceId::Ieee,
                external_id: article_id,
            })
        })
        .collect()
}

fn scraped_paper(item: ScrapedItem) -> Paper {
    let url = item.link.unwrap_or_default();
    let external_id = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();

    Paper {
        title: item.title,
        authors: item.authors,
        year: item.year,
        abstract_text: item.abstract_text,
        url,
        source: SourceId::Ieee,
        external_id,
    }
}
