//! Selector-driven extraction of result items from scraped HTML pages.
//!
//! Every HTML strategy owns an ordered list of [`SelectorSet`]s. The page is
//! evaluated against each set in turn and the items of the first set that
//! yields at least one titled item are returned.

use crate::client::providers::SourceError;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

static YEAR_RE: OnceLock<Regex> = OnceLock::new();

fn year_re() -> &'static Regex {
    YEAR_RE.get_or_init(|| Regex::new(r"\b(19|20)\d{2}\b").expect("valid regex"))
}

/// First plausible publication year (1900-2099) found in `text`
#[must_use]
pub fn find_year(text: &str) -> Option<u32> {
    year_re()
        .find(text)
        .and_then(|m| m.as_str().parse().ok())
}

/// Collapse runs of whitespace into single spaces
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// How the authors of an item are laid out
#[derive(Debug, Clone, Copy)]
pub enum AuthorRule {
    /// One element per author
    Elements(&'static str),
    /// A single byline "A Author, B Author - Venue, 2020 - publisher"
    Byline(&'static str),
    None,
}

/// One way of reading result items off a page
#[derive(Debug, Clone, Copy)]
pub struct SelectorSet {
    pub name: &'static str,
    /// Selector matching each result item
    pub item: &'static str,
    /// Candidate title selectors, relative to the item; the item itself when empty
    pub title: &'static [&'static str],
    /// Candidate link selectors; when empty the first `a[href]` under the title is used
    pub link: &'static [&'static str],
    pub authors: AuthorRule,
    pub year: &'static [&'static str],
    pub abstract_text: &'static [&'static str],
    /// Candidate selectors holding a DOI as text
    pub doi: &'static [&'static str],
    /// Titles shorter than this are treated as missing
    pub min_title_len: usize,
    /// Drop items without a link
    pub require_link: bool,
}

impl SelectorSet {
    /// A set with only item and title selectors
    #[must_use]
    pub const fn new(name: &'static str, item: &'static str, title: &'static [&'static str]) -> Self {
        Self {
            name,
            item,
            title,
            link: &[],
            authors: AuthorRule::None,
            year: &[],
            abstract_text: &[],
            doi: &[],
            min_title_len: 1,
            require_link: false,
        }
    }
}

/// Raw fields read from one result item
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapedItem {
    pub title: String,
    /// Absolute URL, resolved against the page URL
    pub link: Option<String>,
    pub authors: Vec<String>,
    pub year: Option<u32>,
    pub abstract_text: String,
    pub doi: Option<String>,
    /// Value of a `data-cid`/`data-did` attribute on the item, if any
    pub data_id: Option<String>,
}

/// Evaluate `sets` in order and return the first non-empty extraction.
///
/// The returned name is the matching set's name.
pub fn extract_first(
    html: &str,
    page_url: &Url,
    sets: &[SelectorSet],
) -> Result<Option<(&'static str, Vec<ScrapedItem>)>, SourceError> {
    let document = Html::parse_document(html);

    for set in sets {
        let items = extract_with(&document, page_url, set)?;
        if !items.is_empty() {
            debug!("Selector set '{}' matched {} items", set.name, items.len());
            return Ok(Some((set.name, items)));
        }
    }

    Ok(None)
}

fn parse_selector(selector: &str) -> Result<Selector, SourceError> {
    Selector::parse(selector)
        .map_err(|e| SourceError::Parse(format!("invalid CSS selector '{selector}': {e:?}")))
}

fn parse_all(selectors: &[&str]) -> Result<Vec<Selector>, SourceError> {
    selectors.iter().map(|s| parse_selector(s)).collect()
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn first_text(item: ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|selector| {
        item.select(selector)
            .map(element_text)
            .find(|text| !text.is_empty())
    })
}

fn href_of(element: ElementRef<'_>) -> Option<&str> {
    element.value().attr("href").filter(|h| !h.trim().is_empty())
}

fn extract_with(
    document: &Html,
    page_url: &Url,
    set: &SelectorSet,
) -> Result<Vec<ScrapedItem>, SourceError> {
    let item_selector = parse_selector(set.item)?;
    let title_selectors = parse_all(set.title)?;
    let link_selectors = parse_all(set.link)?;
    let year_selectors = parse_all(set.year)?;
    let abstract_selectors = parse_all(set.abstract_text)?;
    let doi_selectors = parse_all(set.doi)?;
    let anchor = parse_selector("a[href]")?;
    let author_selector = match set.authors {
        AuthorRule::Elements(s) | AuthorRule::Byline(s) => Some(parse_selector(s)?),
        AuthorRule::None => None,
    };

    let mut items = Vec::new();
    for item in document.select(&item_selector) {
        let title_element = if title_selectors.is_empty() {
            Some(item)
        } else {
            title_selectors.iter().find_map(|selector| {
                item.select(selector)
                    .find(|element| !element_text(*element).is_empty())
            })
        };
        let Some(title_element) = title_element else {
            continue;
        };

        let title = element_text(title_element);
        if title.chars().count() < set.min_title_len {
            continue;
        }

        let raw_link = if link_selectors.is_empty() {
            href_of(title_element).or_else(|| title_element.select(&anchor).find_map(href_of))
        } else {
            link_selectors
                .iter()
                .find_map(|selector| item.select(selector).find_map(href_of))
        };
        let link = raw_link.and_then(|href| page_url.join(href.trim()).ok().map(String::from));
        if set.require_link && link.is_none() {
            continue;
        }

        let authors = match (set.authors, &author_selector) {
            (AuthorRule::Elements(_), Some(selector)) => item
                .select(selector)
                .map(element_text)
                .filter(|name| !name.is_empty())
                .collect(),
            (AuthorRule::Byline(_), Some(selector)) => item
                .select(selector)
                .next()
                .map(|byline| byline_authors(&element_text(byline)))
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        let year = first_text(item, &year_selectors).and_then(|text| find_year(&text));
        let abstract_text = first_text(item, &abstract_selectors).unwrap_or_default();
        let doi = first_text(item, &doi_selectors).map(|text| strip_doi_prefix(&text));
        let data_id = item
            .value()
            .attr("data-cid")
            .or_else(|| item.value().attr("data-did"))
            .map(ToString::to_string);

        items.push(ScrapedItem {
            title,
            link,
            authors,
            year,
            abstract_text,
            doi,
            data_id,
        });
    }

    Ok(items)
}

/// Authors from a byline such as "J Smith, A Doe - Nature, 2020 - nature.com"
#[must_use]
pub fn byline_authors(byline: &str) -> Vec<String> {
    let names = byline.split(" - ").next().unwrap_or_default();
    names
        .split(',')
        .map(|name| name.trim().trim_end_matches('…').trim())
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn strip_doi_prefix(text: &str) -> String {
    let text = text.trim();
    text.find("10.")
        .map_or_else(|| text.to_string(), |start| text[start..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <ul>
            <li class="result">
              <h3><a href="/doi/10.1000/abc">  Graph   Attention Networks </a></h3>
              <span class="who">Petar Velickovic</span><span class="who">Yoshua Bengio</span>
              <div class="date">Published: October 2018</div>
              <p class="summary">We present graph attention networks.</p>
              <a class="doi">https://doi.org/10.1000/abc</a>
            </li>
            <li class="result"><h3></h3></li>
          </ul>
        </body></html>
    "#;

    const FALLBACK_SETS: &[SelectorSet] = &[
        SelectorSet::new("missing", "div.nothing-here", &["h3"]),
        SelectorSet {
            name: "result-list",
            link: &[],
            authors: AuthorRule::Elements("span.who"),
            year: &["div.date"],
            abstract_text: &["p.summary"],
            doi: &["a.doi"],
            ..SelectorSet::new("result-list", "li.result", &["h3"])
        },
    ];

    #[test]
    fn test_first_matching_set_wins() {
        let base = Url::parse("https://dl.example.org/search").unwrap();
        let (name, items) = extract_first(PAGE, &base, FALLBACK_SETS).unwrap().unwrap();

        assert_eq!(name, "result-list");
        assert_eq!(items.len(), 1);

        let item = &items[0];
        assert_eq!(item.title, "Graph Attention Networks");
        assert_eq!(
            item.link.as_deref(),
            Some("https://dl.example.org/doi/10.1000/abc")
        );
        assert_eq!(item.authors, vec!["Petar Velickovic", "Yoshua Bengio"]);
        assert_eq!(item.year, Some(2018));
        assert_eq!(item.abstract_text, "We present graph attention networks.");
        assert_eq!(item.doi.as_deref(), Some("10.1000/abc"));
    }

    #[test]
    fn test_no_set_matches() {
        let base = Url::parse("https://dl.example.org/").unwrap();
        let sets = [SelectorSet::new("missing", "div.nothing-here", &["h3"])];
        assert!(extract_first(PAGE, &base, &sets).unwrap().is_none());
    }

    #[test]
    fn test_min_title_length_filters_items() {
        let html = r#"<div><a class="doc" href="/document/1">Home</a>
            <a class="doc" href="/document/2">A Survey of Graph Neural Networks</a></div>"#;
        let base = Url::parse("https://ieee.example.org/").unwrap();
        let sets = [SelectorSet {
            min_title_len: 11,
            ..SelectorSet::new("links", "a.doc", &[])
        }];

        let (_, items) = extract_first(html, &base, &sets).unwrap().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0].link.as_deref(),
            Some("https://ieee.example.org/document/2")
        );
    }

    #[test]
    fn test_byline_authors() {
        assert_eq!(
            byline_authors("TN Kipf, M Welling - arXiv preprint arXiv:1609.02907, 2016 - arxiv.org"),
            vec!["TN Kipf", "M Welling"]
        );
        assert!(byline_authors("").is_empty());
    }

    #[test]
    fn test_find_year() {
        assert_eq!(find_year("Nature, 2020 - nature.com"), Some(2020));
        assert_eq!(find_year("vol 1234, 1999"), Some(1999));
        assert_eq!(find_year("no year"), None);
    }
}
