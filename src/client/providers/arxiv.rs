use super::traits::{EndpointFamily, SourceError, Strategy, StrategyContext};
use crate::client::html::collapse_whitespace;
use crate::client::{Paper, SourceId};
use async_trait::async_trait;
use chrono::{DateTime, Datelike};
use tracing::{debug, info};

/// Year of an Atom timestamp, falling back to its leading digits
fn published_year(published: &str) -> Option<u32> {
    let published = published.trim();
    DateTime::parse_from_rfc3339(published)
        .ok()
        .and_then(|date| u32::try_from(date.year()).ok())
        .or_else(|| published.get(..4).and_then(|year| year.parse().ok()))
}

/// Query strategy against the arXiv Atom API
pub struct ArxivApiStrategy {
    base_url: String,
}

impl ArxivApiStrategy {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Strategy for ArxivApiStrategy {
    fn name(&self) -> &'static str {
        "arxiv_api"
    }

    fn family(&self) -> EndpointFamily {
        EndpointFamily::ArxivApi
    }

    async fn run(&self, ctx: &mut StrategyContext) -> Result<Vec<Paper>, SourceError> {
        info!("Searching arXiv for: {} (max {})", ctx.topic, ctx.limit);

        let search_query = format!("all:{}", ctx.topic);
        let max_results = ctx.limit.to_string();
        let body = ctx
            .session
            .get_text(
                self.family(),
                &self.base_url,
                &[
                    ("search_query", search_query.as_str()),
                    ("start", "0"),
                    ("max_results", max_results.as_str()),
                    ("sortBy", "relevance"),
                    ("sortOrder", "descending"),
                ],
            )
            .await?;

        let papers = parse_feed(&body)?;
        for paper in &papers {
            ctx.sink.push(paper.clone());
        }

        info!("arXiv search completed: {} papers found", papers.len());
        Ok(papers)
    }
}

/// Parse an arXiv Atom feed
pub fn parse_feed(xml: &str) -> Result<Vec<Paper>, SourceError> {
    use roxmltree::Document;

    let doc = Document::parse(xml)
        .map_err(|e| SourceError::Parse(format!("Failed to parse XML: {e}")))?;

    let mut papers = Vec::new();

    for entry in doc.descendants().filter(|n| n.has_tag_name("entry")) {
        let mut paper = Paper::new(String::new(), SourceId::Arxiv);
        let mut pdf_url = None;

        for child in entry.children().filter(roxmltree::Node::is_element) {
            match child.tag_name().name() {
                "id" => {
                    if let Some(id) = child.text() {
                        paper.external_id = id.trim().to_string();
                    }
                }
                "title" => {
                    if let Some(title) = child.text() {
                        paper.title = collapse_whitespace(title);
                    }
                }
                "summary" => {
                    if let Some(summary) = child.text() {
                        paper.abstract_text = collapse_whitespace(summary);
                    }
                }
                "published" => {
                    paper.year = child.text().and_then(published_year);
                }
                "author" => {
                    for name_elem in child.descendants().filter(|n| n.has_tag_name("name")) {
                        if let Some(author_name) = name_elem.text() {
                            paper.authors.push(author_name.trim().to_string());
                        }
                    }
                }
                "link" => {
                    let is_pdf = child.attribute("title") == Some("pdf")
                        || child.attribute("type") == Some("application/pdf");
                    if is_pdf {
                        pdf_url = child.attribute("href").map(ToString::to_string);
                    }
                }
                _ => {}
            }
        }

        paper.url = pdf_url.unwrap_or_else(|| paper.external_id.clone());
        if paper.is_valid() {
            papers.push(paper);
        }
    }

    debug!("Parsed {} papers from arXiv response", papers.len());
    Ok(papers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query</title>
  <entry>
    <id>http://arxiv.org/abs/1609.02907v4</id>
    <published>2016-09-09T19:48:21Z</published>
    <title>Semi-Supervised Classification with
      Graph Convolutional Networks</title>
    <summary>  We present a scalable approach for semi-supervised learning
      on graph-structured data. </summary>
    <author><name>Thomas N. Kipf</name></author>
    <author><name>Max Welling</name></author>
    <link href="http://arxiv.org/abs/1609.02907v4" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/1609.02907v4" rel="related" type="application/pdf"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/1710.10903v3</id>
    <published>2017-10-30T15:12:46Z</published>
    <title>Graph Attention Networks</title>
    <summary>We present graph attention networks.</summary>
    <author><name>Petar Velickovic</name></author>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/0000.00000</id>
    <title>   </title>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed() {
        let papers = parse_feed(FEED).unwrap();
        assert_eq!(papers.len(), 2);

        let gcn = &papers[0];
        assert_eq!(
            gcn.title,
            "Semi-Supervised Classification with Graph Convolutional Networks"
        );
        assert_eq!(gcn.authors, vec!["Thomas N. Kipf", "Max Welling"]);
        assert_eq!(gcn.year, Some(2016));
        assert_eq!(gcn.url, "http://arxiv.org/pdf/1609.02907v4");
        assert_eq!(gcn.external_id, "http://arxiv.org/abs/1609.02907v4");
        assert!(gcn.abstract_text.starts_with("We present a scalable approach"));
        assert_eq!(gcn.source, SourceId::Arxiv);

        // No pdf link: fall back to the entry id
        assert_eq!(papers[1].url, "http://arxiv.org/abs/1710.10903v3");
    }

    #[test]
    fn test_invalid_xml_is_parse_error() {
        assert!(matches!(
            parse_feed("<feed><entry>"),
            Err(SourceError::Parse(_))
        ));
    }

    #[test]
    fn test_published_year() {
        assert_eq!(published_year("2017-06-12T17:57:34Z"), Some(2017));
        assert_eq!(published_year(" 2019-01-01 "), Some(2019));
        assert_eq!(published_year("n/a"), None);
    }
}
