use crate::client::Paper;
use std::collections::HashSet;

/// Key two papers are considered duplicates under
#[must_use]
pub fn dedup_key(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Drop untitled papers and later duplicates, keeping first occurrences in order
#[must_use]
pub fn dedupe(papers: Vec<Paper>) -> Vec<Paper> {
    let mut seen = HashSet::with_capacity(papers.len());
    papers
        .into_iter()
        .filter(|paper| {
            let key = dedup_key(&paper.title);
            !key.is_empty() && seen.insert(key)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SourceId;

    #[test]
    fn test_first_occurrence_wins() {
        let papers = vec![
            Paper::new("Graph Neural Networks: A Review", SourceId::Arxiv),
            Paper::new("  graph neural networks: a review ", SourceId::Scholar),
            Paper::new("", SourceId::Ieee),
            Paper::new("   ", SourceId::Acm),
            Paper::new("Semi-Supervised Classification with GCNs", SourceId::Acm),
        ];

        let unique = dedupe(papers);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].source, SourceId::Arxiv);
        assert_eq!(unique[1].source, SourceId::Acm);
    }

    #[test]
    fn test_key_is_trimmed_lowercase() {
        assert_eq!(dedup_key("  Attention Is All You Need\n"), "attention is all you need");
    }
}
