use proptest::prelude::*;
use research_harvest::client::dedup_key;
use research_harvest::{dedupe, Paper, SourceId};
use std::collections::HashSet;

fn source_strategy() -> impl Strategy<Value = SourceId> {
    prop::sample::select(SourceId::PRIORITY.to_vec())
}

fn paper_strategy() -> impl Strategy<Value = Paper> {
    // Small alphabet so that case and whitespace collisions are frequent
    (r"[ aAbBcC]{0,6}", source_strategy()).prop_map(|(title, source)| Paper::new(title, source))
}

fn papers_strategy() -> impl Strategy<Value = Vec<Paper>> {
    prop::collection::vec(paper_strategy(), 0..40)
}

/// Property-based tests for deduplication
mod dedup_props {
    use super::*;

    proptest! {
        #[test]
        fn test_dedupe_idempotent(papers in papers_strategy()) {
            let once = dedupe(papers);
            let twice = dedupe(once.clone());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn test_dedupe_never_grows(papers in papers_strategy()) {
            let len = papers.len();
            prop_assert!(dedupe(papers).len() <= len);
        }

        #[test]
        fn test_dedupe_keys_unique_and_non_empty(papers in papers_strategy()) {
            let unique = dedupe(papers);
            let mut keys = HashSet::new();
            for paper in &unique {
                let key = dedup_key(&paper.title);
                prop_assert!(!key.is_empty());
                prop_assert!(keys.insert(key), "duplicate key for {:?}", paper.title);
            }
        }

        #[test]
        fn test_dedupe_keeps_first_occurrence(papers in papers_strategy()) {
            let unique = dedupe(papers.clone());
            for kept in &unique {
                let key = dedup_key(&kept.title);
                let first = papers
                    .iter()
                    .find(|p| dedup_key(&p.title) == key)
                    .unwrap();
                prop_assert_eq!(kept, first);
            }
        }

        #[test]
        fn test_dedupe_preserves_relative_order(papers in papers_strategy()) {
            let unique = dedupe(papers.clone());
            let positions: Vec<usize> = unique
                .iter()
                .map(|kept| papers.iter().position(|p| p == kept).unwrap())
                .collect();
            prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
        }

        #[test]
        fn test_dedup_key_normalized(title in "[ -~]{0,30}") {
            let key = dedup_key(&title);
            prop_assert_eq!(dedup_key(&key), key.clone());
            prop_assert_eq!(key.trim(), key.as_str());
        }
    }
}

/// Cross-source priority property
mod priority_props {
    use super::*;

    proptest! {
        #[test]
        fn test_higher_priority_copy_retained(title in "[a-z]{1,12}", upper in any::<bool>()) {
            let other = if upper { title.to_uppercase() } else { format!("  {title} ") };
            let mut papers = vec![Paper::new(title.clone(), SourceId::Arxiv)];
            papers.push(Paper::new(other, SourceId::Acm));

            let unique = dedupe(papers);
            prop_assert_eq!(unique.len(), 1);
            prop_assert_eq!(unique[0].source, SourceId::Arxiv);
            prop_assert_eq!(&unique[0].title, &title);
        }
    }
}
