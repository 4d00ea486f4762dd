pub mod acm;
pub mod arxiv;
pub mod ieee;
pub mod scholar;
pub mod seed;
pub mod traits;
pub mod web_search;

pub use acm::{AcmHtmlStrategy, AcmJsonStrategy};
pub use arxiv::ArxivApiStrategy;
pub use ieee::{IeeeHtmlStrategy, IeeeRestStrategy};
pub use scholar::{ScholarHtmlStrategy, ScholarPagedStrategy};
pub use seed::SeedDatasetStrategy;
pub use traits::{EndpointFamily, SourceAdapter, SourceError, Strategy, StrategyContext};
pub use web_search::WebSearchStrategy;

use crate::client::fallback::FallbackChain;
use crate::client::SourceId;
use crate::config::Config;

/// Fallback chain for `source`, in the fixed strategy order
#[must_use]
pub fn chain_for(source: SourceId, config: &Config) -> FallbackChain {
    let endpoints = &config.endpoints;
    let limits = &config.limits;
    let api_key = config.web_search.api_key.clone();

    let strategies: Vec<Box<dyn Strategy>> = match source {
        SourceId::Arxiv => vec![Box::new(ArxivApiStrategy::new(&endpoints.arxiv))],
        SourceId::Scholar => vec![
            Box::new(ScholarPagedStrategy::new(&endpoints.scholar)),
            Box::new(ScholarHtmlStrategy::new(&endpoints.scholar)),
        ],
        SourceId::Ieee => vec![
            Box::new(IeeeRestStrategy::new(&endpoints.ieee, limits.ieee_rows)),
            Box::new(IeeeHtmlStrategy::new(&endpoints.ieee)),
            Box::new(WebSearchStrategy::ieee(
                &endpoints.web_search,
                api_key,
                limits.web_search_hits,
            )),
        ],
        SourceId::Acm => vec![
            Box::new(AcmHtmlStrategy::new(&endpoints.acm, limits.acm_page_size)),
            Box::new(AcmJsonStrategy::new(&endpoints.acm, limits.acm_json_page_size)),
            Box::new(WebSearchStrategy::acm(
                &endpoints.web_search,
                api_key,
                limits.web_search_hits,
            )),
            Box::new(SeedDatasetStrategy::new(SourceId::Acm, config.seed.clone())),
        ],
    };

    FallbackChain::new(source, strategies)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_order_per_source() {
        let config = Config::default();

        assert_eq!(
            chain_for(SourceId::Arxiv, &config).strategy_names(),
            vec!["arxiv_api"]
        );
        assert_eq!(
            chain_for(SourceId::Scholar, &config).strategy_names(),
            vec!["scholar_paged", "scholar_html"]
        );
        assert_eq!(
            chain_for(SourceId::Ieee, &config).strategy_names(),
            vec!["ieee_rest", "ieee_html", "web_search"]
        );
        assert_eq!(
            chain_for(SourceId::Acm, &config).strategy_names(),
            vec!["acm_html", "acm_json", "web_search", "seed_dataset"]
        );
    }
}
