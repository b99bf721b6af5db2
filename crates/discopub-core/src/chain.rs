//! Ordered list of PDF locators, stopping at the first hit.

use crate::Config;
use crate::fetcher::PageFetcher;
use crate::page::FetchedPage;
use crate::strategy::{
    CitationPdfMeta, DirectBinary, DownloadTypeAnchor, HrefPatternAnchor, PdfLocator, PdfSource,
    RedirectRescan, TitledPdfAnchor,
};

/// A strategy hit: which locator fired and what it found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub strategy: &'static str,
    pub source: PdfSource,
}

pub struct StrategyChain {
    strategies: Vec<Box<dyn PdfLocator>>,
}

impl StrategyChain {
    /// A chain running `strategies` in the given order.
    pub fn new(strategies: Vec<Box<dyn PdfLocator>>) -> Self {
        Self { strategies }
    }

    /// The standard publisher chain, most generic signal first and the
    /// network-bound rescan last.
    pub fn standard(config: &Config) -> Self {
        Self::new(vec![
            Box::new(CitationPdfMeta),
            Box::new(TitledPdfAnchor),
            Box::new(DownloadTypeAnchor),
            Box::new(HrefPatternAnchor::doi_pdf()),
            Box::new(HrefPatternAnchor::pmc_article(
                config.repository_base_url.clone(),
            )),
            Box::new(DirectBinary),
            Box::new(RedirectRescan),
        ])
    }

    /// Append a locator after the existing ones.
    pub fn push(&mut self, strategy: Box<dyn PdfLocator>) {
        self.strategies.push(strategy);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Run the strategies in order against `page`; the first one that finds
    /// something wins. `None` when nobody does.
    pub async fn locate(&self, page: &FetchedPage, fetcher: &PageFetcher) -> Option<Located> {
        for strategy in &self.strategies {
            if let Some(source) = strategy.locate(page, fetcher).await {
                let empty = match &source {
                    PdfSource::Url(url) => url.trim().is_empty(),
                    PdfSource::Inline(bytes) => bytes.is_empty(),
                };
                if empty {
                    continue;
                }
                tracing::debug!(strategy = strategy.name(), page = %page.final_url, "strategy matched");
                return Some(Located {
                    strategy: strategy.name(),
                    source,
                });
            }
        }
        None
    }
}

impl Default for StrategyChain {
    fn default() -> Self {
        Self::standard(&Config::default())
    }
}
