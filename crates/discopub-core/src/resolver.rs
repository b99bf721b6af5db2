//! Per-identifier pipeline: lookup → strategy chain → save.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::chain::StrategyChain;
use crate::fetcher::{FetchError, PageFetcher};
use crate::strategy::PdfSource;
use crate::{FetchAttempt, Pmid, ResolutionResult, UnfetchedReason};

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("download failed: {0}")]
    Download(#[from] FetchError),
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

pub struct ArticleResolver {
    fetcher: Arc<PageFetcher>,
    chain: Arc<StrategyChain>,
    output_dir: PathBuf,
}

impl ArticleResolver {
    pub fn new(
        fetcher: Arc<PageFetcher>,
        chain: Arc<StrategyChain>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            chain,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Resolve one identifier to a saved PDF, or say why it couldn't be.
    ///
    /// Never fails: every error is folded into an `Unfetched` result. A
    /// landing page that no strategy understands is not looked up again.
    pub async fn resolve(
        &self,
        pmid: Pmid,
        max_attempts: u32,
        on_attempt: &(dyn Fn(&FetchAttempt) + Send + Sync),
    ) -> ResolutionResult {
        let page = match self.fetcher.fetch(&pmid, max_attempts, on_attempt).await {
            Ok(page) => page,
            Err(err) => {
                tracing::warn!(pmid = %pmid, error = %err, "lookup failed");
                let reason = match err {
                    FetchError::Exhausted {
                        attempts,
                        last_error,
                    } => UnfetchedReason::ExhaustedRetries {
                        attempts,
                        last_error,
                    },
                    other => UnfetchedReason::ExhaustedRetries {
                        attempts: max_attempts.max(1),
                        last_error: other.to_string(),
                    },
                };
                return ResolutionResult::unfetched(pmid, reason);
            }
        };

        let Some(located) = self.chain.locate(&page, &self.fetcher).await else {
            tracing::info!(pmid = %pmid, page = %page.final_url, "no strategy located a PDF");
            return ResolutionResult::unfetched(pmid, UnfetchedReason::NoStrategyMatch);
        };

        match self.save(&pmid, located.source).await {
            Ok(path) => {
                tracing::info!(pmid = %pmid, strategy = located.strategy, path = %path.display(), "saved");
                ResolutionResult::saved(pmid, path, located.strategy)
            }
            Err(err) => {
                tracing::warn!(pmid = %pmid, strategy = located.strategy, error = %err, "save failed");
                ResolutionResult::unfetched(pmid, UnfetchedReason::Save(err.to_string()))
            }
        }
    }

    /// Write the PDF to `{output_dir}/{pmid}.pdf`, downloading it first
    /// unless the bytes are already in hand.
    pub async fn save(&self, pmid: &Pmid, source: PdfSource) -> Result<PathBuf, SaveError> {
        let bytes = match source {
            PdfSource::Url(url) => self.fetcher.download(&url).await?,
            PdfSource::Inline(bytes) => bytes,
        };
        let path = self.output_dir.join(pmid.file_name());
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }
}
