use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod archive;
pub mod batch;
pub mod chain;
pub mod config_file;
pub mod fetcher;
pub mod input;
pub mod page;
pub mod rate_limit;
pub mod resolver;
pub mod strategy;

// Re-export for convenience
pub use batch::BatchRunner;
pub use chain::{Located, StrategyChain};
pub use fetcher::{FetchError, PageFetcher};
pub use input::{normalize_identifiers, parse_identifier_text};
pub use page::{FetchedPage, PageDocument};
pub use resolver::ArticleResolver;
pub use strategy::{PdfLocator, PdfSource};

/// NCBI E-utilities link-resolution endpoint. `retmode=ref&cmd=prlinks`
/// makes it answer with a redirect to the publisher's landing page.
pub const DEFAULT_LOOKUP_URL: &str = "http://eutils.ncbi.nlm.nih.gov/entrez/eutils/elink.fcgi";

/// Host that PubMed Central article links are relative to.
pub const DEFAULT_REPOSITORY_BASE_URL: &str = "https://www.ncbi.nlm.nih.gov";

/// Desktop browser User-Agent. Several publishers refuse anything else.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/56.0.2924.87 Safari/537.36";

/// File listing the identifiers that could not be fetched, one per line.
pub const MANIFEST_FILE_NAME: &str = "unfetched_pmids.tsv";

/// Default stem of the results archive (`{name}.zip`).
pub const DEFAULT_RESULTS_NAME: &str = "pubmed_down_results";

/// A PubMed identifier. Trimmed and non-empty; the format is not checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pmid(String);

impl Pmid {
    /// Trim `raw` and wrap it. Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the file a saved PDF is written to (`{pmid}.pdf`).
    ///
    /// Anything other than ASCII alphanumerics and `-_.~` is percent-encoded,
    /// so an identifier can never address a file outside the output
    /// directory and two distinct identifiers never share a file.
    pub fn file_name(&self) -> String {
        format!("{}.pdf", urlencoding::encode(&self.0))
    }
}

impl std::fmt::Display for Pmid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of one GET against the lookup endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// HTTP 200; `final_url` is the landing page after redirects.
    Success { final_url: String },
    ConnectionError(String),
    HttpError(u16),
}

/// One lookup attempt for one identifier. Only ever reported, never stored.
#[derive(Debug, Clone)]
pub struct FetchAttempt {
    pub pmid: Pmid,
    /// 1-based.
    pub attempt: u32,
    pub max_attempts: u32,
    pub outcome: AttemptOutcome,
}

/// Why an identifier ended up unfetched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnfetchedReason {
    #[error("gave up after {attempts} attempts (last error: {last_error})")]
    ExhaustedRetries { attempts: u32, last_error: String },
    #[error("no strategy located a PDF on the landing page")]
    NoStrategyMatch,
    #[error("failed to save PDF: {0}")]
    Save(String),
    #[error("batch cancelled before this identifier was processed")]
    Cancelled,
}

/// Terminal state of one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionStatus {
    Saved {
        path: PathBuf,
        /// Name of the strategy that located the PDF.
        strategy: String,
    },
    Unfetched(UnfetchedReason),
}

/// Result of resolving a single identifier.
#[derive(Debug, Clone)]
pub struct ResolutionResult {
    pub pmid: Pmid,
    pub status: ResolutionStatus,
}

impl ResolutionResult {
    pub fn saved(pmid: Pmid, path: PathBuf, strategy: impl Into<String>) -> Self {
        Self {
            pmid,
            status: ResolutionStatus::Saved {
                path,
                strategy: strategy.into(),
            },
        }
    }

    pub fn unfetched(pmid: Pmid, reason: UnfetchedReason) -> Self {
        Self {
            pmid,
            status: ResolutionStatus::Unfetched(reason),
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self.status, ResolutionStatus::Saved { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArticle {
    pub pmid: Pmid,
    /// File name relative to the batch output root.
    pub file_name: String,
    pub strategy: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnfetchedArticle {
    pub pmid: Pmid,
    pub reason: UnfetchedReason,
}

/// Summary of one batch. Both lists follow input order.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub saved: Vec<SavedArticle>,
    pub unfetched: Vec<UnfetchedArticle>,
}

impl BatchReport {
    /// Fold per-identifier results into a report, keeping their order.
    pub fn from_results(results: impl IntoIterator<Item = ResolutionResult>) -> Self {
        let mut report = Self::default();
        for result in results {
            match result.status {
                ResolutionStatus::Saved { path, strategy } => {
                    let file_name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| result.pmid.file_name());
                    report.saved.push(SavedArticle {
                        pmid: result.pmid,
                        file_name,
                        strategy,
                    });
                }
                ResolutionStatus::Unfetched(reason) => {
                    report.unfetched.push(UnfetchedArticle {
                        pmid: result.pmid,
                        reason,
                    });
                }
            }
        }
        report
    }

    pub fn saved_ids(&self) -> BTreeSet<Pmid> {
        self.saved.iter().map(|s| s.pmid.clone()).collect()
    }

    pub fn unfetched_ids(&self) -> Vec<Pmid> {
        self.unfetched.iter().map(|u| u.pmid.clone()).collect()
    }

    pub fn total(&self) -> usize {
        self.saved.len() + self.unfetched.len()
    }
}

/// Progress events emitted while a batch runs.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Resolving {
        index: usize,
        total: usize,
        pmid: Pmid,
    },
    Attempt {
        index: usize,
        total: usize,
        attempt: FetchAttempt,
    },
    Result {
        index: usize,
        total: usize,
        result: Box<ResolutionResult>,
    },
    Finished {
        saved: usize,
        unfetched: usize,
    },
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("no identifiers supplied")]
    EmptyBatch,
}

/// Configuration for the fetch pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Link-resolution endpoint; the PMID query is appended to it.
    pub lookup_url: String,
    /// Host prefixed to PubMed Central `/pmc/articles` links.
    pub repository_base_url: String,
    pub user_agent: String,
    /// Lookup attempts per identifier. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Concurrent identifiers, and so the cap on concurrent outbound requests.
    pub num_workers: usize,
    pub request_timeout_secs: u64,
    /// First delay between lookup attempts, doubled per attempt. 0 disables.
    pub retry_backoff_ms: u64,
    /// Spacing of lookup requests across all workers. 0 disables.
    pub lookup_requests_per_second: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lookup_url: DEFAULT_LOOKUP_URL.to_string(),
            repository_base_url: DEFAULT_REPOSITORY_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_attempts: 3,
            num_workers: 4,
            request_timeout_secs: 30,
            retry_backoff_ms: 500,
            lookup_requests_per_second: 3,
        }
    }
}

/// Everything a caller gets back from [`submit_batch`].
#[derive(Debug)]
pub struct BatchOutcome {
    pub report: BatchReport,
    /// Zip of the saved PDFs plus the unfetched manifest.
    pub archive: Vec<u8>,
}

/// Fetch PDFs for `identifiers` and package them as a zip archive.
///
/// Identifiers are trimmed and blanks dropped. Work happens in a temporary
/// directory that is removed once the archive is built. Per-identifier
/// outcomes are delivered through `progress`; the batch can be stopped
/// between identifiers via `cancel`.
pub async fn submit_batch<I, S>(
    identifiers: I,
    max_attempts: u32,
    config: Config,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> Result<BatchOutcome, CoreError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let workdir = tempfile::TempDir::new()?;
    let runner = BatchRunner::new(&config, workdir.path())?;
    let report = runner
        .run(identifiers, max_attempts, Arc::new(progress), cancel)
        .await?;
    let archive = archive::package_directory(workdir.path())?;
    tracing::info!(
        saved = report.saved.len(),
        unfetched = report.unfetched.len(),
        archive_bytes = archive.len(),
        "batch packaged"
    );
    Ok(BatchOutcome { report, archive })
}
