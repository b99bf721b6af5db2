//! Batch runner: a fixed pool of resolver workers fed from one queue.
//!
//! Each identifier becomes a [`ResolveJob`] carrying a oneshot sender. The
//! runner awaits the receivers in submission order, so the report follows
//! input order no matter which worker finishes first.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::chain::StrategyChain;
use crate::fetcher::PageFetcher;
use crate::input::normalize_identifiers;
use crate::resolver::ArticleResolver;
use crate::{
    BatchReport, Config, CoreError, FetchAttempt, Pmid, ProgressEvent, ResolutionResult,
    UnfetchedReason, archive,
};

/// A submitted job, or a repeat of the identifier at an earlier position.
enum Pending {
    Job(Pmid, oneshot::Receiver<ResolutionResult>),
    Repeat(usize),
}

/// One identifier queued for a worker.
pub struct ResolveJob {
    pub pmid: Pmid,
    pub index: usize,
    pub total: usize,
    pub max_attempts: u32,
    pub progress: Arc<dyn Fn(ProgressEvent) + Send + Sync>,
    pub result_tx: oneshot::Sender<ResolutionResult>,
}

/// `num_workers` tasks pulling jobs off a shared queue.
pub struct ResolverPool {
    job_tx: async_channel::Sender<ResolveJob>,
    pool_handle: JoinHandle<()>,
}

impl ResolverPool {
    pub fn new(
        resolver: Arc<ArticleResolver>,
        cancel: CancellationToken,
        num_workers: usize,
    ) -> Self {
        let (job_tx, job_rx) = async_channel::unbounded::<ResolveJob>();

        let pool_handle = tokio::spawn(async move {
            let mut handles = Vec::with_capacity(num_workers.max(1));
            for _ in 0..num_workers.max(1) {
                handles.push(tokio::spawn(worker_loop(
                    job_rx.clone(),
                    resolver.clone(),
                    cancel.clone(),
                )));
            }
            drop(job_rx);

            // Workers exit once the queue is closed and drained.
            for h in handles {
                let _ = h.await;
            }
        });

        Self {
            job_tx,
            pool_handle,
        }
    }

    pub async fn submit(&self, job: ResolveJob) {
        let _ = self.job_tx.send(job).await;
    }

    /// Close the queue and wait for every worker to finish.
    pub async fn shutdown(self) {
        self.job_tx.close();
        let _ = self.pool_handle.await;
    }
}

async fn worker_loop(
    job_rx: async_channel::Receiver<ResolveJob>,
    resolver: Arc<ArticleResolver>,
    cancel: CancellationToken,
) {
    while let Ok(job) = job_rx.recv().await {
        let ResolveJob {
            pmid,
            index,
            total,
            max_attempts,
            progress,
            result_tx,
        } = job;

        // Once cancelled, the rest of the queue is drained without any requests.
        let result = if cancel.is_cancelled() {
            ResolutionResult::unfetched(pmid, UnfetchedReason::Cancelled)
        } else {
            progress(ProgressEvent::Resolving {
                index,
                total,
                pmid: pmid.clone(),
            });
            let on_attempt = |attempt: &FetchAttempt| {
                progress(ProgressEvent::Attempt {
                    index,
                    total,
                    attempt: attempt.clone(),
                })
            };
            resolver.resolve(pmid, max_attempts, &on_attempt).await
        };

        progress(ProgressEvent::Result {
            index,
            total,
            result: Box::new(result.clone()),
        });
        let _ = result_tx.send(result);
    }
}

/// Runs whole batches into one output directory.
pub struct BatchRunner {
    resolver: Arc<ArticleResolver>,
    num_workers: usize,
}

impl BatchRunner {
    /// A runner with the standard strategy chain, writing into `output_dir`.
    pub fn new(config: &Config, output_dir: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let fetcher = Arc::new(PageFetcher::new(config)?);
        let chain = Arc::new(StrategyChain::standard(config));
        let resolver = Arc::new(ArticleResolver::new(fetcher, chain, output_dir));
        Ok(Self::from_resolver(resolver, config.num_workers))
    }

    pub fn from_resolver(resolver: Arc<ArticleResolver>, num_workers: usize) -> Self {
        Self {
            resolver,
            num_workers: num_workers.max(1),
        }
    }

    pub fn output_dir(&self) -> &Path {
        self.resolver.output_dir()
    }

    /// Resolve every identifier, write the unfetched manifest if anything
    /// failed, and return the report.
    ///
    /// An identifier given more than once is resolved once and reported at
    /// each of its positions. A manifest that cannot be written is logged and
    /// the report is still returned.
    ///
    /// Blank identifiers are dropped first; if none remain the batch is
    /// rejected with [`CoreError::EmptyBatch`]. Every remaining identifier
    /// lands in exactly one of `saved` or `unfetched`, including the ones
    /// skipped after `cancel` fires.
    pub async fn run<I, S>(
        &self,
        identifiers: I,
        max_attempts: u32,
        progress: Arc<dyn Fn(ProgressEvent) + Send + Sync>,
        cancel: CancellationToken,
    ) -> Result<BatchReport, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pmids = normalize_identifiers(identifiers);
        if pmids.is_empty() {
            return Err(CoreError::EmptyBatch);
        }
        let total = pmids.len();
        let max_attempts = max_attempts.max(1);

        tokio::fs::create_dir_all(self.output_dir()).await?;
        tracing::info!(
            total,
            max_attempts,
            workers = self.num_workers,
            dir = %self.output_dir().display(),
            "starting batch"
        );

        // Repeated identifiers are resolved once; later positions reuse the
        // first position's result.
        let pool = ResolverPool::new(self.resolver.clone(), cancel, self.num_workers);
        let mut first_index: HashMap<Pmid, usize> = HashMap::with_capacity(total);
        let mut pending = Vec::with_capacity(total);
        for (index, pmid) in pmids.into_iter().enumerate() {
            if let Some(&first) = first_index.get(&pmid) {
                pending.push(Pending::Repeat(first));
                continue;
            }
            first_index.insert(pmid.clone(), index);
            let (result_tx, result_rx) = oneshot::channel();
            pending.push(Pending::Job(pmid.clone(), result_rx));
            pool.submit(ResolveJob {
                pmid,
                index,
                total,
                max_attempts,
                progress: progress.clone(),
                result_tx,
            })
            .await;
        }
        if first_index.len() < total {
            tracing::debug!(
                unique = first_index.len(),
                total,
                "repeated identifiers resolved once"
            );
        }

        let mut results: Vec<ResolutionResult> = Vec::with_capacity(total);
        for (index, slot) in pending.into_iter().enumerate() {
            let result = match slot {
                Pending::Job(pmid, rx) => match rx.await {
                    Ok(result) => result,
                    Err(_) => {
                        // Worker went away without answering.
                        let result = ResolutionResult::unfetched(pmid, UnfetchedReason::Cancelled);
                        progress(ProgressEvent::Result {
                            index,
                            total,
                            result: Box::new(result.clone()),
                        });
                        result
                    }
                },
                Pending::Repeat(first) => {
                    let result = results[first].clone();
                    progress(ProgressEvent::Result {
                        index,
                        total,
                        result: Box::new(result.clone()),
                    });
                    result
                }
            };
            results.push(result);
        }
        pool.shutdown().await;

        let report = BatchReport::from_results(results);
        // Saved files stay valid without the manifest.
        match archive::write_manifest(self.output_dir(), &report) {
            Ok(Some(path)) => {
                tracing::info!(path = %path.display(), count = report.unfetched.len(), "wrote unfetched manifest");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, dir = %self.output_dir().display(), "failed to write unfetched manifest");
            }
        }

        progress(ProgressEvent::Finished {
            saved: report.saved.len(),
            unfetched: report.unfetched.len(),
        });
        Ok(report)
    }
}
