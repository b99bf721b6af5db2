//! HTTP access: the retried lookup GET, single GETs for strategies, and PDF
//! downloads. Every request carries the configured browser User-Agent.

use std::time::Duration;

use reqwest::{StatusCode, Url};
use thiserror::Error;

use crate::page::FetchedPage;
use crate::rate_limit::AdaptiveLimiter;
use crate::{AttemptOutcome, Config, CoreError, FetchAttempt, Pmid};

/// Longest pause between two lookup attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(8);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Transport-level failure: DNS, refused, reset, timeout, truncated body.
    #[error("connection error: {0}")]
    Connection(String),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("gave up after {attempts} attempts (last error: {last_error})")]
    Exhausted { attempts: u32, last_error: String },
}

impl FetchError {
    fn to_outcome(&self) -> AttemptOutcome {
        match self {
            FetchError::HttpStatus(status) => AttemptOutcome::HttpError(*status),
            other => AttemptOutcome::ConnectionError(other.to_string()),
        }
    }
}

pub struct PageFetcher {
    client: reqwest::Client,
    lookup_url: Url,
    timeout: Duration,
    retry_backoff: Duration,
    limiter: Option<AdaptiveLimiter>,
}

impl std::fmt::Debug for PageFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageFetcher")
            .field("lookup_url", &self.lookup_url.as_str())
            .field("timeout", &self.timeout)
            .field("retry_backoff", &self.retry_backoff)
            .field("rate_limited", &self.limiter.is_some())
            .finish()
    }
}

impl PageFetcher {
    pub fn new(config: &Config) -> Result<Self, CoreError> {
        let lookup_url = Url::parse(&config.lookup_url)
            .map_err(|e| CoreError::Config(format!("lookup_url {:?}: {}", config.lookup_url, e)))?;
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;
        let limiter = (config.lookup_requests_per_second > 0)
            .then(|| AdaptiveLimiter::per_second(config.lookup_requests_per_second));

        Ok(Self {
            client,
            lookup_url,
            timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            limiter,
        })
    }

    /// Lookup URL for `pmid`: `...elink.fcgi?dbfrom=pubmed&id={pmid}&retmode=ref&cmd=prlinks`.
    pub fn lookup_url_for(&self, pmid: &Pmid) -> Url {
        let mut url = self.lookup_url.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("dbfrom", "pubmed")
            .append_pair("id", pmid.as_str())
            .append_pair("retmode", "ref")
            .append_pair("cmd", "prlinks");
        url
    }

    /// Fetch the landing page for `pmid`, retrying up to `max_attempts` times.
    ///
    /// Non-200 responses and connection failures both count as failed
    /// attempts. `on_attempt` sees every attempt, including the successful
    /// one. Once a 200 arrives it is returned as-is; whatever happens to it
    /// afterwards never triggers another lookup.
    pub async fn fetch(
        &self,
        pmid: &Pmid,
        max_attempts: u32,
        on_attempt: &(dyn Fn(&FetchAttempt) + Send + Sync),
    ) -> Result<FetchedPage, FetchError> {
        let max_attempts = max_attempts.max(1);
        let url = self.lookup_url_for(pmid);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = self.backoff_for(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            if let Some(ref limiter) = self.limiter {
                limiter.acquire().await;
            }

            match self.get_page(url.clone()).await {
                Ok(page) => {
                    tracing::debug!(pmid = %pmid, attempt, final_url = %page.final_url, "landing page fetched");
                    on_attempt(&FetchAttempt {
                        pmid: pmid.clone(),
                        attempt,
                        max_attempts,
                        outcome: AttemptOutcome::Success {
                            final_url: page.final_url.to_string(),
                        },
                    });
                    return Ok(page);
                }
                Err(err) => {
                    if err == FetchError::HttpStatus(429)
                        && let Some(ref limiter) = self.limiter
                    {
                        limiter.on_rate_limited();
                    }
                    tracing::debug!(pmid = %pmid, attempt, max_attempts, error = %err, "lookup attempt failed");
                    on_attempt(&FetchAttempt {
                        pmid: pmid.clone(),
                        attempt,
                        max_attempts,
                        outcome: err.to_outcome(),
                    });
                    last_error = err.to_string();
                }
            }
        }

        Err(FetchError::Exhausted {
            attempts: max_attempts,
            last_error,
        })
    }

    /// One GET. Anything other than HTTP 200 is an error. The body is read
    /// to the end before returning.
    pub async fn get_page(&self, url: Url) -> Result<FetchedPage, FetchError> {
        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FetchError::Connection(e.to_string()))?;

        if resp.status() != StatusCode::OK {
            return Err(FetchError::HttpStatus(resp.status().as_u16()));
        }

        let final_url = resp.url().clone();
        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchError::Connection(e.to_string()))?;
        Ok(FetchedPage::new(final_url, body.to_vec()))
    }

    /// Download the bytes behind `url` with a single GET.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FetchError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(FetchError::HttpStatus(resp.status().as_u16()));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchError::Connection(e.to_string()))?;
        Ok(body.to_vec())
    }

    /// Delay before `attempt` (2-based): exponential from the configured
    /// base, capped, with up to 25% jitter.
    fn backoff_for(&self, attempt: u32) -> Duration {
        if self.retry_backoff.is_zero() {
            return Duration::ZERO;
        }
        let exp = attempt.saturating_sub(2).min(16);
        let delay = self
            .retry_backoff
            .saturating_mul(1u32 << exp)
            .min(MAX_BACKOFF);
        let jitter_ms = delay.as_millis() as u64 / 4;
        delay + Duration::from_millis(fastrand::u64(0..=jitter_ms))
    }
}
