//! Adaptive request spacing for the lookup endpoint.
//!
//! NCBI E-utilities allow a few requests per second without an API key.
//! Every lookup waits for a governor permit via `until_ready()`; on HTTP 429
//! the governor is swapped for a slower one, and the base rate comes back
//! after a quiet period.

use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Time without a 429 after which the base rate is restored.
const DECAY_AFTER: Duration = Duration::from_secs(60);

/// Largest slowdown factor applied after repeated 429s.
const MAX_FACTOR: u32 = 16;

/// Rate limiter shared by all workers, slowed down when the server pushes back.
pub struct AdaptiveLimiter {
    governor: ArcSwap<DirectLimiter>,
    base_period: Duration,
    /// 1 at the base rate, 2 at half of it, and so on.
    slowdown: AtomicU32,
    pushed_back_at: Mutex<Option<Instant>>,
}

fn quota_for(period: Duration) -> Quota {
    Quota::with_period(period).unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
}

fn governor_for(period: Duration) -> Arc<DirectLimiter> {
    Arc::new(DirectLimiter::direct(quota_for(period)))
}

impl AdaptiveLimiter {
    /// One request per `period`.
    pub fn new(period: Duration) -> Self {
        Self {
            governor: ArcSwap::from(governor_for(period)),
            base_period: period,
            slowdown: AtomicU32::new(1),
            pushed_back_at: Mutex::new(None),
        }
    }

    /// `n` requests per second; 0 is treated as 1.
    pub fn per_second(n: u32) -> Self {
        let ms = 1000 / u64::from(n.max(1));
        Self::new(Duration::from_millis(ms.max(1)))
    }

    /// Wait until a request may be sent.
    pub async fn acquire(&self) {
        self.restore_if_quiet();
        self.governor.load().until_ready().await;
    }

    /// Record an HTTP 429: double the slowdown (up to `MAX_FACTOR`).
    pub fn on_rate_limited(&self) {
        if let Ok(mut at) = self.pushed_back_at.lock() {
            *at = Some(Instant::now());
        }
        let previous = self
            .slowdown
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| {
                Some((f * 2).min(MAX_FACTOR))
            })
            .unwrap_or(MAX_FACTOR / 2);
        let factor = (previous * 2).min(MAX_FACTOR);
        if factor != previous {
            self.install(factor);
        }
    }

    pub fn current_factor(&self) -> u32 {
        self.slowdown.load(Ordering::SeqCst)
    }

    fn install(&self, factor: u32) {
        if let Some(period) = self.base_period.checked_mul(factor) {
            tracing::debug!(factor, period_ms = period.as_millis() as u64, "lookup rate changed");
            self.governor.store(governor_for(period));
        }
    }

    fn restore_if_quiet(&self) {
        let quiet = match self.pushed_back_at.lock() {
            Ok(at) => at.is_some_and(|t| t.elapsed() >= DECAY_AFTER),
            Err(_) => false,
        };
        if quiet && self.slowdown.swap(1, Ordering::SeqCst) > 1 {
            self.install(1);
        }
    }
}
