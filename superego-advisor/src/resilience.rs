//! Resilience wrapper: deadline, retry, breaker, cache, bounded fan-out.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use superego_policy::{AdvisorOutcome, SampleEvaluator, SecurityRule};
use superego_primitives::{AdvisorVerdict, SuperegoError, ToolRequest};
use superego_prompts::EvaluationPrompt;
use tokio::sync::{Semaphore, watch};
use tracing::debug;

use crate::breaker::{BreakerSnapshot, CircuitBreaker};
use crate::cache::VerdictCache;
use crate::client::{AdvisorClient, AdvisorError, AdvisorMetadata, AdvisorResult};

/// Concern shown to the advisor when a sample rule states none.
const FALLBACK_CONCERN: &str = "flagged for review by security policy";

/// Tunables for [`ResilientAdvisor`].
#[derive(Clone, Copy, Debug)]
pub struct ResilienceConfig {
    timeout: Duration,
    retries: u32,
    cache_capacity: NonZeroUsize,
    cache_ttl: Duration,
    open_threshold: u32,
    cooldown: Duration,
    max_concurrency: NonZeroUsize,
    max_queue: usize,
}

impl ResilienceConfig {
    /// Sets the per-call deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the number of retries after the initial attempt.
    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the verdict cache bound.
    #[must_use]
    pub const fn with_cache_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Sets the verdict cache entry TTL.
    #[must_use]
    pub const fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Sets the consecutive-failure threshold that opens the breaker.
    #[must_use]
    pub const fn with_open_threshold(mut self, threshold: u32) -> Self {
        self.open_threshold = threshold;
        self
    }

    /// Sets how long the breaker stays open before a half-open probe.
    #[must_use]
    pub const fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Sets the cap on concurrent upstream calls.
    #[must_use]
    pub const fn with_max_concurrency(mut self, limit: NonZeroUsize) -> Self {
        self.max_concurrency = limit;
        self
    }

    /// Sets the number of callers allowed to queue for a call slot.
    #[must_use]
    pub const fn with_max_queue(mut self, limit: usize) -> Self {
        self.max_queue = limit;
        self
    }

    /// Returns the per-call deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retries: 2,
            cache_capacity: NonZeroUsize::new(1024).expect("non-zero"),
            cache_ttl: Duration::from_secs(300),
            open_threshold: 3,
            cooldown: Duration::from_secs(30),
            max_concurrency: NonZeroUsize::new(32).expect("non-zero"),
            max_queue: 128,
        }
    }
}

/// Wraps any [`AdvisorClient`] with the full failure-containment policy.
///
/// Call path per evaluation: cache lookup, single-flight coalescing of
/// concurrent misses, fan-out admission (bounded queue), circuit breaker,
/// then the deadline-bearing upstream call with retries on transport
/// errors. Caller cancellation drops straight through; guards restore the
/// queue counter and the in-flight map.
pub struct ResilientAdvisor {
    inner: Arc<dyn AdvisorClient>,
    cache: VerdictCache,
    breaker: CircuitBreaker,
    slots: Semaphore,
    waiting: AtomicUsize,
    inflight: Mutex<HashMap<String, watch::Receiver<()>>>,
    config: ResilienceConfig,
}

impl ResilientAdvisor {
    /// Wraps `inner` with the supplied policy.
    #[must_use]
    pub fn new(inner: Arc<dyn AdvisorClient>, config: ResilienceConfig) -> Self {
        Self {
            inner,
            cache: VerdictCache::new(config.cache_capacity, config.cache_ttl),
            breaker: CircuitBreaker::new(config.open_threshold, config.cooldown),
            slots: Semaphore::new(config.max_concurrency.get()),
            waiting: AtomicUsize::new(0),
            inflight: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Returns the wrapped advisor's identity.
    #[must_use]
    pub fn metadata(&self) -> &AdvisorMetadata {
        self.inner.metadata()
    }

    /// Returns the breaker's current view for health reporting.
    #[must_use]
    pub fn breaker_snapshot(&self) -> BreakerSnapshot {
        self.breaker.snapshot()
    }

    /// Returns the number of cached verdicts.
    #[must_use]
    pub fn cached_verdicts(&self) -> usize {
        self.cache.len()
    }

    /// Produces a verdict for the prompt, consulting the cache first.
    ///
    /// Concurrent calls that share a cache key coalesce into one upstream
    /// call; the rest wait and read the cached result.
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorError`] when no verdict could be obtained; the
    /// engine maps that into its configured failure mode.
    pub async fn advise(&self, prompt: &EvaluationPrompt) -> AdvisorResult<AdvisorVerdict> {
        loop {
            if let Some(verdict) = self.cache.get(prompt.cache_key()) {
                return Ok(verdict);
            }

            let role = {
                let mut inflight = self.inflight.lock().expect("inflight map poisoned");
                if let Some(rx) = inflight.get(prompt.cache_key()) {
                    Role::Follower(rx.clone())
                } else {
                    let (tx, rx) = watch::channel(());
                    inflight.insert(prompt.cache_key().to_owned(), rx);
                    Role::Leader(FlightGuard {
                        inflight: &self.inflight,
                        key: prompt.cache_key(),
                        tx,
                    })
                }
            };

            match role {
                Role::Follower(mut rx) => {
                    // Wakes when the leader finishes (or vanishes); loop to
                    // re-check the cache and possibly take over.
                    let _ = rx.changed().await;
                }
                Role::Leader(guard) => {
                    let result = self.call_upstream(prompt).await;
                    if let Ok(verdict) = &result {
                        self.cache.insert(prompt.cache_key(), verdict.clone());
                    }
                    drop(guard);
                    return result;
                }
            }
        }
    }

    async fn call_upstream(&self, prompt: &EvaluationPrompt) -> AdvisorResult<AdvisorVerdict> {
        let _permit = self.acquire_slot().await?;

        if !self.breaker.try_acquire() {
            return Err(AdvisorError::BreakerOpen);
        }

        let result = self.attempt_with_retries(prompt).await;
        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(_) => self.breaker.record_failure(),
        }
        result
    }

    async fn attempt_with_retries(
        &self,
        prompt: &EvaluationPrompt,
    ) -> AdvisorResult<AdvisorVerdict> {
        let mut attempt: u32 = 0;
        loop {
            let outcome =
                tokio::time::timeout(self.config.timeout, self.inner.advise(prompt)).await;
            let err = match outcome {
                Ok(Ok(verdict)) => return Ok(verdict),
                Ok(Err(err)) => err,
                Err(_) => AdvisorError::Timeout {
                    after: self.config.timeout,
                },
            };

            if attempt >= self.config.retries || !err.is_retryable() {
                return Err(err);
            }
            attempt += 1;
            debug!(attempt, error = %err, "retrying advisor call");
        }
    }

    async fn acquire_slot(&self) -> AdvisorResult<tokio::sync::SemaphorePermit<'_>> {
        if let Ok(permit) = self.slots.try_acquire() {
            return Ok(permit);
        }

        if self.waiting.fetch_add(1, Ordering::SeqCst) >= self.config.max_queue {
            self.waiting.fetch_sub(1, Ordering::SeqCst);
            return Err(AdvisorError::Overloaded);
        }
        let _queued = QueueGuard {
            waiting: &self.waiting,
        };
        self.slots
            .acquire()
            .await
            .map_err(|_| AdvisorError::Overloaded)
    }
}

enum Role<'a> {
    Leader(FlightGuard<'a>),
    Follower(watch::Receiver<()>),
}

/// Removes the in-flight entry and wakes followers, even on cancellation.
struct FlightGuard<'a> {
    inflight: &'a Mutex<HashMap<String, watch::Receiver<()>>>,
    key: &'a str,
    tx: watch::Sender<()>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.inflight
            .lock()
            .expect("inflight map poisoned")
            .remove(self.key);
        let _ = self.tx.send(());
    }
}

/// Restores the queue counter, even on cancellation.
struct QueueGuard<'a> {
    waiting: &'a AtomicUsize,
}

impl Drop for QueueGuard<'_> {
    fn drop(&mut self) {
        self.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SampleEvaluator for ResilientAdvisor {
    async fn evaluate_sample(
        &self,
        request: &ToolRequest,
        rule: &SecurityRule,
    ) -> Result<AdvisorOutcome, SuperegoError> {
        let prompt = EvaluationPrompt::render(
            request,
            rule.id(),
            rule.reason().unwrap_or(FALLBACK_CONCERN),
            rule.sample_guidance(),
        );
        let verdict = self.advise(&prompt).await?;
        Ok(AdvisorOutcome {
            verdict,
            provider: self.metadata().provider().to_owned(),
            model: self.metadata().model().to_owned(),
        })
    }
}
