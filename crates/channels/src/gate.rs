//! Process-wide concurrency gate with throttle backoff.

use std::{future::Future, sync::Arc, time::Duration};

use {
    rand::Rng,
    tokio::sync::Semaphore,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use beenbag_metrics::{counter, gate as gate_metrics, gauge, histogram, labels};

use crate::{ApiError, Result};

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Calls allowed in flight at once across the whole process.
    pub max_concurrency: usize,
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            max_attempts: 5,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
        }
    }
}

/// Exponential schedule used when the platform gives no retry hint.
///
/// `delay(n) = min(base × 2^(n−1) + jitter, max)` with `jitter ∈ [0, base)`,
/// so successive delays never shrink.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    /// Delay after the `attempt`-th failure (1-based). `jitter` is a fraction
    /// in `[0, 1)` of `base`.
    #[must_use]
    pub fn delay(&self, attempt: u32, jitter: f64) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let exponential = self.base.saturating_mul(factor);
        let jitter = self.base.mul_f64(jitter.clamp(0.0, 0.999));
        exponential.saturating_add(jitter).min(self.max)
    }

    /// [`Self::delay`] with fresh random jitter.
    #[must_use]
    pub fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let jitter: f64 = rand::rng().random();
        self.delay(attempt, jitter)
    }
}

/// Bounds concurrent outward calls and retries throttled ones.
pub struct RateLimitedGate {
    permits: Arc<Semaphore>,
    max_concurrency: usize,
    max_attempts: u32,
    backoff: BackoffPolicy,
}

impl RateLimitedGate {
    pub fn new(config: GateConfig) -> Self {
        let max_concurrency = config.max_concurrency.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            max_attempts: config.max_attempts.max(1),
            backoff: BackoffPolicy {
                base: config.base_delay,
                max: config.max_delay,
            },
        }
    }

    /// Calls currently holding a permit.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.max_concurrency - self.permits.available_permits()
    }

    /// Run one outward call behind the gate.
    ///
    /// `request` is invoked once per attempt and must build a fresh request
    /// each time; a future that already failed is never polled again. The
    /// permit is held across backoff sleeps so a throttled platform slows
    /// every caller, not just this one. Only throttled errors are retried.
    pub async fn call<T, F, Fut>(&self, operation: &'static str, mut request: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        #[cfg(feature = "metrics")]
        let wait_started = std::time::Instant::now();

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ApiError::transient("api gate closed"))?;

        #[cfg(feature = "metrics")]
        {
            histogram!(gate_metrics::PERMIT_WAIT_SECONDS)
                .record(wait_started.elapsed().as_secs_f64());
            counter!(gate_metrics::CALLS_TOTAL, labels::OPERATION => operation).increment(1);
            gauge!(gate_metrics::IN_FLIGHT).set(self.in_flight() as f64);
        }

        let mut attempt: u32 = 1;
        loop {
            let err = match request().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_throttled() => err,
                Err(err) => {
                    debug!(operation, attempt, error = %err, "api call failed");
                    return Err(err);
                },
            };

            #[cfg(feature = "metrics")]
            counter!(gate_metrics::THROTTLED_TOTAL, labels::OPERATION => operation).increment(1);

            if attempt >= self.max_attempts {
                warn!(
                    operation,
                    attempt,
                    max_attempts = self.max_attempts,
                    "api rate limit persisted after retries"
                );
                #[cfg(feature = "metrics")]
                counter!(gate_metrics::EXHAUSTED_TOTAL, labels::OPERATION => operation)
                    .increment(1);
                return Err(err);
            }

            let wait = self.retry_delay(attempt, &err);
            warn!(
                operation,
                attempt,
                max_attempts = self.max_attempts,
                wait_ms = wait.as_millis() as u64,
                hinted = err.retry_after().is_some(),
                "api rate limited, waiting before retry"
            );
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }

    fn retry_delay(&self, attempt: u32, err: &ApiError) -> Duration {
        err.retry_after()
            .unwrap_or_else(|| self.backoff.delay_with_jitter(attempt))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::ApiErrorKind,
        std::sync::{
            Mutex,
            atomic::{AtomicU32, AtomicUsize, Ordering},
        },
        tokio::time::Instant,
    };

    fn gate(max_concurrency: usize, max_attempts: u32) -> RateLimitedGate {
        RateLimitedGate::new(GateConfig {
            max_concurrency,
            max_attempts,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        })
    }

    #[test]
    fn backoff_delays_never_shrink() {
        let policy = BackoffPolicy {
            base: Duration::from_secs(5),
            max: Duration::from_secs(300),
        };
        // Worst case for monotonicity: maximal jitter followed by none.
        let mut previous = Duration::ZERO;
        for attempt in 1..=12 {
            let jitter = if attempt % 2 == 0 { 0.0 } else { 0.999 };
            let delay = policy.delay(attempt, jitter);
            assert!(delay >= previous, "attempt {attempt}: {delay:?} < {previous:?}");
            previous = delay;
        }
        assert_eq!(previous, Duration::from_secs(300));
    }

    #[test]
    fn backoff_doubles_from_base() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(100),
            max: Duration::from_secs(10),
        };
        assert_eq!(policy.delay(1, 0.0), Duration::from_millis(100));
        assert_eq!(policy.delay(2, 0.0), Duration::from_millis(200));
        assert_eq!(policy.delay(4, 0.0), Duration::from_millis(800));
        assert_eq!(policy.delay(3, 0.5), Duration::from_millis(450));
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_then_success_retries_with_growing_delays() {
        let gate = gate(4, 5);
        let attempts = AtomicU32::new(0);
        let stamps = Mutex::new(Vec::new());

        let value = gate
            .call("edit_message", || {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                stamps.lock().unwrap().push(Instant::now());
                async move {
                    if n < 4 {
                        Err(ApiError::throttled(None, "429"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 4);
        let stamps = stamps.into_inner().unwrap();
        let gaps: Vec<Duration> = stamps.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(gaps.len(), 3);
        assert!(gaps.windows(2).all(|w| w[1] >= w[0]), "{gaps:?}");
        assert!(gaps[0] >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let gate = gate(4, 3);
        let attempts = AtomicU32::new(0);

        let err = gate
            .call("create_message", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ApiError::throttled(None, "429")) }
            })
            .await
            .unwrap_err();

        assert!(err.is_throttled());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn prefers_server_retry_hint() {
        let gate = RateLimitedGate::new(GateConfig {
            max_concurrency: 1,
            max_attempts: 2,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(300),
        });
        let attempts = AtomicU32::new(0);
        let started = Instant::now();

        gate.call("delete_message", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ApiError::throttled(Some(Duration::from_secs(2)), "429"))
                } else {
                    Ok(())
                }
            }
        })
        .await
        .unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(30));
    }

    #[rstest::rstest]
    #[case(ApiError::not_found("gone"), ApiErrorKind::NotFound)]
    #[case(ApiError::transient("502"), ApiErrorKind::Transient)]
    #[case(ApiError::permanent("403"), ApiErrorKind::Permanent)]
    #[tokio::test(start_paused = true)]
    async fn other_errors_propagate_without_retry(
        #[case] error: ApiError,
        #[case] kind: ApiErrorKind,
    ) {
        let gate = gate(4, 5);
        let attempts = AtomicU32::new(0);
        let error = Mutex::new(Some(error));

        let err = gate
            .call("create_message", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                let e = error.lock().unwrap().take().unwrap();
                async move { Err::<(), _>(e) }
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), kind);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn caps_concurrent_calls() {
        let gate = Arc::new(gate(2, 1));
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let gate = Arc::clone(&gate);
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                gate.call("create_message", || {
                    let current = Arc::clone(&current);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(gate.in_flight(), 0);
    }
}
