//! Retry/backoff around a single scoring call.
//!
//! Only quota rejections are retried. Every rejection is reported to the tier's limiter;
//! the wait is the server-advertised delay when present, else `2^attempt` seconds, plus
//! up to 300ms of jitter. After sleeping, a fresh limiter slot is claimed before retrying.

use std::future::Future;
use std::time::Duration;

use metrics::counter;
use rand::Rng;
use tracing::warn;

use super::limiter::RateLimiter;
use super::model::ScoringError;

pub const MAX_QUOTA_RETRIES: u32 = 4;

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_QUOTA_RETRIES,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_millis(300),
        }
    }
}

impl BackoffPolicy {
    /// Wait before retry number `attempt + 1`, without jitter.
    pub fn base_wait(&self, attempt: u32, server_delay: Option<Duration>) -> Duration {
        server_delay.unwrap_or_else(|| self.base_delay.saturating_mul(2u32.saturating_pow(attempt)))
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..max_ms))
    }
}

/// Claim a limiter slot, run `call`, and retry quota rejections per `policy`.
pub async fn call_with_backoff<T, F, Fut>(
    limiter: &RateLimiter,
    policy: &BackoffPolicy,
    mut call: F,
) -> Result<T, ScoringError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScoringError>>,
{
    let tier = limiter.tier().as_str();
    limiter.acquire().await;
    let mut attempt = 0u32;
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(ScoringError::Quota { retry_delay }) => {
                limiter.on_throttled();
                if attempt >= policy.max_retries {
                    warn!(target: "limiter", tier, attempt, "quota retries exhausted");
                    return Err(ScoringError::Quota { retry_delay });
                }
                let wait = policy.base_wait(attempt, retry_delay) + policy.jitter();
                counter!("scoring_retries_total", "tier" => tier).increment(1);
                warn!(
                    target: "limiter",
                    tier,
                    attempt = attempt + 1,
                    wait_ms = wait.as_millis() as u64,
                    capacity = limiter.current_capacity(),
                    "quota rejection; backing off"
                );
                tokio::time::sleep(wait).await;
                limiter.acquire().await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::Tier;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn exponential_base_without_server_hint() {
        let p = BackoffPolicy::default();
        assert_eq!(p.base_wait(0, None), Duration::from_secs(1));
        assert_eq!(p.base_wait(3, None), Duration::from_secs(8));
        assert_eq!(
            p.base_wait(3, Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn server_delay_is_honoured_once() {
        let lim = RateLimiter::new(Tier::Analysis, 10, true);
        let calls = AtomicU32::new(0);
        let t0 = Instant::now();
        let out = call_with_backoff(&lim, &BackoffPolicy::default(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ScoringError::Quota {
                        retry_delay: Some(Duration::from_secs(2)),
                    })
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        let waited = t0.elapsed();
        assert_eq!(out.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(waited >= Duration::from_millis(2000), "waited {waited:?}");
        assert!(waited <= Duration::from_millis(2300), "waited {waited:?}");
        assert_eq!(lim.throttle_count(), 1);
        assert_eq!(lim.current_capacity(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_four_retries() {
        let lim = RateLimiter::new(Tier::Title, 100, false);
        let calls = AtomicU32::new(0);
        let out: Result<(), _> = call_with_backoff(&lim, &BackoffPolicy::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ScoringError::Quota { retry_delay: None }) }
        })
        .await;
        assert!(matches!(out, Err(ScoringError::Quota { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn non_quota_errors_are_not_retried() {
        let lim = RateLimiter::new(Tier::Title, 100, true);
        let calls = AtomicU32::new(0);
        let out: Result<(), _> = call_with_backoff(&lim, &BackoffPolicy::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ScoringError::Http {
                    status: 500,
                    body: "boom".into(),
                })
            }
        })
        .await;
        assert!(matches!(out, Err(ScoringError::Http { status: 500, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(lim.throttle_count(), 0);
    }
}
