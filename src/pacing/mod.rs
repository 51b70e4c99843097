//! Request pacing: inter-page delays and retry backoff.
//!
//! All sleeping goes through the `Pacer` trait so orchestrator tests can run
//! with a no-op implementation instead of real time.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

/// Delay bounds used by the orchestrator. All fields overridable at build
/// time.
#[derive(Debug, Clone)]
pub struct PacingConfig {
    /// Random delay before each page fetch after the first.
    pub page_delay_min: Duration,
    pub page_delay_max: Duration,
    /// Exponential backoff base for retries.
    pub backoff_base: Duration,
    /// Upper clamp on any single backoff sleep.
    pub backoff_cap: Duration,
    /// Random cooldown applied after a CAPTCHA sighting, before the next
    /// attempt.
    pub captcha_cooldown_min: Duration,
    pub captcha_cooldown_max: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            page_delay_min: Duration::from_secs(2),
            page_delay_max: Duration::from_secs(5),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
            captcha_cooldown_min: Duration::from_secs(5),
            captcha_cooldown_max: Duration::from_secs(10),
        }
    }
}

impl PacingConfig {
    /// Random delay within the page bounds.
    pub fn page_delay(&self) -> Duration {
        random_between(self.page_delay_min, self.page_delay_max)
    }

    /// Random cooldown within the captcha bounds.
    pub fn captcha_cooldown(&self) -> Duration {
        random_between(self.captcha_cooldown_min, self.captcha_cooldown_max)
    }

    /// Exponential backoff for the given zero-based retry, with ±25% jitter,
    /// clamped to `backoff_cap`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = self.backoff_base.as_millis() as u64 * (1u64 << retry.min(16));
        let capped = exp.min(self.backoff_cap.as_millis() as u64);
        let jitter_span = capped / 4;
        let low = capped.saturating_sub(jitter_span);
        let high = capped + jitter_span;
        let ms = rand::thread_rng().gen_range(low..=high);
        Duration::from_millis(ms.min(self.backoff_cap.as_millis() as u64))
    }
}

fn random_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let ms = rand::thread_rng().gen_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(ms)
}

/// Sleep seam. Production uses `TokioPacer`; tests use `NoopPacer`.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, duration: Duration);
}

#[derive(Debug, Default)]
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            log::debug!("pausing for {:?}", duration);
            tokio::time::sleep(duration).await;
        }
    }
}

/// Pacer that returns immediately. Test use only, but kept public so
/// integration tests can drive the orchestrator without real delays.
#[derive(Debug, Default)]
pub struct NoopPacer;

#[async_trait]
impl Pacer for NoopPacer {
    async fn pause(&self, _duration: Duration) {}
}
