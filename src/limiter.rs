use std::sync::atomic::Ordering::Relaxed;
use std::sync::{atomic::AtomicBool, Arc};
use tokio::time::Duration;

use leaky_bucket::RateLimiter;

/// Paces calls to the summarization endpoint and holds a shared backoff
/// flag that is raised when the provider reports a rate-limit rejection.
#[derive(Clone)]
pub struct PromptLimiter {
    prompts: Arc<RateLimiter>,
    backoff: Arc<AtomicBool>,
    backoff_duration: Duration,
}

impl PromptLimiter {
    pub fn new(prompts_per_sec: usize) -> Self {
        let prompts = RateLimiter::builder()
            .initial(1)
            .interval(Duration::from_millis(1_000 / prompts_per_sec.max(1) as u64))
            .max(prompts_per_sec.max(1))
            .refill(1)
            .build();

        Self {
            prompts: Arc::new(prompts),
            backoff: Arc::new(AtomicBool::new(false)),
            backoff_duration: Duration::from_secs(30),
        }
    }

    pub async fn acquire_one(&self) {
        if self.backoff.load(Relaxed) {
            tokio::time::sleep(self.backoff_duration).await;
        }
        self.prompts.acquire_one().await;
    }

    pub fn trigger_backoff(&self) {
        tracing::info!("Summarization rate limit hit, backing off");
        self.backoff.store(true, Relaxed);
        let self_ = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(self_.backoff_duration).await;
            tracing::info!("Backoff expired");
            self_.backoff.store(false, Relaxed);
        });
    }

    #[cfg(test)]
    pub fn in_backoff(&self) -> bool {
        self.backoff.load(Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_is_immediate_when_idle() {
        let limiter = PromptLimiter::new(10);
        assert!(!limiter.in_backoff());
        // First acquire draws from the initial balance without waiting.
        tokio::time::timeout(Duration::from_millis(50), limiter.acquire_one())
            .await
            .expect("first acquire should not block");
    }

    #[tokio::test]
    async fn test_backoff_flag_set() {
        let limiter = PromptLimiter::new(10);
        limiter.trigger_backoff();
        assert!(limiter.in_backoff());
    }
}
