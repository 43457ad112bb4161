//! Retry with exponential backoff
//!
//! Wraps another [`WorkloadClient`] and retries calls that fail with a
//! transient error. Rejections and not-found answers are returned at once.

use async_trait::async_trait;
use podml_core::domain::phase::Phase;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use super::{ClusterError, WorkloadClient, WorkloadSpec};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }
}

pub struct RetryingClient {
    inner: Arc<dyn WorkloadClient>,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn WorkloadClient>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl WorkloadClient for RetryingClient {
    async fn submit(&self, spec: &WorkloadSpec) -> Result<String, ClusterError> {
        retry(self.policy, "submit", move || self.inner.submit(spec)).await
    }

    async fn get_phase(&self, handle: &str) -> Result<Phase, ClusterError> {
        retry(self.policy, "get_phase", move || self.inner.get_phase(handle)).await
    }
}

async fn retry<T, F, Fut>(policy: RetryPolicy, operation: &str, mut call: F) -> Result<T, ClusterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClusterError>>,
{
    let mut attempt = 0;
    let mut delay = policy.initial_delay;

    loop {
        attempt += 1;

        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                warn!(
                    "Cluster {} failed (attempt {}/{}): {}, retrying in {:?}",
                    operation, attempt, policy.max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;

                // Exponential backoff with cap
                delay = (delay * 2).min(policy.max_delay);
            }
            Err(e) => {
                if e.is_transient() {
                    error!(
                        "Cluster {} failed after {} attempt(s): {}",
                        operation, attempt, e
                    );
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry(fast_policy(3), "test", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ClusterError::Transient("503".to_string()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = retry(fast_policy(2), "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ClusterError::Transient("timeout".to_string()))
        })
        .await;

        assert!(matches!(result, Err(ClusterError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_does_not_retry_rejections() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = retry(fast_policy(5), "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ClusterError::NotFound("train-00000000".to_string()))
        })
        .await;

        assert!(matches!(result, Err(ClusterError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_needs_one_attempt() {
        assert_eq!(RetryPolicy::with_max_attempts(0).max_attempts, 1);
    }
}
