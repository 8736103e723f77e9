//! Exponential backoff for opening adapter streams.
//!
//! Only transient protocol errors retry, up to three attempts total.
//! Mid-stream failures are not replayed here: once events have been
//! consumed the turn cannot be rebuilt, so the loop surfaces them.

use std::time::Duration;

use tracing::warn;

use crate::error::AdapterError;
use crate::traits::{AdapterRequest, AdapterStream, LlmAdapter};

/// Backoff policy for stream opening.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// First backoff delay; doubles per retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Open a stream, retrying transient failures with exponential backoff.
pub async fn open_with_retry(
    adapter: &dyn LlmAdapter,
    request: AdapterRequest,
    policy: RetryPolicy,
) -> Result<AdapterStream, AdapterError> {
    let mut attempt = 0;
    loop {
        match adapter.stream(request.clone()).await {
            Ok(stream) => return Ok(stream),
            Err(e) if e.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    adapter = adapter.name(),
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient adapter error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::AdapterEvent;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_util::sync::CancellationToken;

    /// Fails with the given error a fixed number of times, then succeeds.
    struct FlakyAdapter {
        failures: AtomicU32,
        error_for: fn() -> AdapterError,
    }

    #[async_trait]
    impl LlmAdapter for FlakyAdapter {
        async fn stream(&self, _req: AdapterRequest) -> Result<AdapterStream, AdapterError> {
            if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n > 0).then(|| n - 1)
            })
            .is_ok()
            {
                return Err((self.error_for)());
            }
            let items: Vec<Result<AdapterEvent, AdapterError>> = vec![
                Ok(AdapterEvent::TextDelta { content: "ok".into() }),
                Ok(AdapterEvent::Finish { reason: Some("stop".into()) }),
            ];
            Ok(Box::pin(futures::stream::iter(items)))
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn request() -> AdapterRequest {
        AdapterRequest {
            messages: Vec::new(),
            tools: Vec::new(),
            model: "test".into(),
            temperature: 0.7,
            max_tokens: 128,
            thinking_level: Default::default(),
            cancel: CancellationToken::new(),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn transient_errors_retry_until_success() {
        let adapter = FlakyAdapter {
            failures: AtomicU32::new(2),
            error_for: || AdapterError::Timeout,
        };
        let stream = open_with_retry(&adapter, request(), fast_policy()).await;
        assert!(stream.is_ok());
    }

    #[tokio::test]
    async fn attempts_are_capped() {
        let adapter = FlakyAdapter {
            failures: AtomicU32::new(10),
            error_for: || AdapterError::Timeout,
        };
        let err = match open_with_retry(&adapter, request(), fast_policy()).await {
            Err(err) => err,
            Ok(_) => panic!("expected error"),
        };
        assert!(matches!(err, AdapterError::Timeout));
        // exactly max_attempts stream() calls happened
        assert_eq!(adapter.failures.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn semantic_errors_do_not_retry() {
        let adapter = FlakyAdapter {
            failures: AtomicU32::new(5),
            error_for: || AdapterError::Auth { message: "bad key".into() },
        };
        let err = match open_with_retry(&adapter, request(), fast_policy()).await {
            Err(err) => err,
            Ok(_) => panic!("expected error"),
        };
        assert!(matches!(err, AdapterError::Auth { .. }));
        assert_eq!(adapter.failures.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
    }
}
