//! # Utilities Module
//!
//! ## Purpose
//! Common helpers used throughout the pipeline: operation timing, text
//! previews for logging, and the explicit retry policy wrapping every
//! outbound call site.

use crate::config::RetryConfig;
use crate::errors::Result;
use std::future::Future;
use std::time::{Duration, Instant};

/// Performance timer for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Text processing utilities
pub struct TextUtils;

impl TextUtils {
    /// Truncate text to the given number of characters with ellipsis.
    /// Counts characters, not bytes, since most of our text is CJK.
    pub fn truncate(text: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            text.to_string()
        } else {
            let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
            format!("{}...", kept)
        }
    }

}

/// Explicit retry policy: bounded attempts with a fixed delay, retrying only
/// errors classified as recoverable.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run an operation, retrying recoverable failures up to the attempt bound
    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && e.is_recoverable() => {
                    tracing::warn!("Attempt {} failed for {}: {}", attempt, operation, e);
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        "Giving up on {} after {} attempt(s): {}",
                        operation,
                        attempt,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SearchError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn truncate_counts_characters_not_bytes() {
        assert_eq!(TextUtils::truncate("Hello world", 20), "Hello world");
        assert_eq!(TextUtils::truncate("This is a very long text", 10), "This is...");
        assert_eq!(TextUtils::truncate("最高法院判決要旨節錄", 8), "最高法院判...");
    }

    #[tokio::test]
    async fn retry_stops_after_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .run("always failing", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(SearchError::Store {
                        operation: "upsert".to_string(),
                        details: "down".to_string(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_does_not_repeat_unrecoverable_errors() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .run("validation", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(SearchError::ValidationFailed {
                        field: "case_id".to_string(),
                        reason: "missing".to_string(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_returns_first_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result = policy
            .run("flaky", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(SearchError::Store {
                            operation: "rpc".to_string(),
                            details: "timeout".to_string(),
                        })
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
