//! Fail-open wrapping of store calls
//!
//! Every interaction with the shared store goes through [`FailOpen`], which
//! bounds it with the configured command timeout. Call sites on the request
//! path use [`FailOpen::or_default`], which turns any failure into a safe
//! default and a warning; management paths use [`FailOpen::call`] and see the
//! error.

use super::store::StoreError;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct FailOpen {
    timeout: Duration,
}

impl FailOpen {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `operation` with the command timeout applied
    ///
    /// A timeout surfaces as [`StoreError::Timeout`].
    pub async fn call<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }

    /// Run `operation`, substituting `default` on any failure
    ///
    /// Failures are logged at warn level together with `what`, a short name
    /// for the operation. Nothing is retried.
    pub async fn or_default<T, F>(&self, what: &'static str, default: T, operation: F) -> T
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match self.call(operation).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(operation = what, error = %e, "Store call failed, failing open");
                default
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_through_success() {
        let guard = FailOpen::new(Duration::from_millis(50));
        let value = guard.or_default("test", false, async { Ok(true) }).await;
        assert!(value);
    }

    #[tokio::test]
    async fn test_error_becomes_default() {
        let guard = FailOpen::new(Duration::from_millis(50));
        let value = guard
            .or_default("test", true, async {
                Err(StoreError::Unavailable("connection refused".into()))
            })
            .await;
        assert!(value);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out() {
        let guard = FailOpen::new(Duration::from_millis(50));
        let result: Result<bool, StoreError> = guard
            .call(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(false)
            })
            .await;
        assert_eq!(result, Err(StoreError::Timeout(Duration::from_millis(50))));
    }
}
