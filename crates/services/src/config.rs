use std::future::Future;
use std::time::Duration;

use storage::repository::StorageError;

use crate::error::ProgressError;

/// Default bound on a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of extra read-mutate-write cycles after a version conflict.
pub const DEFAULT_CONFLICT_RETRIES: u32 = 1;

/// Retry and timeout policy shared by the progress services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    pub store_timeout: Duration,
    pub conflict_retries: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            store_timeout: DEFAULT_STORE_TIMEOUT,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }
}

impl TrackerConfig {
    #[must_use]
    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    #[must_use]
    pub fn with_conflict_retries(mut self, conflict_retries: u32) -> Self {
        self.conflict_retries = conflict_retries;
        self
    }

    /// Run a store call under `store_timeout`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::PersistenceUnavailable` on expiry, otherwise the
    /// call's own error mapped into `ProgressError`.
    pub(crate) async fn bounded<T, F>(&self, op: F) -> Result<T, ProgressError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        match tokio::time::timeout(self.store_timeout, op).await {
            Ok(res) => res.map_err(ProgressError::from),
            Err(_) => {
                tracing::warn!(timeout_ms = self.store_timeout.as_millis(), "store call timed out");
                Err(ProgressError::from(StorageError::Timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn defaults_match_documented_policy() {
        let config = TrackerConfig::default();
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert_eq!(config.conflict_retries, 1);
    }

    #[tokio::test]
    async fn slow_store_call_is_unavailable() {
        let config = TrackerConfig::default().with_store_timeout(Duration::from_millis(10));
        let res: Result<(), _> = config
            .bounded(async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
            .await;
        assert_eq!(res.unwrap_err().kind(), ErrorKind::PersistenceUnavailable);
    }
}
