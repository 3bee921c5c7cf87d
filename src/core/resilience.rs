

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::{RagError, Result};


/// Timeout and bounded exponential backoff applied to every collaborator call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            timeout_secs: 30,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, timeout_secs: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            timeout_secs,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    pub async fn run<T, E, F, Fut>(&self, collaborator: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<RagError>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match tokio::time::timeout(self.timeout(), op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e.into(),
                Err(_) => RagError::unavailable(
                    collaborator,
                    format!("timed out after {}s", self.timeout_secs),
                ),
            };

            if !error.is_transient() || attempt >= attempts {
                debug!("{} gave up after {} attempt(s): {}", collaborator, attempt, error);
                return Err(error);
            }

            let delay = self.backoff(attempt);
            warn!(
                "{} failed (attempt {}/{}), retrying in {:?}: {}",
                collaborator, attempt, attempts, delay, error
            );
            tokio::time::sleep(delay).await;
        }
    }
}


/// Turn a failed sub-search into an empty contribution.
pub fn degrade<T: Default>(result: Result<T>, what: &str) -> T {
    match result {
        Ok(value) => value,
        Err(RagError::CollectionNotFound(key)) => {
            warn!("{}: collection {} not indexed, contributing nothing", what, key);
            T::default()
        }
        Err(e) => {
            warn!("{} degraded to empty: {}", what, e);
            T::default()
        }
    }
}
