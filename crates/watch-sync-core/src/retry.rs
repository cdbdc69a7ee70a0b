use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use watch_sync_config::PushOptions;
use watch_sync_sources::SourceError;

/// Bounded retry for remote calls.
///
/// Transient failures (network, timeout, 5xx) back off exponentially and count
/// against `max_attempts`. Rate-limit responses pause for the signaled duration
/// without consuming an attempt, up to `max_rate_limit_pauses` per call.
/// Everything else is returned immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_rate_limit_pauses: u32,
    /// Per-attempt deadline. `None` leaves timing to the client.
    pub call_timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn from_options(options: &PushOptions) -> Self {
        Self {
            max_attempts: options.max_attempts.max(1),
            initial_backoff: options.initial_backoff(),
            max_backoff: options.max_backoff(),
            max_rate_limit_pauses: options.max_rate_limit_pauses,
            call_timeout: Some(options.request_timeout()),
        }
    }

    /// Same policy without the per-attempt deadline, for multi-request operations.
    pub fn without_timeout(&self) -> Self {
        Self {
            call_timeout: None,
            ..self.clone()
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let mut attempt = 1u32;
        let mut pauses = 0u32;
        loop {
            let result = match self.call_timeout {
                Some(limit) => match timeout(limit, call()).await {
                    Ok(result) => result,
                    Err(_) => Err(SourceError::Timeout),
                },
                None => call().await,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match err {
                SourceError::RateLimited { retry_after } if pauses < self.max_rate_limit_pauses => {
                    pauses += 1;
                    warn!(
                        operation,
                        retry_after_secs = retry_after.as_secs(),
                        pause = pauses,
                        "Rate limited, pausing"
                    );
                    sleep(retry_after).await;
                }
                SourceError::RateLimited { .. } => return Err(err),
                ref e if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    debug!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after transient failure"
                    );
                    attempt += 1;
                    sleep(delay).await;
                }
                other => return Err(other),
            }
        }
    }
}
