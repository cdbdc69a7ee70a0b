use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Wait applied when a rate-limit response carries no usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("request timed out")]
    Timeout,

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Parse(String),
}

impl SourceError {
    /// Whether the same request may succeed if sent again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SourceError::Transient(_) | SourceError::Timeout | SourceError::RateLimited { .. }
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, SourceError::Auth(_))
    }

    /// Maps a non-success HTTP response to the error taxonomy.
    pub fn from_status(status: StatusCode, headers: &HeaderMap, body: &str) -> Self {
        let message = if body.is_empty() {
            status.canonical_reason().unwrap_or("no response body").to_string()
        } else {
            truncate(body, 300)
        };
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SourceError::Auth(format!("{} - {}", status, message)),
            StatusCode::TOO_MANY_REQUESTS => SourceError::RateLimited {
                retry_after: parse_retry_after(headers).unwrap_or(DEFAULT_RETRY_AFTER),
            },
            StatusCode::REQUEST_TIMEOUT => SourceError::Timeout,
            s if s.is_server_error() => SourceError::Transient(format!("{} - {}", status, message)),
            s => SourceError::Rejected {
                status: s.as_u16(),
                message,
            },
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout
        } else if err.is_decode() {
            SourceError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            SourceError::from_status(status, &HeaderMap::new(), &err.to_string())
        } else {
            SourceError::Transient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(err.to_string())
    }
}

/// `Retry-After` in delta-seconds form.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}...", cut)
    }
}
