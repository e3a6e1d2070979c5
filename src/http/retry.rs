//! Retry policy and classification of HTTP failures.

use reqwest::StatusCode;

pub const MAX_RETRIES: usize = 3;

pub const RETRY_DELAY_MS: u64 = 1000;

/// HTTP failures that will not succeed on a retry.
#[derive(Debug)]
pub enum NonRetryableError {
    /// HTTP 401
    AuthenticationFailed(String),
    /// HTTP 403
    Forbidden(String),
    /// HTTP 404
    NotFound(String),
    /// HTTP 429
    TooManyRequests(String),
    /// Any other 4xx
    ClientError(String),
}

impl NonRetryableError {
    pub fn is_not_found(error: &anyhow::Error) -> bool {
        error
            .chain()
            .any(|e| matches!(e.downcast_ref::<NonRetryableError>(), Some(NonRetryableError::NotFound(_))))
    }
}

impl std::fmt::Display for NonRetryableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NonRetryableError::AuthenticationFailed(url) => write!(
                f,
                "Authentication failed for {}. Check MODGET_API_KEY.",
                url
            ),
            NonRetryableError::Forbidden(url) => write!(
                f,
                "Access to {} is forbidden. The feed may require MODGET_API_KEY.",
                url
            ),
            NonRetryableError::NotFound(url) => write!(f, "Not found: {}", url),
            NonRetryableError::TooManyRequests(url) => {
                write!(f, "Too many requests to {}. Try again later.", url)
            }
            NonRetryableError::ClientError(msg) => write!(f, "Request error: {}", msg),
        }
    }
}

impl std::error::Error for NonRetryableError {}

/// `Ok(())` when the failure is worth retrying (5xx, connection errors, timeouts).
pub fn classify_error(error: &reqwest::Error) -> Result<(), NonRetryableError> {
    let url = error
        .url()
        .map(|u| u.to_string())
        .unwrap_or_else(|| "the feed".to_string());

    match error.status() {
        Some(StatusCode::UNAUTHORIZED) => Err(NonRetryableError::AuthenticationFailed(url)),
        Some(StatusCode::FORBIDDEN) => Err(NonRetryableError::Forbidden(url)),
        Some(StatusCode::NOT_FOUND) => Err(NonRetryableError::NotFound(url)),
        Some(StatusCode::TOO_MANY_REQUESTS) => Err(NonRetryableError::TooManyRequests(url)),
        Some(s) if s.is_client_error() => Err(NonRetryableError::ClientError(format!(
            "HTTP {} from {}",
            s.as_u16(),
            url
        ))),
        _ => Ok(()),
    }
}

/// Map an `error_for_status()` failure to an `anyhow::Error`, wrapping
/// client errors in [`NonRetryableError`].
pub fn check_retryable(error: reqwest::Error) -> anyhow::Error {
    match classify_error(&error) {
        Ok(()) => anyhow::Error::from(error),
        Err(non_retryable) => anyhow::Error::from(non_retryable),
    }
}
