//! Classification of failed metadata downloads.

use reqwest::StatusCode;

/// Maximum number of attempts for one metadata download.
pub const MAX_RETRIES: usize = 3;

/// Delay between attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// Download failures that will not succeed on a later attempt.
#[derive(Debug)]
pub enum NonRetryableError {
    /// HTTP 401 or 403
    AccessDenied(String),
    /// HTTP 404 or 410
    NotFound(String),
    /// Other 4xx responses
    ClientError(String),
}

impl std::fmt::Display for NonRetryableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NonRetryableError::AccessDenied(msg) => {
                write!(f, "Access denied: {}. Check the metadata source URL.", msg)
            }
            NonRetryableError::NotFound(msg) => write!(f, "Not found: {}", msg),
            NonRetryableError::ClientError(msg) => write!(f, "Request error: {}", msg),
        }
    }
}

impl std::error::Error for NonRetryableError {}

/// `Ok(())` when the request may be retried, otherwise the reason it may not.
pub fn classify_error(error: &reqwest::Error) -> Result<(), NonRetryableError> {
    let Some(status) = error.status() else {
        // Connection errors and timeouts
        return Ok(());
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(NonRetryableError::AccessDenied(
            format!("HTTP {}", status.as_u16()),
        )),
        StatusCode::NOT_FOUND | StatusCode::GONE => Err(NonRetryableError::NotFound(
            "The metadata source does not exist".to_string(),
        )),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => Ok(()),
        s if s.is_client_error() => Err(NonRetryableError::ClientError(format!(
            "HTTP {} error",
            s.as_u16()
        ))),
        _ => Ok(()),
    }
}

/// Map an `error_for_status()` failure to an error the retry loop understands.
pub fn check_retryable(error: reqwest::Error) -> anyhow::Error {
    match classify_error(&error) {
        Ok(()) => anyhow::Error::from(error),
        Err(non_retryable) => anyhow::Error::from(non_retryable),
    }
}
