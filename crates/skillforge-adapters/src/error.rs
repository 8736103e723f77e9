//! Adapter error taxonomy.
//!
//! Two families matter to the loop: **protocol** errors (timeouts, 5xx,
//! connection resets) are transient and retried with backoff; **semantic**
//! errors (bad request, auth failure) are surfaced immediately.

/// Errors crossing the adapter boundary.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// HTTP transport failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider took too long.
    #[error("request timed out")]
    Timeout,

    /// Provider API error with an explicit status.
    #[error("api error ({status}): {message}")]
    Api {
        status: u16,
        message: String,
        retryable: bool,
    },

    /// Authentication or authorization failure. Never retried.
    #[error("auth error: {message}")]
    Auth { message: String },

    /// Malformed request rejected by the provider. Never retried.
    #[error("bad request: {message}")]
    BadRequest { message: String },

    /// The abort signal fired. Unwound quietly, never retried.
    #[error("stream cancelled")]
    Cancelled,

    /// The provider emitted something outside the contract.
    #[error("protocol error: {message}")]
    Protocol { message: String },
}

impl AdapterError {
    /// Whether the error belongs to the transient class the loop retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            AdapterError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| {
                        s.is_server_error() || s == reqwest::StatusCode::TOO_MANY_REQUESTS
                    })
            }
            AdapterError::Timeout => true,
            AdapterError::Api { retryable, .. } => *retryable,
            AdapterError::Auth { .. }
            | AdapterError::BadRequest { .. }
            | AdapterError::Cancelled
            | AdapterError::Protocol { .. } => false,
        }
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        AdapterError::Api {
            status,
            message: message.into(),
            retryable: status >= 500 || status == 429,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        assert!(AdapterError::api(500, "oops").is_retryable());
        assert!(AdapterError::api(503, "busy").is_retryable());
        assert!(AdapterError::api(429, "slow down").is_retryable());
        assert!(AdapterError::Timeout.is_retryable());
    }

    #[test]
    fn semantic_errors_are_not_retryable() {
        assert!(!AdapterError::api(400, "bad").is_retryable());
        assert!(!AdapterError::Auth { message: "no key".into() }.is_retryable());
        assert!(!AdapterError::BadRequest { message: "shape".into() }.is_retryable());
        assert!(!AdapterError::Cancelled.is_retryable());
        assert!(!AdapterError::Protocol { message: "weird".into() }.is_retryable());
    }
}
