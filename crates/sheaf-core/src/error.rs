use thiserror::Error;

/// Application-wide error types.
///
/// This enum represents the errors that abort an invocation. Per-item
/// provider failures are *not* errors: they are recorded as
/// [`FetchFailure`](crate::models::FetchFailure) values inside a batch and
/// classified by the commit policy.
///
/// # Error Conversion
///
/// - `serde_json::Error` → `AppError::SerializationError`
///
/// # Examples
///
/// ```no_run
/// use sheaf_core::error::AppError;
///
/// fn example() -> Result<(), AppError> {
///     Err(AppError::Generic("Something went wrong".to_string()))
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// The key-value store rejected a command or returned an `{error}` body.
    #[error("Store error: {0}")]
    StoreError(String),

    /// HTTP client request failed.
    ///
    /// Covers non-retryable HTTP statuses and malformed responses from
    /// external services.
    #[error("API Client error: {0}")]
    ClientError(String),

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Network or connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded after exhausting the retry policy.
    #[error("Rate limit exceeded. Please wait and try again.")]
    RateLimitExceeded,

    /// Configuration error.
    ///
    /// Missing credentials, an unreadable or empty work-item universe, and
    /// malformed `sheaf.toml` files all land here. These abort the
    /// invocation before any state is mutated.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A manual offset/limit override does not describe a valid window.
    #[error("Invalid batch window: {0}")]
    InvalidWindow(String),

    /// Generic application error for cases not covered by specific variants.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::StoreError(msg) => {
                format!(
                    "Key-value store error: {}\n   Check KV_REST_URL and KV_REST_TOKEN.",
                    msg
                )
            }
            AppError::ClientError(msg) => {
                if msg.contains("timeout") || msg.contains("timed out") {
                    "Request timed out. The service may be slow or unreachable.\n   Try again later.".to_string()
                } else {
                    format!("API error: {}", msg)
                }
            }
            AppError::NetworkError(msg) => {
                format!("Network error: {}\n   Check your internet connection.", msg)
            }
            AppError::Timeout(secs) => {
                format!(
                    "Request timed out after {} seconds.\n   The server may be overloaded. Try again later.",
                    secs
                )
            }
            AppError::RateLimitExceeded => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            AppError::ConfigError(msg) => {
                format!(
                    "Configuration error: {}\n   Check your sheaf.toml and environment.",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if this error is transient.
    ///
    /// # Examples
    ///
    /// ```
    /// use sheaf_core::error::AppError;
    ///
    /// let err = AppError::NetworkError("connection reset".to_string());
    /// assert!(err.is_retryable());
    ///
    /// let err = AppError::ConfigError("missing token".to_string());
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded
        )
    }
}
