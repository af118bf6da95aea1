//! Error taxonomy for the sniping pipeline.
//!
//! Every fallible operation in the library returns `Result<T, SniperError>`.
//! The backoff runner keys its retry decision off `is_transient()`; everything
//! else propagates immediately.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SniperError>;

#[derive(Error, Debug)]
pub enum SniperError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("transient gateway failure: {0}")]
    GatewayTransient(String),

    #[error("malformed transaction {0}")]
    MalformedTransaction(String),

    #[error("no mint recoverable from {0}")]
    MintNotFound(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("insufficient balance: have {have} lamports, need {need}")]
    InsufficientBalance { have: u64, need: u64 },

    #[error("simulation rejected: {0}")]
    SimulationRejected(String),

    #[error("not confirmed before deadline: {0}")]
    NotConfirmed(String),

    #[error("provider error: {0}")]
    ProviderError(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("{op} failed after {attempts} attempts")]
    RetriesExhausted { op: String, attempts: u32 },
}

impl SniperError {
    /// Errors the backoff runner is allowed to retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SniperError::RateLimited(_) | SniperError::Timeout(_) | SniperError::GatewayTransient(_)
        )
    }

    /// Classify a provider-side error message into the taxonomy.
    ///
    /// Rate limiting shows up either as an HTTP 429 or as a
    /// "Too Many Requests" body depending on the provider.
    pub fn classify_provider(context: &str, message: impl AsRef<str>) -> Self {
        let message = message.as_ref();
        let lower = message.to_lowercase();
        if lower.contains("429") || lower.contains("too many requests") || lower.contains("rate limit")
        {
            SniperError::RateLimited(format!("{context}: {message}"))
        } else if lower.contains("timeout") || lower.contains("timed out") {
            SniperError::Timeout(format!("{context}: {message}"))
        } else if lower.contains("gateway") {
            SniperError::GatewayTransient(format!("{context}: {message}"))
        } else {
            SniperError::ProviderError(format!("{context}: {message}"))
        }
    }
}
