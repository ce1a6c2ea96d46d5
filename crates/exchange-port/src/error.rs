use thiserror::Error;

/// Error taxonomy for Exchange Port calls. Adapters map their native wire
/// errors onto these variants and implement [`is_transient`].
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("network error calling {operation}: {message}")]
    Network { operation: String, message: String },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("venue temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("unknown symbol: {0}")]
    SymbolUnknown(String),

    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("order rejected: {0}")]
    OrderRejected(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl ExchangeError {
    /// Whether the Retry Wrapper should retry this error class.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExchangeError::Network { .. } | ExchangeError::RateLimited(_) | ExchangeError::Unavailable(_)
        )
    }
}
