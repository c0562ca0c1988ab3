use thiserror::Error;

#[derive(Error, Debug)]
pub enum RedstreamError {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid offset: {0}")]
    InvalidOffset(String),

    #[error("Handler failed: {0}")]
    Handler(anyhow::Error),

    #[error("Lock lost: {0}")]
    LockLost(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RedstreamError {
    /// Whether retrying the same operation later can succeed.
    ///
    /// Corrupt ids and bad configuration stay broken no matter how often a
    /// loop retries; they are still retried, but logged as such.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            RedstreamError::InvalidOffset(_) | RedstreamError::InvalidConfig(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RedstreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(RedstreamError::StoreUnavailable("timeout".into()).is_retryable());
        assert!(RedstreamError::Handler(anyhow::anyhow!("boom")).is_retryable());
        assert!(RedstreamError::LockLost("lock".into()).is_retryable());
        assert!(!RedstreamError::InvalidOffset("abc".into()).is_retryable());
        assert!(!RedstreamError::InvalidConfig("batch_size".into()).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = RedstreamError::InvalidOffset("12-x".into());
        assert_eq!(err.to_string(), "Invalid offset: 12-x");
    }
}
