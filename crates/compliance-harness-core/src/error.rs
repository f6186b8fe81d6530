//! Error taxonomy for the retrieval core.

use std::time::Duration;

/// Failures reported by a [`CorpusStore`](crate::store::CorpusStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Timeout or network/IO failure. Worth one retry.
    #[error("corpus store unavailable: {reason}")]
    Transient { reason: String },

    /// The query vector does not match the corpus dimensionality.
    #[error("embedding dimension mismatch: corpus has {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Anything else (bad row, schema problem). Not retried.
    #[error("corpus store error: {reason}")]
    Fatal { reason: String },
}

impl StoreError {
    pub fn transient(reason: impl Into<String>) -> Self {
        StoreError::Transient {
            reason: reason.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        StoreError::Fatal {
            reason: reason.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient { .. })
    }
}

/// Failure to turn query text into a vector.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding provider is disabled")]
    Disabled,

    #[error("embedding unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Invalid configuration. Raised at startup, never per request.
#[derive(Debug, thiserror::Error)]
#[error("configuration error: {field}: {message}")]
pub struct ConfigError {
    pub field: String,
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by a `retrieve()` call.
///
/// Degraded-but-served outcomes (keyword-only ranking, store outage,
/// timeouts) are not errors: they come back as tagged responses.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error(transparent)]
    EmbeddingUnavailable(#[from] EmbeddingError),

    #[error("connection pool exhausted: no connection within {waited:?}")]
    PoolExhausted { waited: Duration },

    #[error("connection pool is shut down")]
    PoolClosed,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Configuration(#[from] ConfigError),
}

impl RetrievalError {
    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        match self {
            RetrievalError::PoolExhausted { .. } => true,
            RetrievalError::Store(e) => e.is_transient(),
            RetrievalError::EmbeddingUnavailable(EmbeddingError::Unavailable { .. }) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(RetrievalError::PoolExhausted {
            waited: Duration::from_millis(10)
        }
        .is_retryable());
        assert!(RetrievalError::Store(StoreError::transient("reset")).is_retryable());
        assert!(!RetrievalError::Store(StoreError::fatal("bad row")).is_retryable());
        assert!(!RetrievalError::EmptyQuery.is_retryable());
        assert!(!RetrievalError::EmbeddingUnavailable(EmbeddingError::Disabled).is_retryable());
    }

    #[test]
    fn test_config_error_message() {
        let e = ConfigError::new("retrieval.vector_weight", "must be >= 0");
        assert_eq!(
            e.to_string(),
            "configuration error: retrieval.vector_weight: must be >= 0"
        );
    }
}
