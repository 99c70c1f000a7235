use thiserror::Error;

/// Upstream generation failures, classified for the retry policy.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// Timeout, connection failure, 429 or 5xx. Worth retrying.
    #[error("transient upstream failure: {0}")]
    Transient(String),
    /// The search-capable endpoint rejected the request. Eligible for
    /// exactly one fallback to plain completion.
    #[error("search endpoint unavailable: {0}")]
    SearchUnavailable(String),
    /// Any other 4xx or a malformed response body. Never retried.
    #[error("permanent upstream failure: {0}")]
    Permanent(String),
}

/// Producer-side backpressure signal from the dispatch queue.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("dispatch queue full (capacity {capacity})")]
    Full { capacity: usize },
    #[error("dispatch queue closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::EnqueueError;

    #[test]
    fn backpressure_error_names_the_capacity() {
        let message = EnqueueError::Full { capacity: 50 }.to_string();
        assert!(message.contains("50"));
    }
}
