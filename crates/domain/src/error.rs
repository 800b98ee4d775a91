/// Shared error type used across all axon crates.
///
/// Kinds are distinguished by constructor, never by string matching. Tool
/// failures (`UnknownTool`, `InvalidInput`, `ToolExecution`, `Timeout`,
/// `Cancelled`) are converted into failed Observations by the tool manager
/// and never cross it; the remaining kinds propagate to the caller.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    /// The LLM endpoint could not be reached (connect / TLS / timeout).
    #[error("api connection: {0}")]
    ApiConnection(String),

    /// The LLM endpoint returned 429.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The LLM endpoint returned a 5xx or an otherwise transient failure.
    #[error("provider internal error: {0}")]
    Internal(String),

    /// The request itself was rejected (4xx, malformed response). Not retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No tool registered under the requested name.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Tool input failed schema validation.
    #[error("invalid tool input: {0}")]
    InvalidInput(String),

    /// The tool ran and failed.
    #[error("tool execution: {0}")]
    ToolExecution(String),

    /// A tool exceeded its per-call timeout.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The operation was interrupted by the session's cancel signal.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// The history cannot be brought under the token budget.
    #[error("context overflow: {needed} tokens needed, budget is {budget}")]
    ContextOverflow { needed: usize, budget: usize },

    #[error("session: {0}")]
    Session(String),
}

impl Error {
    /// Whether the LLM client should retry this error with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ApiConnection(_) | Error::RateLimited(_) | Error::Internal(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds_are_retryable() {
        assert!(Error::ApiConnection("refused".into()).is_retryable());
        assert!(Error::RateLimited("429".into()).is_retryable());
        assert!(Error::Internal("500".into()).is_retryable());
    }

    #[test]
    fn invalid_request_is_not_retryable() {
        assert!(!Error::InvalidRequest("bad schema".into()).is_retryable());
        assert!(!Error::Timeout("tool".into()).is_retryable());
        assert!(!Error::UnknownTool("nope".into()).is_retryable());
    }
}
