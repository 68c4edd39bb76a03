use thiserror::Error;

/// Failures fetching from, or parsing the response of, an upstream
/// registry. All variants are recoverable from the caller's point of
/// view: a fetch that returns one of these for a single domain/interface
/// does not prevent the reconciliation loop from proceeding with the
/// rest of that tick.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("http request to upstream registry failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to decode upstream response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("upstream reported a non-success status: {status} ({message})")]
    NonSuccess { status: i64, message: String },
}
