use thiserror::Error;

/// Failures while listing images from a remote source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Cloud name, API key or secret is not configured.
    #[error("missing cloudinary credential: {0}")]
    MissingCredential(&'static str),

    /// Transport-level failure (DNS, TLS, timeout, connection reset).
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("image API returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not match the expected shape.
    #[error("malformed image API response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Rejected control input from the presentation layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    /// Only the enumerated playback intervals are accepted.
    #[error("unsupported interval {0} ms (expected one of 3000, 5000, 8000, 10000)")]
    UnsupportedInterval(u64),

    /// The engine task is gone or was never started.
    #[error("slideshow is not running")]
    NotRunning,
}
