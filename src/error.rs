//! Error types for the audio cache server

use thiserror::Error;

/// Result type alias for server operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// Error types that can occur while fetching, storing or serving an asset
#[derive(Error, Debug, Clone)]
pub enum StreamError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Transcode failed: {0}")]
    TranscodeFailed(String),

    #[error("Asset {0} is being fetched and is not ready yet")]
    AssetNotReady(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Malformed range: {0}")]
    MalformedRange(String),

    #[error("Unsatisfiable range: start {start} is beyond size {size}")]
    UnsatisfiableRange { start: u64, size: u64 },

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Missing query parameter: {0}")]
    MissingParameter(String),

    #[error("Fetch timed out: {0}")]
    Timeout(String),

    #[error("Search error: {0}")]
    SearchError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::StorageError(err.to_string())
    }
}

impl StreamError {
    /// Whether a client may reasonably retry the same request later
    ///
    /// Transient conditions are an upstream outage, a fetch that is still
    /// running for someone else, and a fetch that ran out of time. Everything
    /// else will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            StreamError::SourceUnavailable(_) => true,
            StreamError::AssetNotReady(_) => true,
            StreamError::Timeout(_) => true,

            StreamError::ConfigError(_) => false,
            StreamError::TranscodeFailed(_) => false,
            StreamError::StorageError(_) => false,
            StreamError::MalformedRange(_) => false,
            StreamError::UnsatisfiableRange { .. } => false,
            StreamError::InvalidIdentifier(_) => false,
            StreamError::MissingParameter(_) => false,
            StreamError::SearchError(_) => false,
            StreamError::HttpError(_) => false,
            StreamError::InternalError(_) => false,
        }
    }

    /// Convert error to HTTP status code
    ///
    /// - Boundary validation failures: 400
    /// - Range problems: 416 Range Not Satisfiable
    /// - Upstream content or search failures: 502 Bad Gateway
    /// - Fetch owned by another request: 503 Service Unavailable
    /// - Fetch time limit exceeded: 504 Gateway Timeout
    /// - Everything else: 500
    pub fn to_http_status(&self) -> u16 {
        match self {
            StreamError::InvalidIdentifier(_) => 400,
            StreamError::MissingParameter(_) => 400,

            StreamError::MalformedRange(_) => 416,
            StreamError::UnsatisfiableRange { .. } => 416,

            StreamError::SourceUnavailable(_) => 502,
            StreamError::SearchError(_) => 502,

            StreamError::AssetNotReady(_) => 503,
            StreamError::Timeout(_) => 504,

            StreamError::ConfigError(_) => 500,
            StreamError::TranscodeFailed(_) => 500,
            StreamError::StorageError(_) => 500,
            StreamError::HttpError(_) => 500,
            StreamError::InternalError(_) => 500,
        }
    }

    /// Short label used for the `result` dimension of fetch metrics
    pub fn kind(&self) -> &'static str {
        match self {
            StreamError::ConfigError(_) => "config",
            StreamError::SourceUnavailable(_) => "source_unavailable",
            StreamError::TranscodeFailed(_) => "transcode_failed",
            StreamError::AssetNotReady(_) => "asset_not_ready",
            StreamError::StorageError(_) => "storage",
            StreamError::MalformedRange(_) => "malformed_range",
            StreamError::UnsatisfiableRange { .. } => "unsatisfiable_range",
            StreamError::InvalidIdentifier(_) => "invalid_identifier",
            StreamError::MissingParameter(_) => "missing_parameter",
            StreamError::Timeout(_) => "timeout",
            StreamError::SearchError(_) => "search",
            StreamError::HttpError(_) => "http",
            StreamError::InternalError(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_maps_to_storage() {
        let err: StreamError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, StreamError::StorageError(_)));
        assert_eq!(err.to_http_status(), 500);
    }

    #[test]
    fn test_unsatisfiable_range_message() {
        let err = StreamError::UnsatisfiableRange { start: 2000, size: 1000 };
        assert_eq!(
            err.to_string(),
            "Unsatisfiable range: start 2000 is beyond size 1000"
        );
    }
}
