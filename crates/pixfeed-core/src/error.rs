/// Core error types for the feed pipeline.
use std::fmt;

/// A specialized Result type for pixfeed operations.
pub type FeedResult<T> = Result<T, FeedError>;

/// Every way a feed request can fail.
///
/// Each variant maps to one stage of the pipeline. The HTTP layer renders all
/// of them the same way (500 with the `Display` text), so messages are meant
/// to be read by a human looking at the response body.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("upstream fetch failed: {0}")]
    Fetch(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("missing codec capability: {0}")]
    Capability(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("GIF post-processing failed: {0}")]
    PostProcess(String),

    #[error("filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl FeedError {
    /// Create a fetch error, prefixed with the URL that was requested.
    pub fn fetch(url: &str, message: impl fmt::Display) -> Self {
        FeedError::Fetch(format!("{}: {}", url, message))
    }

    /// Short machine-friendly name of the error kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            FeedError::Fetch(_) => "fetch",
            FeedError::Decode(_) => "decode",
            FeedError::Capability(_) => "capability",
            FeedError::Encode(_) => "encode",
            FeedError::PostProcess(_) => "post_process",
            FeedError::Filesystem(_) => "filesystem",
            FeedError::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        let err = FeedError::fetch("http://upstream/next", "connection refused");
        assert_eq!(
            err.to_string(),
            "upstream fetch failed: http://upstream/next: connection refused"
        );
        assert_eq!(err.kind(), "fetch");
    }

    #[test]
    fn test_io_error_converts_to_filesystem() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: FeedError = io.into();
        assert!(matches!(err, FeedError::Filesystem(_)));
        assert!(err.to_string().contains("gone"));
    }
}
