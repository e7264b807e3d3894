// Error handling for the packet feeder

use std::fmt;

/// Feeder error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The packet source could not be opened
    OpenError(String),

    /// Priming found no playable content
    NoContent,

    /// IO error
    IoError(String),

    /// The playback consumer rejected an operation
    QueueError(String),

    /// Invalid lifecycle state or missing session
    InvalidState(String),

    /// Rejected configuration value
    InvalidConfig(String),
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FeedError::OpenError(msg) => write!(f, "Open error: {}", msg),
            FeedError::NoContent => write!(f, "No content: source yielded no whole packet"),
            FeedError::IoError(msg) => write!(f, "IO error: {}", msg),
            FeedError::QueueError(msg) => write!(f, "Queue error: {}", msg),
            FeedError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            FeedError::InvalidConfig(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for FeedError {}

/// Result type alias for feeder operations
pub type Result<T> = std::result::Result<T, FeedError>;

impl From<std::io::Error> for FeedError {
    fn from(err: std::io::Error) -> Self {
        FeedError::IoError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let err: FeedError =
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short").into();
        assert_eq!(err, FeedError::IoError("short".to_string()));
        assert_eq!(err.to_string(), "IO error: short");
    }
}
