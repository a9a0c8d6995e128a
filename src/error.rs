//! Error handling for the powmesh network
//!
//! One error type covers the seed directory, the peer wire protocol, gossip
//! processing and mining, with helpers for retry decisions and log categories.

use thiserror::Error;

/// Result type alias for powmesh operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for powmesh
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration file loading errors
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Wire protocol violations (bad header, oversized frame, bad payload)
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Errors tied to a specific peer connection
    #[error("Peer {peer}: {message}")]
    Peer { peer: String, message: String },

    /// Seed directory errors
    #[error("Seed directory error: {message}")]
    Seed { message: String },

    /// Proof-of-work errors
    #[error("Mining error: {message}")]
    Mining { message: String },

    /// Worker errors
    #[error("Worker error: {worker_type}: {message}")]
    Worker { worker_type: String, message: String },

    /// Timeout errors
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    /// Network errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Cancellation errors for async operations
    #[error("Operation was cancelled: {operation}")]
    Cancelled { operation: String },

    /// Invalid state errors
    #[error("Invalid state: {message}")]
    InvalidState { message: String },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a peer error
    pub fn peer(peer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Peer {
            peer: peer.into(),
            message: message.into(),
        }
    }

    /// Create a seed directory error
    pub fn seed(message: impl Into<String>) -> Self {
        Self::Seed {
            message: message.into(),
        }
    }

    /// Create a mining error
    pub fn mining(message: impl Into<String>) -> Self {
        Self::Mining {
            message: message.into(),
        }
    }

    /// Create a worker error
    pub fn worker(worker_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Worker {
            worker_type: worker_type.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => {
                if let Some(status) = e.status() {
                    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                } else {
                    // Connection-level failures are usually transient
                    e.is_timeout() || e.is_connect() || e.is_request()
                }
            }
            Error::Io(e) => !matches!(
                e.kind(),
                std::io::ErrorKind::InvalidData | std::io::ErrorKind::InvalidInput
            ),
            Error::Network { .. } => true,
            Error::Timeout { .. } => true,
            Error::Peer { .. } => true,
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::Http(_) => "http",
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::ConfigSource(_) => "config_source",
            Error::Io(_) => "io",
            Error::Config { .. } => "config",
            Error::Protocol { .. } => "protocol",
            Error::Peer { .. } => "peer",
            Error::Seed { .. } => "seed",
            Error::Mining { .. } => "mining",
            Error::Worker { .. } => "worker",
            Error::Timeout { .. } => "timeout",
            Error::Network { .. } => "network",
            Error::Cancelled { .. } => "cancelled",
            Error::InvalidState { .. } => "invalid_state",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_helper_constructors() {
        assert_matches!(Error::protocol("bad header"), Error::Protocol { message } if message == "bad header");
        assert_matches!(Error::peer("10.0.0.1:7001", "closed"), Error::Peer { peer, .. } if peer == "10.0.0.1:7001");
        assert_eq!(
            Error::timeout("liveness probe").to_string(),
            "Operation timed out: liveness probe"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::timeout("write").is_retryable());
        assert!(Error::peer("a", "broken pipe").is_retryable());
        assert!(Error::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)).is_retryable());
        assert!(!Error::Io(std::io::Error::from(std::io::ErrorKind::InvalidData)).is_retryable());
        assert!(!Error::protocol("oversized").is_retryable());
        assert!(!Error::cancelled("mining").is_retryable());
    }

    #[test]
    fn test_categories() {
        assert_eq!(Error::protocol("x").category(), "protocol");
        assert_eq!(Error::seed("x").category(), "seed");
        assert_eq!(Error::mining("x").category(), "mining");
    }
}
