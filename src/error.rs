use thiserror::Error;

/// Main error type for the follower engine
#[derive(Error, Debug)]
pub enum FollowerError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Unsupported role: {0}")]
    UnsupportedRole(String),

    #[error("Unsupported follower mode: {0}")]
    UnsupportedFollowerMode(String),

    #[error("Invalid url: {0}")]
    InvalidUrl(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status: {0}")]
    UnexpectedStatus(u16),

    #[error("Server error: {0}")]
    Server(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl FollowerError {
    /// Transport-class failures degrade to "skip this cycle" instead of surfacing.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            FollowerError::Http(_) | FollowerError::UnexpectedStatus(_) | FollowerError::Json(_)
        )
    }
}

/// Result type alias for FollowerError
pub type Result<T> = std::result::Result<T, FollowerError>;
