use thiserror::Error;

/// Top-level error type for the estate record model and configuration.
#[derive(Error, Debug)]
pub enum EstateError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid natural key for {kind}: {reason}")]
    InvalidKey { kind: String, reason: String },

    #[error("Unknown node kind: {0}")]
    UnknownKind(String),

    #[error("Unknown edge kind: {0}")]
    UnknownEdgeKind(String),

    #[error("Collectors may not write {0}")]
    CollectorForbidden(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<config::ConfigError> for EstateError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EstateError>;
