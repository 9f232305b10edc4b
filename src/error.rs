use thiserror::Error;

/// Top-level error type for the simulator binary and library.
///
/// Malformed messages inside a run are never surfaced here: invalid blocks
/// and transactions are dropped silently at the receiving peer. Errors exist
/// only at the edges (parameter validation, artifact I/O).
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SimError {
    fn from(err: serde_json::Error) -> Self {
        SimError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for SimError {
    fn from(err: toml::de::Error) -> Self {
        SimError::Serialization(err.to_string())
    }
}
