

use thiserror::Error;

use super::models::CollectionKey;


#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{collaborator} unavailable: {reason}")]
    CollaboratorUnavailable {
        collaborator: &'static str,
        reason: String,
    },

    #[error("Malformed extraction output: {0}")]
    MalformedExtraction(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(CollectionKey),

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub fn unavailable(collaborator: &'static str, reason: impl ToString) -> Self {
        Self::CollaboratorUnavailable {
            collaborator,
            reason: reason.to_string(),
        }
    }

    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::CollaboratorUnavailable { .. })
    }
}

impl From<config::ConfigError> for RagError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}


pub type Result<T> = std::result::Result<T, RagError>;
