//! Distro Error Types

use thiserror::Error;

/// Result type alias for distro operations
pub type Result<T> = std::result::Result<T, Error>;

/// Distro error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Wire errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Frame corrupted: {0}")]
    Frame(String),

    // Partitioning errors
    #[error("Cannot partition key {0}: member list is empty")]
    EmptyMemberList(String),

    // Component registry errors
    #[error("No {component} registered for resource type {resource_type}")]
    ComponentNotFound {
        component: &'static str,
        resource_type: String,
    },

    // Transport errors
    #[error("Transport error to {target}: {reason}")]
    Transport { target: String, reason: String },

    #[error("Request to {0} timed out")]
    RequestTimeout(String),

    // Apply errors
    #[error("Failed to apply remote data for key {key}: {reason}")]
    Apply { key: String, reason: String },

    #[error("No local data for key {0}")]
    DataNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transport { .. } | Error::RequestTimeout(_)
        )
    }

    /// Check if this error indicates a missing plugin registration
    /// rather than a runtime data problem
    pub fn is_config_class(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::ConfigParse(_) | Error::ComponentNotFound { .. }
        )
    }
}
