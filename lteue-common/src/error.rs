//! Error types for lteue

use thiserror::Error;

/// Error types for the lteue workspace.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors (config files, interfaces).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing errors.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// Invalid state machine transition or engine state.
    #[error("State error: {0}")]
    State(String),

    /// Stack initialization or shutdown failure.
    #[error("Stack error: {0}")]
    Stack(String),

    /// Lower-layer interface failure reported by a collaborator.
    #[error("Interface error: {0}")]
    Interface(String),
}
