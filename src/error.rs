//! Error types for the restarter

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The service dependants document could not be opened or read
    #[error("Failed to read {}: {source}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid YAML or does not match the expected shape
    #[error("Failed to decode service dependants: {0}")]
    DecodeError(#[from] serde_yaml::Error),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
