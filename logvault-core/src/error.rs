use thiserror::Error;

use crate::blob::StorageError;
use crate::jenkins::CiError;
use crate::secrets::SecretError;

/// Failures that abort a whole phase of the run.
///
/// Per-build and per-job failures never surface as this type; they are
/// reported through [`crate::Outcome::Recoverable`] and dropped by the caller.
#[derive(Error, Debug)]
pub enum ArchiverError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Secret provider error: {0}")]
    Secret(#[from] SecretError),

    #[error("Failed to list jobs: {0}")]
    Enumeration(#[source] CiError),

    #[error("Failed to prepare container '{container}': {source}")]
    StorageSetup {
        container: String,
        #[source]
        source: StorageError,
    },

    #[error("Failed to upload blob '{blob}': {source}")]
    Upload {
        blob: String,
        #[source]
        source: StorageError,
    },

    #[error("Client error: {0}")]
    Client(String),
}
