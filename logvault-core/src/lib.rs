pub mod blob;
pub mod config;
pub mod error;
pub mod jenkins;
pub mod models;
pub mod outcome;
pub mod secrets;
pub mod telemetry;

pub use blob::{AzureBlobStore, BlobStore, ConnectionString, StorageError};
pub use config::{ArchiverConfig, FetchConfig, JenkinsConfig, ServiceConfig, StorageConfig};
pub use error::ArchiverError;
pub use jenkins::{CiError, FetchError, JenkinsClient, RetryPolicy};
pub use models::{Build, Job, LogRecord};
pub use outcome::Outcome;
pub use secrets::{
    ChainedSecretProvider, DirectorySecretProvider, EnvSecretProvider, SecretError,
    SecretProvider, StaticSecretProvider,
};
pub use telemetry::Telemetry;
