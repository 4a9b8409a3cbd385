//! Secret providers — where credentials and connection strings come from
//!
//! Providers answer `Ok(None)` for names they do not hold so that several
//! can be chained; the first provider holding a value wins.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("Failed to read secret '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Source of named secret values.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Look up a secret. Returns `None` if this provider does not hold it.
    async fn get_secret(&self, name: &str) -> Result<Option<String>, SecretError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// Reads secrets from the process environment.
#[derive(Debug, Default, Clone)]
pub struct EnvSecretProvider;

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn get_secret(&self, name: &str) -> Result<Option<String>, SecretError> {
        Ok(std::env::var(name).ok())
    }

    fn name(&self) -> &str {
        "env"
    }
}

/// Reads secrets from one-file-per-secret mounts such as `/run/secrets`.
#[derive(Debug, Clone)]
pub struct DirectorySecretProvider {
    dir: PathBuf,
}

impl DirectorySecretProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SecretProvider for DirectorySecretProvider {
    async fn get_secret(&self, name: &str) -> Result<Option<String>, SecretError> {
        // Names are plain identifiers; refuse anything that could walk out of the dir.
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Ok(None);
        }

        match tokio::fs::read_to_string(self.dir.join(name)).await {
            Ok(value) => Ok(Some(value.trim_end_matches(['\r', '\n']).to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SecretError::Io {
                name: name.to_string(),
                source,
            }),
        }
    }

    fn name(&self) -> &str {
        "directory"
    }
}

/// Fixed in-memory secrets.
#[derive(Debug, Default, Clone)]
pub struct StaticSecretProvider {
    values: HashMap<String, String>,
}

impl StaticSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

#[async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn get_secret(&self, name: &str) -> Result<Option<String>, SecretError> {
        Ok(self.values.get(name).cloned())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Queries each provider in order and returns the first value found.
#[derive(Default)]
pub struct ChainedSecretProvider {
    providers: Vec<Box<dyn SecretProvider>>,
}

impl ChainedSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, provider: impl SecretProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }
}

#[async_trait]
impl SecretProvider for ChainedSecretProvider {
    async fn get_secret(&self, name: &str) -> Result<Option<String>, SecretError> {
        for provider in &self.providers {
            if let Some(value) = provider.get_secret(name).await? {
                tracing::debug!(secret = name, provider = provider.name(), "Resolved secret");
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn name(&self) -> &str {
        "chain"
    }
}
