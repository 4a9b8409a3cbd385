use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::error::ArchiverError;
use crate::secrets::SecretProvider;

pub const JENKINS_URL: &str = "JENKINS_URL";
pub const JENKINS_USER: &str = "JENKINS_USER";
pub const JENKINS_API_TOKEN: &str = "JENKINS_API_TOKEN";
pub const AZURE_CONNECTION_STRING: &str = "AZURE_CONNECTION_STRING";
pub const AZURE_CONTAINER_NAME: &str = "AZURE_CONTAINER_NAME";

#[derive(Debug, Clone)]
pub struct ArchiverConfig {
    pub jenkins: JenkinsConfig,
    pub storage: StorageConfig,
    pub fetch: FetchConfig,
    pub service: ServiceConfig,
}

#[derive(Clone)]
pub struct JenkinsConfig {
    pub url: String,
    pub user: String,
    pub api_token: String,
}

impl fmt::Debug for JenkinsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JenkinsConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct StorageConfig {
    pub connection_string: String,
    pub container: String,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("connection_string", &"<redacted>")
            .field("container", &self.container)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct FetchConfig {
    pub concurrency: usize,
    pub timeout_seconds: u64,
    pub max_attempts: usize,
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            timeout_seconds: 30,
            max_attempts: 5,
            backoff_min_ms: 1000,
            backoff_max_ms: 10_000,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn validate(&self) -> Result<(), ArchiverError> {
        if self.concurrency == 0 {
            return Err(ArchiverError::Configuration(
                "fetch.concurrency must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ArchiverError::Configuration(
                "fetch.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.backoff_min_ms > self.backoff_max_ms {
            return Err(ArchiverError::Configuration(format!(
                "fetch.backoff_min_ms ({}) exceeds fetch.backoff_max_ms ({})",
                self.backoff_min_ms, self.backoff_max_ms
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// File/env shape before required settings are resolved.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawConfig {
    jenkins: RawJenkins,
    storage: RawStorage,
    fetch: FetchConfig,
    service: ServiceConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawJenkins {
    url: Option<String>,
    user: Option<String>,
    api_token: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawStorage {
    connection_string: Option<String>,
    container: Option<String>,
}

impl ArchiverConfig {
    /// Load settings from an optional TOML file and `LOGVAULT__`-prefixed
    /// environment variables, then fill any missing required setting from
    /// `secrets`. Missing or blank required settings are an error.
    pub async fn load(
        path: Option<&str>,
        secrets: &dyn SecretProvider,
    ) -> Result<Self, ArchiverError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Toml).required(false));
        }
        let raw: RawConfig = builder
            .add_source(
                Environment::with_prefix("LOGVAULT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Self::resolve(raw, secrets).await
    }

    async fn resolve(raw: RawConfig, secrets: &dyn SecretProvider) -> Result<Self, ArchiverError> {
        raw.fetch.validate()?;

        let jenkins = JenkinsConfig {
            url: require(raw.jenkins.url, JENKINS_URL, secrets).await?,
            user: require(raw.jenkins.user, JENKINS_USER, secrets).await?,
            api_token: require(raw.jenkins.api_token, JENKINS_API_TOKEN, secrets).await?,
        };
        let storage = StorageConfig {
            connection_string: require(
                raw.storage.connection_string,
                AZURE_CONNECTION_STRING,
                secrets,
            )
            .await?,
            container: require(raw.storage.container, AZURE_CONTAINER_NAME, secrets).await?,
        };

        Ok(Self {
            jenkins,
            storage,
            fetch: raw.fetch,
            service: raw.service,
        })
    }
}

async fn require(
    configured: Option<String>,
    secret_name: &str,
    secrets: &dyn SecretProvider,
) -> Result<String, ArchiverError> {
    let value = match non_blank(configured) {
        Some(v) => Some(v),
        None => non_blank(secrets.get_secret(secret_name).await?),
    };

    value.ok_or_else(|| {
        ArchiverError::Configuration(format!(
            "required setting {} is missing (set it in the config file, the environment, or the secret store)",
            secret_name
        ))
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::StaticSecretProvider;

    fn full_secrets() -> StaticSecretProvider {
        StaticSecretProvider::new()
            .with(JENKINS_URL, "http://ci.local:8080/")
            .with(JENKINS_USER, "archiver")
            .with(JENKINS_API_TOKEN, "token")
            .with(AZURE_CONNECTION_STRING, "UseDevelopmentStorage=true")
            .with(AZURE_CONTAINER_NAME, "jenkins-build-logs")
    }

    #[tokio::test]
    async fn test_resolves_required_settings_from_secrets() {
        let config = ArchiverConfig::resolve(RawConfig::default(), &full_secrets())
            .await
            .unwrap();

        assert_eq!(config.jenkins.url, "http://ci.local:8080/");
        assert_eq!(config.storage.container, "jenkins-build-logs");
        assert_eq!(config.fetch, FetchConfig::default());
        assert_eq!(config.fetch.concurrency, 10);
        assert_eq!(config.fetch.max_attempts, 5);
        assert_eq!(config.service.log_level, "info");
    }

    #[tokio::test]
    async fn test_missing_setting_fails_with_its_name() {
        let secrets = StaticSecretProvider::new()
            .with(JENKINS_URL, "http://ci.local")
            .with(JENKINS_USER, "archiver");

        let err = ArchiverConfig::resolve(RawConfig::default(), &secrets)
            .await
            .unwrap_err();
        match err {
            ArchiverError::Configuration(msg) => assert!(msg.contains(JENKINS_API_TOKEN)),
            other => panic!("Expected Configuration error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blank_setting_is_treated_as_missing() {
        let secrets = full_secrets().with(AZURE_CONNECTION_STRING, "   ");
        let err = ArchiverConfig::resolve(RawConfig::default(), &secrets)
            .await
            .unwrap_err();
        assert!(err.to_string().contains(AZURE_CONNECTION_STRING));
    }

    #[tokio::test]
    async fn test_file_values_override_secrets_and_tune_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logvault.toml");
        std::fs::write(
            &path,
            r#"
[storage]
container = "from-file"

[fetch]
concurrency = 3
backoff_min_ms = 5
backoff_max_ms = 20
"#,
        )
        .unwrap();

        let config = ArchiverConfig::load(path.to_str(), &full_secrets())
            .await
            .unwrap();
        assert_eq!(config.storage.container, "from-file");
        assert_eq!(config.fetch.concurrency, 3);
        assert_eq!(config.fetch.timeout_seconds, 30);
        assert_eq!(config.fetch.backoff_max_ms, 20);
    }

    #[tokio::test]
    async fn test_absent_file_is_not_an_error() {
        let config = ArchiverConfig::load(Some("/nonexistent/logvault.toml"), &full_secrets())
            .await
            .unwrap();
        assert_eq!(config.jenkins.user, "archiver");
    }

    #[test]
    fn test_fetch_validation() {
        let bad = FetchConfig {
            concurrency: 0,
            ..FetchConfig::default()
        };
        assert!(bad.validate().is_err());

        let inverted = FetchConfig {
            backoff_min_ms: 50,
            backoff_max_ms: 10,
            ..FetchConfig::default()
        };
        assert!(inverted.validate().is_err());
        assert!(FetchConfig::default().validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let jenkins = JenkinsConfig {
            url: "http://ci.local".to_string(),
            user: "archiver".to_string(),
            api_token: "hunter2".to_string(),
        };
        assert!(!format!("{:?}", jenkins).contains("hunter2"));
    }
}
