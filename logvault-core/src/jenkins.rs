//! Jenkins HTTP API client
//!
//! Three calls are used:
//! - `GET {server}/api/json` → job list
//! - `GET {job_url}api/json` → build list of one job
//! - `GET {build_url}consoleText` → raw console log, retried with backoff

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::Retry;

use crate::config::{FetchConfig, JenkinsConfig};
use crate::models::{Build, Job, LogRecord};
use crate::outcome::Outcome;

// ============================================================================
// Error types
// ============================================================================

/// Failure of a single CI HTTP call.
#[derive(Error, Debug)]
pub enum CiError {
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Invalid response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Terminal failure of one build's log fetch. Never fatal to the run.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to fetch log for {log_id} after {attempts} attempts: {last_error}")]
    Exhausted {
        log_id: String,
        attempts: usize,
        #[source]
        last_error: CiError,
    },

    #[error("Log for {log_id} is empty")]
    EmptyLog { log_id: String },
}

impl FetchError {
    pub fn log_id(&self) -> &str {
        match self {
            FetchError::Exhausted { log_id, .. } | FetchError::EmptyLog { log_id } => log_id,
        }
    }
}

// ============================================================================
// Retry policy
// ============================================================================

/// Doubling backoff between `min_delay` and `max_delay`, `max_attempts` tries in total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delays slept between attempts; one fewer than `max_attempts`.
    ///
    /// `min, 2·min, 4·min, ...` capped at `max_delay`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let min_ms = u64::try_from(self.min_delay.as_millis()).unwrap_or(u64::MAX);
        let doubling = ExponentialBackoff::from_millis(2)
            .factor(min_ms)
            .max_delay(self.max_delay);

        std::iter::once(self.min_delay.min(self.max_delay))
            .chain(doubling)
            .take(self.max_attempts.saturating_sub(1))
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            min_delay: Duration::from_millis(config.backoff_min_ms),
            max_delay: Duration::from_millis(config.backoff_max_ms),
        }
    }
}

// ============================================================================
// Jenkins API structs (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct JobList {
    #[serde(default)]
    jobs: Vec<Job>,
}

#[derive(Debug, Deserialize)]
struct BuildList {
    #[serde(default)]
    builds: Vec<BuildRef>,
}

#[derive(Debug, Deserialize)]
struct BuildRef {
    number: u64,
    url: String,
}

// ============================================================================
// JenkinsClient
// ============================================================================

/// Authenticated Jenkins client. Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct JenkinsClient {
    client: Client,
    server_url: String,
    user: String,
    api_token: String,
    retry: RetryPolicy,
}

impl JenkinsClient {
    pub fn new(config: &JenkinsConfig, fetch: &FetchConfig) -> Result<Self, CiError> {
        let client = Client::builder()
            .timeout(fetch.timeout())
            .build()
            .map_err(|source| CiError::Http {
                url: config.url.clone(),
                source,
            })?;

        Ok(Self {
            client,
            server_url: config.url.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            api_token: config.api_token.clone(),
            retry: RetryPolicy::from(fetch),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// List every job on the server. A missing `jobs` field is an empty list.
    pub async fn list_jobs(&self) -> Result<Vec<Job>, CiError> {
        let url = format!("{}/api/json", self.server_url);
        let list: JobList = self.get_json(&url).await?;
        Ok(list.jobs)
    }

    /// List the builds of one job.
    pub async fn list_builds(&self, job: &Job) -> Result<Vec<Build>, CiError> {
        let list: BuildList = self.get_json(&job.api_url()).await?;
        Ok(list
            .builds
            .into_iter()
            .map(|b| Build {
                job_name: job.name.clone(),
                number: b.number,
                url: b.url,
            })
            .collect())
    }

    /// Fetch a build's console log, retrying transient failures.
    ///
    /// Non-2xx statuses and transport errors are retried until the policy is
    /// exhausted. An empty body is not retried and yields no record.
    pub async fn fetch_console_log(&self, build: &Build) -> Outcome<LogRecord, FetchError> {
        let url = build.console_url();
        let log_id = build.log_id();
        let attempts = AtomicUsize::new(0);

        let result = {
            let (url, log_id, attempts) = (url.as_str(), log_id.as_str(), &attempts);
            Retry::spawn(self.retry.delays(), move || {
                let n = attempts.fetch_add(1, Ordering::Relaxed) + 1;
                self.fetch_once(log_id, url, n)
            })
            .await
        };

        match result {
            Ok(content) if content.is_empty() => {
                tracing::warn!(log_id = %log_id, "Console log is empty, skipping");
                Outcome::Recoverable(FetchError::EmptyLog { log_id })
            }
            Ok(content) => {
                tracing::info!(job = %build.job_name, build = build.number, url = %url, "Fetched log");
                Outcome::Ok(LogRecord::new(build, content))
            }
            Err(last_error) => {
                let attempts = attempts.load(Ordering::Relaxed);
                tracing::error!(
                    log_id = %log_id,
                    attempts,
                    error = %last_error,
                    "All log fetch attempts failed"
                );
                Outcome::Recoverable(FetchError::Exhausted {
                    log_id,
                    attempts,
                    last_error,
                })
            }
        }
    }

    async fn fetch_once(&self, log_id: &str, url: &str, attempt: usize) -> Result<String, CiError> {
        let result = async {
            let response = self.send(url).await?;
            response.text().await.map_err(|source| CiError::Http {
                url: url.to_string(),
                source,
            })
        }
        .await;

        if let Err(e) = &result {
            tracing::error!(log_id = %log_id, attempt, error = %e, "Error fetching log");
        }
        result
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, CiError> {
        let body = self
            .send(url)
            .await?
            .text()
            .await
            .map_err(|source| CiError::Http {
                url: url.to_string(),
                source,
            })?;

        serde_json::from_str(&body).map_err(|e| CiError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, CiError> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.user, Some(&self.api_token))
            .send()
            .await
            .map_err(|source| CiError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CiError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{basic_auth, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer, max_attempts: usize) -> JenkinsClient {
        client_with_timeout(server, max_attempts, 5)
    }

    fn client_with_timeout(
        server: &MockServer,
        max_attempts: usize,
        timeout_seconds: u64,
    ) -> JenkinsClient {
        let jenkins = JenkinsConfig {
            url: format!("{}/", server.uri()),
            user: "archiver".to_string(),
            api_token: "token".to_string(),
        };
        let fetch = FetchConfig {
            concurrency: 2,
            timeout_seconds,
            max_attempts,
            backoff_min_ms: 1,
            backoff_max_ms: 4,
        };
        JenkinsClient::new(&jenkins, &fetch).expect("Failed to create client")
    }

    fn build(server: &MockServer, job: &str, number: u64) -> Build {
        Build {
            job_name: job.to_string(),
            number,
            url: format!("{}/job/{}/{}/", server.uri(), job, number),
        }
    }

    #[test]
    fn test_retry_delays_double_up_to_ceiling() {
        let policy = RetryPolicy::from(&FetchConfig::default());
        let delays: Vec<u64> = policy.delays().map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8]);

        let long = RetryPolicy {
            max_attempts: 7,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        };
        let delays: Vec<u64> = long.delays().map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);

        let odd = RetryPolicy {
            max_attempts: 4,
            min_delay: Duration::from_millis(3),
            max_delay: Duration::from_millis(10),
        };
        let delays: Vec<u128> = odd.delays().map(|d| d.as_millis()).collect();
        assert_eq!(delays, vec![3, 6, 10]);

        let single = RetryPolicy {
            max_attempts: 1,
            ..long
        };
        assert_eq!(single.delays().count(), 0);
    }

    #[tokio::test]
    async fn test_list_jobs_uses_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/json"))
            .and(basic_auth("archiver", "token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "_class": "hudson.model.Hudson",
                "jobs": [
                    { "_class": "hudson.model.FreeStyleProject", "name": "A", "url": "http://ci/job/A/", "color": "blue" },
                    { "name": "B", "url": "http://ci/job/B/" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let jobs = test_client(&server, 1).list_jobs().await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].name, "A");
        assert_eq!(jobs[1].url, "http://ci/job/B/");
    }

    #[tokio::test]
    async fn test_list_jobs_missing_field_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let jobs = test_client(&server, 1).list_jobs().await.unwrap();
        assert!(jobs.is_empty());
    }

    #[tokio::test]
    async fn test_list_jobs_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        match test_client(&server, 1).list_jobs().await {
            Err(CiError::Status { status, .. }) => assert_eq!(status, 401),
            other => panic!("Expected Status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_jobs_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;

        assert!(matches!(
            test_client(&server, 1).list_jobs().await,
            Err(CiError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_builds_tags_job_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/job/A/api/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "builds": [
                    { "number": 2, "url": format!("{}/job/A/2/", server.uri()) },
                    { "number": 1, "url": format!("{}/job/A/1/", server.uri()) }
                ]
            })))
            .mount(&server)
            .await;

        let job = Job {
            name: "A".to_string(),
            url: format!("{}/job/A/", server.uri()),
        };
        let builds = test_client(&server, 1).list_builds(&job).await.unwrap();
        assert_eq!(builds.len(), 2);
        assert!(builds.iter().all(|b| b.job_name == "A"));
        assert_eq!(builds[0].log_id(), "A_2");
    }

    #[tokio::test]
    async fn test_fetch_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/job/A/1/consoleText"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/job/A/1/consoleText"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Started by user\nFinished: SUCCESS\n"))
            .expect(1)
            .mount(&server)
            .await;

        let record = test_client(&server, 5)
            .fetch_console_log(&build(&server, "A", 1))
            .await
            .ok()
            .expect("Expected a log record after retries");
        assert_eq!(record.id(), "A_1");
        assert!(record.content.contains("Finished: SUCCESS"));
    }

    #[tokio::test]
    async fn test_fetch_exhausts_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/job/A/3/consoleText"))
            .respond_with(ResponseTemplate::new(500))
            .expect(5)
            .mount(&server)
            .await;

        match test_client(&server, 5)
            .fetch_console_log(&build(&server, "A", 3))
            .await
        {
            Outcome::Recoverable(FetchError::Exhausted {
                log_id,
                attempts,
                last_error,
            }) => {
                assert_eq!(log_id, "A_3");
                assert_eq!(attempts, 5);
                assert!(matches!(last_error, CiError::Status { status: 500, .. }));
            }
            other => panic!("Expected Exhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/job/A/5/consoleText"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("slow")
                    .set_delay(Duration::from_millis(1500)),
            )
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/job/A/5/consoleText"))
            .respond_with(ResponseTemplate::new(200).set_body_string("fast"))
            .expect(1)
            .mount(&server)
            .await;

        let record = client_with_timeout(&server, 3, 1)
            .fetch_console_log(&build(&server, "A", 5))
            .await
            .ok()
            .expect("Timed-out attempt should be retried");
        assert_eq!(record.content, "fast");
    }

    #[tokio::test]
    async fn test_fetch_empty_log_is_skipped_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/job/A/4/consoleText"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .expect(1)
            .mount(&server)
            .await;

        match test_client(&server, 5)
            .fetch_console_log(&build(&server, "A", 4))
            .await
        {
            Outcome::Recoverable(e @ FetchError::EmptyLog { .. }) => assert_eq!(e.log_id(), "A_4"),
            other => panic!("Expected EmptyLog, got {:?}", other),
        }
    }
}
