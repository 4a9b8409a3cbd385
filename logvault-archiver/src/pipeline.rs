//! One archive run: enumerate → fetch → upload.

use chrono::{NaiveDate, Utc};
use logvault_core::{
    ArchiverConfig, ArchiverError, AzureBlobStore, BlobStore, FetchConfig, JenkinsClient,
    Telemetry,
};

use crate::subsystems::fetch::fetch_all_logs;
use crate::subsystems::upload::upload_logs;

#[derive(Debug)]
pub struct RunSummary {
    pub date: NaiveDate,
    pub fetched: usize,
    pub failed: Vec<String>,
    pub skipped_jobs: Vec<String>,
    pub uploaded: Vec<String>,
    pub created_container: bool,
}

/// Build the clients from `config` and run the archive.
///
/// Both clients are constructed before any network activity so that a bad
/// connection string fails the run up front.
pub async fn run(config: &ArchiverConfig, telemetry: &Telemetry) -> Result<RunSummary, ArchiverError> {
    let client = JenkinsClient::new(&config.jenkins, &config.fetch)
        .map_err(|e| ArchiverError::Client(e.to_string()))?;
    let store = AzureBlobStore::from_connection_string(
        &config.storage.connection_string,
        config.fetch.timeout(),
    )
    .map_err(|source| ArchiverError::StorageSetup {
        container: config.storage.container.clone(),
        source,
    })?;

    run_with(&client, &store, &config.storage.container, &config.fetch, telemetry).await
}

pub async fn run_with(
    client: &JenkinsClient,
    store: &dyn BlobStore,
    container: &str,
    fetch: &FetchConfig,
    telemetry: &Telemetry,
) -> Result<RunSummary, ArchiverError> {
    tracing::info!(run_id = %telemetry.run_id(), "Starting archive run");

    let report = fetch_all_logs(client, fetch, telemetry).await?;
    let fetched = report.logs.len();

    // One date stamp for the whole batch.
    let date = Utc::now().date_naive();
    let upload = upload_logs(store, container, &report.logs, date, telemetry).await?;

    tracing::info!(
        fetched,
        failed = report.failed.len(),
        uploaded = upload.blobs.len(),
        container = %upload.container,
        "All logs have been successfully uploaded"
    );

    Ok(RunSummary {
        date,
        fetched,
        failed: report.failed,
        skipped_jobs: report.skipped_jobs,
        uploaded: upload.blobs,
        created_container: upload.created_container,
    })
}
