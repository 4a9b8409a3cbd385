//! Fetch orchestrator
//!
//! Enumerates builds, then fetches every console log on a bounded pool of
//! tasks. Tasks are never cancelled; the collecting loop is the only writer
//! of the result map and drains tasks in completion order.

use logvault_core::{
    ArchiverError, Build, FetchConfig, FetchError, JenkinsClient, LogRecord, Outcome, Telemetry,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::subsystems::enumerate::enumerate_builds;

type FetchTasks = JoinSet<Outcome<LogRecord, FetchError>>;

#[derive(Debug, Default)]
pub struct FetchReport {
    /// Log text keyed by `{job_name}_{build_number}`.
    pub logs: BTreeMap<String, String>,
    /// Log ids that were exhausted, empty, or whose task panicked.
    pub failed: Vec<String>,
    pub skipped_jobs: Vec<String>,
}

/// Enumerate and fetch every build's log. Only enumeration failure is fatal.
pub async fn fetch_all_logs(
    client: &JenkinsClient,
    config: &FetchConfig,
    telemetry: &Telemetry,
) -> Result<FetchReport, ArchiverError> {
    let enumeration = enumerate_builds(client, telemetry).await?;
    let mut report = fetch_builds(client, enumeration.builds, config.concurrency, telemetry).await;
    report.skipped_jobs = enumeration.skipped_jobs;
    Ok(report)
}

/// Fetch `builds` with at most `concurrency` requests in flight.
pub async fn fetch_builds(
    client: &JenkinsClient,
    builds: Vec<Build>,
    concurrency: usize,
    telemetry: &Telemetry,
) -> FetchReport {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = FetchTasks::new();
    let mut pending = BTreeSet::new();

    telemetry.in_scope(|| {
        tracing::info!(builds = builds.len(), concurrency, "Fetching console logs");
    });

    for build in builds {
        pending.insert(build.log_id());
        let client = client.clone();
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(telemetry.scope(async move {
            // The semaphore is never closed, so acquiring cannot fail.
            let _permit = semaphore.acquire_owned().await;
            client.fetch_console_log(&build).await
        }));
    }

    telemetry.scope(collect(tasks, pending)).await
}

/// Drain `tasks` into a report. Ids still in `pending` once every task has
/// finished belong to tasks that panicked.
async fn collect(mut tasks: FetchTasks, mut pending: BTreeSet<String>) -> FetchReport {
    let mut report = FetchReport::default();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Outcome::Ok(record)) => {
                let log_id = record.id();
                pending.remove(&log_id);
                report.logs.insert(log_id, record.content);
            }
            Ok(Outcome::Recoverable(e)) => {
                tracing::error!(log_id = %e.log_id(), error = %e, "Error processing log, excluding it");
                pending.remove(e.log_id());
                report.failed.push(e.log_id().to_string());
            }
            Err(e) => tracing::error!(error = %e, "Fetch task did not complete"),
        }
    }

    for log_id in pending {
        tracing::error!(log_id = %log_id, "Fetch task panicked, excluding log");
        report.failed.push(log_id);
    }

    tracing::info!(
        fetched = report.logs.len(),
        failed = report.failed.len(),
        "Log fetch complete"
    );
    report
}
