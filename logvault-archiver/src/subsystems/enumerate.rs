//! Job/build enumeration
//!
//! One request for the job list, then one per job for its builds. Only a
//! failed job-list request is fatal; a job whose build list cannot be read
//! is logged and skipped.

use logvault_core::{ArchiverError, Build, CiError, JenkinsClient, Job, Outcome, Telemetry};

/// Flat list of builds plus the jobs that had to be skipped.
#[derive(Debug, Default)]
pub struct Enumeration {
    pub builds: Vec<Build>,
    pub skipped_jobs: Vec<String>,
}

pub async fn enumerate_builds(
    client: &JenkinsClient,
    telemetry: &Telemetry,
) -> Result<Enumeration, ArchiverError> {
    telemetry.scope(enumerate(client)).await
}

async fn enumerate(client: &JenkinsClient) -> Result<Enumeration, ArchiverError> {
    tracing::info!(server = %client.server_url(), "Fetching Jenkins job list");
    let jobs = client.list_jobs().await.map_err(|e| {
        tracing::error!(error = %e, "Error fetching Jenkins job list");
        ArchiverError::Enumeration(e)
    })?;

    if jobs.is_empty() {
        tracing::warn!("No jobs found in Jenkins");
    }

    let mut enumeration = Enumeration::default();
    for job in &jobs {
        match job_builds(client, job).await {
            Outcome::Ok(builds) => enumeration.builds.extend(builds),
            Outcome::Recoverable(e) => {
                tracing::error!(job = %job.name, error = %e, "Error fetching builds for job, skipping");
                enumeration.skipped_jobs.push(job.name.clone());
            }
        }
    }

    tracing::info!(
        jobs = jobs.len(),
        builds = enumeration.builds.len(),
        skipped_jobs = enumeration.skipped_jobs.len(),
        "Enumeration complete"
    );
    Ok(enumeration)
}

async fn job_builds(client: &JenkinsClient, job: &Job) -> Outcome<Vec<Build>, CiError> {
    tracing::debug!(job = %job.name, "Fetching builds for job");
    client.list_builds(job).await.into()
}
