//! Archive uploader
//!
//! Ensures the container exists, then writes each log as
//! `{log_id}_{YYYY-MM-DD}.txt`, overwriting any blob of the same name.
//! Unlike fetching, any upload failure aborts the rest of the batch.

use chrono::NaiveDate;
use logvault_core::{ArchiverError, BlobStore, Telemetry};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct UploadReport {
    pub container: String,
    pub created_container: bool,
    pub blobs: Vec<String>,
}

pub fn archive_blob_name(log_id: &str, date: NaiveDate) -> String {
    format!("{}_{}.txt", log_id, date.format("%Y-%m-%d"))
}

/// Make sure `container` exists. Returns `true` if a create was issued.
///
/// A failed probe still falls through to a create attempt; only the
/// create failing is fatal.
pub async fn ensure_container(store: &dyn BlobStore, container: &str) -> Result<bool, ArchiverError> {
    match store.container_exists(container).await {
        Ok(true) => {
            tracing::info!(container, "Container already exists");
            return Ok(false);
        }
        Ok(false) => tracing::warn!(container, "Container does not exist, creating it"),
        Err(e) => tracing::warn!(container, error = %e, "Container probe failed, attempting create"),
    }

    store.create_container(container).await.map_err(|source| {
        tracing::error!(container, error = %source, "Error creating container");
        ArchiverError::StorageSetup {
            container: container.to_string(),
            source,
        }
    })?;
    Ok(true)
}

/// Upload every log under one date stamp.
pub async fn upload_logs(
    store: &dyn BlobStore,
    container: &str,
    logs: &BTreeMap<String, String>,
    date: NaiveDate,
    telemetry: &Telemetry,
) -> Result<UploadReport, ArchiverError> {
    telemetry.scope(upload(store, container, logs, date)).await
}

async fn upload(
    store: &dyn BlobStore,
    container: &str,
    logs: &BTreeMap<String, String>,
    date: NaiveDate,
) -> Result<UploadReport, ArchiverError> {
    tracing::info!(backend = store.name(), container, logs = logs.len(), "Uploading logs");

    let created_container = ensure_container(store, container).await?;
    let mut blobs = Vec::with_capacity(logs.len());

    for (log_id, content) in logs {
        let blob = archive_blob_name(log_id, date);
        tracing::info!(blob = %blob, "Uploading log");

        if let Err(source) = store.put_blob(container, &blob, content.clone()).await {
            tracing::error!(blob = %blob, error = %source, "Error uploading blob");
            return Err(ArchiverError::Upload { blob, source });
        }
        blobs.push(blob);
    }

    Ok(UploadReport {
        container: container.to_string(),
        created_container,
        blobs,
    })
}
