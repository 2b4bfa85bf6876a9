//! Parallel fetcher: downloads every listed log object into the scratch directory.
//!
//! Downloads run on a bounded pool (`Limits::fetch_workers`) and are fail-fast:
//! the first failed or timed-out download cancels the rest and is returned with
//! its key. Completion order is not preserved; aggregation imposes its own order.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::config::{Limits, StorageLocation};
use crate::contract::{FetchedLog, FetchedManifest, LogStore};
use crate::error::{PipelineError, Result, StoreError};

/// Local file name for a key: the segment after the last `/`.
///
/// Returns `None` when that segment is empty or would escape the scratch
/// directory (`.`/`..`).
pub fn local_file_name(key: &str) -> Option<&str> {
    let tail = key.rsplit('/').next().unwrap_or(key);
    match tail {
        "" | "." | ".." => None,
        t if t.contains('\\') => None,
        t => Some(t),
    }
}

fn plan_downloads(
    location: &StorageLocation,
    keys: &[String],
    scratch_dir: &Path,
) -> Result<Vec<FetchedLog>> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    let mut plan = Vec::with_capacity(keys.len());
    for key in keys {
        let name = local_file_name(key).ok_or_else(|| PipelineError::Fetch {
            bucket: location.bucket.clone(),
            key: key.clone(),
            path: scratch_dir.to_path_buf(),
            source: StoreError::from("key has no usable file name"),
        })?;
        if let Some(previous) = seen.insert(name, key) {
            return Err(PipelineError::Fetch {
                bucket: location.bucket.clone(),
                key: key.clone(),
                path: scratch_dir.join(name),
                source: StoreError::Other(format!(
                    "local file name collides with key {previous}"
                )),
            });
        }
        plan.push(FetchedLog {
            key: key.clone(),
            local_path: scratch_dir.join(name),
        });
    }
    Ok(plan)
}

/// Download `keys` from `location.bucket` into `scratch_dir`.
///
/// The scratch directory is created if absent. An empty key set yields an
/// empty manifest.
pub async fn fetch_all<S>(
    store: &S,
    location: &StorageLocation,
    keys: &[String],
    scratch_dir: &Path,
    limits: &Limits,
) -> Result<FetchedManifest>
where
    S: LogStore + ?Sized,
{
    tokio::fs::create_dir_all(scratch_dir)
        .await
        .map_err(|e| PipelineError::io(scratch_dir, e))?;

    let plan = plan_downloads(location, keys, scratch_dir)?;
    let workers = limits.fetch_workers();
    let call_timeout = limits.call_timeout();
    info!(
        count = plan.len(),
        workers,
        scratch_dir = %scratch_dir.display(),
        "[FETCH] Starting downloads"
    );

    let logs: Vec<FetchedLog> = stream::iter(plan)
        .map(|log| async move {
            debug!(key = %log.key, path = %log.local_path.display(), "[FETCH] Downloading");
            let outcome =
                tokio::time::timeout(call_timeout, store.get(&location.bucket, &log.key, &log.local_path))
                    .await;
            match outcome {
                Ok(Ok(())) => Ok(log),
                Ok(Err(e)) => {
                    error!(error = %e, key = %log.key, "[FETCH][ERROR] Download failed");
                    Err(PipelineError::Fetch {
                        bucket: location.bucket.clone(),
                        key: log.key,
                        path: log.local_path,
                        source: e,
                    })
                }
                Err(_) => {
                    error!(key = %log.key, "[FETCH][ERROR] Download timed out");
                    Err(PipelineError::Timeout {
                        operation: format!("download of s3://{}/{}", location.bucket, log.key),
                        elapsed: call_timeout,
                    })
                }
            }
        })
        .buffer_unordered(workers)
        .try_collect()
        .await?;

    info!(count = logs.len(), "[FETCH] All downloads complete");
    Ok(FetchedManifest { logs })
}
