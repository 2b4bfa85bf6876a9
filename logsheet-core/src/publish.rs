//! Publisher and the two post-publish cleanup operations.
//!
//! [`publish`] uploads the archive. [`delete_local`] and [`delete_remote`] are
//! idempotent and best-effort: they report failures as
//! [`PipelineError::Cleanup`], which callers log instead of failing the run.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

use crate::config::{Limits, StorageLocation};
use crate::contract::LogStore;
use crate::error::{PipelineError, Result};

pub const ARCHIVE_CONTENT_TYPE: &str = "application/gzip";

/// Where an archive ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedArtifact {
    pub bucket: String,
    pub key: String,
}

/// Destination prefix joined with the archive's file name by a single `/`.
pub fn destination_key(prefix: &str, archive: &Path) -> Option<String> {
    let name = archive.file_name()?.to_str()?;
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        Some(name.to_string())
    } else {
        Some(format!("{prefix}/{name}"))
    }
}

pub async fn publish<S>(
    store: &S,
    destination: &StorageLocation,
    archive: &Path,
    call_timeout: Duration,
) -> Result<PublishedArtifact>
where
    S: LogStore + ?Sized,
{
    let key = destination_key(&destination.prefix, archive).ok_or_else(|| {
        PipelineError::Config(format!(
            "archive path {} has no UTF-8 file name",
            archive.display()
        ))
    })?;
    info!(bucket = %destination.bucket, key = %key, path = %archive.display(), "[PUBLISH] Uploading archive");

    let upload = store.put(archive, &destination.bucket, &key, ARCHIVE_CONTENT_TYPE);
    match tokio::time::timeout(call_timeout, upload).await {
        Ok(Ok(())) => {
            info!(bucket = %destination.bucket, key = %key, "[PUBLISH] Upload succeeded");
            Ok(PublishedArtifact {
                bucket: destination.bucket.clone(),
                key,
            })
        }
        Ok(Err(e)) => {
            error!(error = %e, bucket = %destination.bucket, key = %key, "[PUBLISH][ERROR] Upload failed");
            Err(PipelineError::Publish {
                path: archive.to_path_buf(),
                bucket: destination.bucket.clone(),
                key,
                source: e,
            })
        }
        Err(_) => {
            error!(bucket = %destination.bucket, key = %key, "[PUBLISH][ERROR] Upload timed out");
            Err(PipelineError::Timeout {
                operation: format!("upload to s3://{}/{}", destination.bucket, key),
                elapsed: call_timeout,
            })
        }
    }
}

/// Remove the scratch directory and everything in it. Entries are removed in
/// parallel on a bounded pool, then the directory itself. A missing directory
/// counts as already clean. Returns the number of entries removed.
pub async fn delete_local(dir: &Path, limits: &Limits) -> Result<usize> {
    let cleanup = |message: String| PipelineError::Cleanup {
        target: dir.display().to_string(),
        message,
    };

    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(dir = %dir.display(), "[CLEANUP] Local directory already absent");
            return Ok(0);
        }
        Err(e) => return Err(cleanup(e.to_string())),
    };

    let mut entries = Vec::new();
    while let Some(entry) = read_dir
        .next_entry()
        .await
        .map_err(|e| cleanup(e.to_string()))?
    {
        entries.push(entry.path());
    }

    info!(dir = %dir.display(), count = entries.len(), "[CLEANUP] Deleting local files");
    let removed = entries.len();
    stream::iter(entries)
        .map(|path| async move {
            let is_dir = tokio::fs::symlink_metadata(&path)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            let outcome = if is_dir {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match outcome {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(format!("{}: {e}", path.display())),
            }
        })
        .buffer_unordered(limits.delete_workers())
        .try_collect::<Vec<()>>()
        .await
        .map_err(cleanup)?;

    match tokio::fs::remove_dir(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(cleanup(e.to_string())),
    }
    info!(dir = %dir.display(), removed, "[CLEANUP] Local directory removed");
    Ok(removed)
}

/// Remove published local artifacts (spreadsheet, archive). Files that are
/// already gone are skipped. Returns how many were removed.
pub async fn delete_artifacts(paths: &[PathBuf]) -> Result<usize> {
    let mut removed = 0;
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                error!(error = %e, path = %path.display(), "[CLEANUP][ERROR] Could not remove artifact");
                return Err(PipelineError::Cleanup {
                    target: path.display().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }
    info!(removed, "[CLEANUP] Local artifacts removed");
    Ok(removed)
}

/// Delete every source object under the original listing prefix.
pub async fn delete_remote<S>(
    store: &S,
    source: &StorageLocation,
    call_timeout: Duration,
) -> Result<usize>
where
    S: LogStore + ?Sized,
{
    let cleanup = |message: String| PipelineError::Cleanup {
        target: source.to_string(),
        message,
    };

    info!(bucket = %source.bucket, prefix = %source.prefix, "[CLEANUP] Deleting remote logs");
    let deleted = tokio::time::timeout(call_timeout, store.delete_all(&source.bucket, &source.prefix))
        .await
        .map_err(|_| cleanup(format!("timed out after {}s", call_timeout.as_secs())))?
        .map_err(|e| cleanup(e.to_string()))?;
    info!(bucket = %source.bucket, prefix = %source.prefix, deleted, "[CLEANUP] Remote logs deleted");
    Ok(deleted)
}
