//! High-level pipeline: list → fetch → aggregate → convert → package → publish → cleanup.
//!
//! Each stage is also exposed on its own so the command-line adapter can run
//! single steps (`--download-logs`, `--convert-to-excel`, ...). [`run_batch`]
//! chains them with these guarantees:
//!
//! - aggregation only starts after every download finished, and conversion
//!   only after aggregation finished;
//! - nothing is deleted, locally or remotely, unless the archive was uploaded
//!   (or, without a destination, the spreadsheet was written);
//! - cleanup failures are logged and collected in the report, never returned;
//! - the whole run and every remote call are bounded by the configured timeouts.
//!
//! The caller owns the [`LogStore`]; the pipeline never builds one itself.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::aggregate::{aggregate, discover_local_logs, AggregatedTable};
use crate::config::{PipelineConfig, StorageLocation};
use crate::contract::{FetchedManifest, LogStore};
use crate::convert::convert_to_spreadsheet;
use crate::download::fetch_all;
use crate::error::{PipelineError, Result};
use crate::listing::list_log_keys;
use crate::package::package;
use crate::publish::{delete_local, delete_remote, publish, PublishedArtifact};

/// Output of the aggregate + convert step.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub files_aggregated: usize,
    pub rows_aggregated: usize,
    pub spreadsheet: PathBuf,
}

/// Everything a batch run did.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub files_fetched: usize,
    pub rows_aggregated: usize,
    pub spreadsheet: Option<PathBuf>,
    pub archive: Option<PathBuf>,
    pub published: Option<PublishedArtifact>,
    pub local_entries_deleted: usize,
    pub remote_objects_deleted: usize,
    pub cleanup_warnings: Vec<String>,
}

async fn within<T, F>(limit: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            error!(operation, seconds = limit.as_secs(), "[PIPELINE][ERROR] Timed out");
            Err(PipelineError::Timeout {
                operation: operation.to_string(),
                elapsed: limit,
            })
        }
    }
}

async fn blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))?
}

/// List the source prefix and download every object into the scratch directory.
pub async fn download_logs<S>(store: &S, config: &PipelineConfig) -> Result<FetchedManifest>
where
    S: LogStore + ?Sized,
{
    info!(source = %config.source, "[PIPELINE] Downloading access logs");
    let keys = within(
        config.limits.call_timeout(),
        "listing source logs",
        list_log_keys(store, &config.source),
    )
    .await?;
    fetch_all(
        store,
        &config.source,
        &keys,
        &config.scratch_dir,
        &config.limits,
    )
    .await
}

/// Aggregate logs and render the spreadsheet.
///
/// With a manifest, exactly the fetched files are aggregated; without one the
/// scratch directory is scanned for `.gz` files left by an earlier download.
pub async fn convert_logs(
    config: &PipelineConfig,
    manifest: Option<&FetchedManifest>,
    now: DateTime<Utc>,
) -> Result<Conversion> {
    let paths = match manifest {
        Some(m) => m.sorted_paths(),
        None => {
            let dir = config.scratch_dir.clone();
            blocking(move || discover_local_logs(&dir)).await?
        }
    };
    let files_aggregated = paths.len();

    let table: AggregatedTable = blocking(move || aggregate(&paths)).await?;
    let rows_aggregated = table.data_row_count();

    let scratch = config.scratch_dir.clone();
    let output = config.output_dir.clone();
    let spreadsheet =
        blocking(move || convert_to_spreadsheet(&table, &scratch, &output, now)).await?;

    Ok(Conversion {
        files_aggregated,
        rows_aggregated,
        spreadsheet,
    })
}

pub async fn delete_local_logs(config: &PipelineConfig) -> Result<usize> {
    delete_local(&config.scratch_dir, &config.limits).await
}

pub async fn delete_remote_logs<S>(store: &S, config: &PipelineConfig) -> Result<usize>
where
    S: LogStore + ?Sized,
{
    delete_remote(store, &config.source, config.limits.call_timeout()).await
}

/// Run the whole job: download, convert, publish, then clean up.
///
/// Without a destination the spreadsheet stays in `output_dir` and cleanup
/// follows the conversion directly. The pipeline timeout bounds everything up
/// to and including the upload; cleanup calls carry only their own timeouts,
/// so a slow delete never turns a delivered report into a failed run.
pub async fn run_batch<S>(
    store: &S,
    config: &PipelineConfig,
    now: DateTime<Utc>,
) -> Result<BatchReport>
where
    S: LogStore + ?Sized,
{
    validate(config)?;
    let mut report = within(
        config.limits.pipeline_timeout(),
        "batch pipeline",
        produce_report(store, config, now),
    )
    .await?;
    clean_up(store, config, &mut report).await;

    info!(
        files = report.files_fetched,
        rows = report.rows_aggregated,
        published = report.published.as_ref().map(|p| p.key.as_str()).unwrap_or("<local only>"),
        warnings = report.cleanup_warnings.len(),
        "[BATCH] Batch pipeline complete"
    );
    Ok(report)
}

async fn produce_report<S>(
    store: &S,
    config: &PipelineConfig,
    now: DateTime<Utc>,
) -> Result<BatchReport>
where
    S: LogStore + ?Sized,
{
    info!("[BATCH] Starting batch pipeline");
    let mut report = BatchReport::default();

    let manifest = download_logs(store, config).await?;
    report.files_fetched = manifest.len();

    let conversion = convert_logs(config, Some(&manifest), now).await?;
    report.rows_aggregated = conversion.rows_aggregated;
    report.spreadsheet = Some(conversion.spreadsheet.clone());

    if let Some(destination) = &config.destination {
        let artifact = conversion.spreadsheet.clone();
        let archive = blocking(move || package(&artifact)).await?;
        report.archive = Some(archive.clone());
        let published =
            publish(store, destination, &archive, config.limits.call_timeout()).await?;
        report.published = Some(published);
    } else {
        info!("[BATCH] No destination configured; keeping spreadsheet locally");
    }
    Ok(report)
}

async fn clean_up<S>(store: &S, config: &PipelineConfig, report: &mut BatchReport)
where
    S: LogStore + ?Sized,
{
    match delete_local_logs(config).await {
        Ok(n) => report.local_entries_deleted = n,
        Err(e) => {
            warn!(error = %e, "[BATCH][WARN] Local cleanup failed");
            report.cleanup_warnings.push(e.to_string());
        }
    }
    match delete_remote_logs(store, config).await {
        Ok(n) => report.remote_objects_deleted = n,
        Err(e) => {
            warn!(error = %e, "[BATCH][WARN] Remote cleanup failed; source logs will be processed again next run");
            report.cleanup_warnings.push(e.to_string());
        }
    }
}

/// Reject configurations under which cleanup would destroy its own output.
///
/// - the batch deletes the scratch directory, so the output directory must
///   not live inside it (paths are compared after resolving `.` and `..`
///   against the working directory);
/// - remote cleanup deletes every key under the source prefix, so the upload
///   key must not fall under it, nor may the source prefix fall under the
///   destination prefix.
pub fn validate(config: &PipelineConfig) -> Result<()> {
    if config.source.bucket.is_empty() {
        return Err(PipelineError::Config("source bucket is empty".into()));
    }
    if let Some(dest) = &config.destination {
        if dest.bucket.is_empty() {
            return Err(PipelineError::Config("destination bucket is empty".into()));
        }
        if destination_overlaps_source(&config.source, dest) {
            return Err(PipelineError::Config(format!(
                "destination {dest} overlaps source {}; remote cleanup would delete the published report",
                config.source
            )));
        }
    }
    let scratch = resolve_lexically(&config.scratch_dir);
    let output = resolve_lexically(&config.output_dir);
    if output.starts_with(&scratch) {
        return Err(PipelineError::Config(format!(
            "output directory {} must not be inside the scratch directory {}",
            config.output_dir.display(),
            config.scratch_dir.display()
        )));
    }
    Ok(())
}

fn destination_overlaps_source(source: &StorageLocation, dest: &StorageLocation) -> bool {
    if source.bucket != dest.bucket {
        return false;
    }
    // Uploads land under `<prefix>/` (or the bucket root for an empty prefix).
    let trimmed = dest.prefix.trim_end_matches('/');
    let upload_prefix = if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    };
    upload_prefix.starts_with(&source.prefix) || source.prefix.starts_with(&upload_prefix)
}

/// Absolute form of `path` with `.` and `..` folded away, without touching the
/// filesystem (the directories may not exist yet).
fn resolve_lexically(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let mut resolved = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other.as_os_str()),
        }
    }
    resolved
}
