use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Upper bound on any worker pool, whatever the host reports.
pub const MAX_CONCURRENCY: usize = 32;

/// A bucket plus key prefix, used both for the log source and the report destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
}

impl StorageLocation {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }
}

impl std::fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.prefix)
    }
}

/// Worker-pool sizes and timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub fetch_concurrency: usize,
    pub delete_concurrency: usize,
    pub call_timeout_secs: u64,
    pub pipeline_timeout_secs: u64,
}

impl Default for Limits {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            fetch_concurrency: cpus,
            delete_concurrency: cpus,
            call_timeout_secs: 120,
            pipeline_timeout_secs: 900,
        }
    }
}

impl Limits {
    pub fn fetch_workers(&self) -> usize {
        self.fetch_concurrency.clamp(1, MAX_CONCURRENCY)
    }

    pub fn delete_workers(&self) -> usize {
        self.delete_concurrency.clamp(1, MAX_CONCURRENCY)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.max(1))
    }

    pub fn pipeline_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline_timeout_secs.max(1))
    }
}

/// Everything one pipeline run needs to know.
///
/// `destination` is optional because the command-line batch can stop at the
/// local spreadsheet; the event-triggered run always publishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub source: StorageLocation,
    pub destination: Option<StorageLocation>,
    pub scratch_dir: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub limits: Limits,
}

impl PipelineConfig {
    pub fn trace_loaded(&self) {
        info!(
            source = %self.source,
            destination = self
                .destination
                .as_ref()
                .map(|d| d.to_string())
                .unwrap_or_else(|| "<none>".into()),
            scratch_dir = %self.scratch_dir.display(),
            output_dir = %self.output_dir.display(),
            "Loaded PipelineConfig"
        );
        debug!(?self, "PipelineConfig loaded (full debug)");
    }
}
