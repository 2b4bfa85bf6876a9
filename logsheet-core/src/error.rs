//! Error taxonomy for the access-log pipeline.
//!
//! Every stage maps its failures into one [`PipelineError`] variant and attaches
//! the bucket, key or local path it was working on. All variants except
//! [`PipelineError::Cleanup`] abort the run; cleanup failures are reported but
//! never turn a published report into a failed run.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Error returned by a [`crate::contract::LogStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<String> for StoreError {
    fn from(msg: String) -> Self {
        StoreError::Other(msg)
    }
}

impl From<&str> for StoreError {
    fn from(msg: &str) -> Self {
        StoreError::Other(msg.to_string())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("listing s3://{bucket}/{prefix} failed: {source}")]
    Listing {
        bucket: String,
        prefix: String,
        #[source]
        source: StoreError,
    },

    #[error("downloading s3://{bucket}/{key} to {} failed: {source}", .path.display())]
    Fetch {
        bucket: String,
        key: String,
        path: PathBuf,
        #[source]
        source: StoreError,
    },

    #[error("decoding {} failed: {message}", .path.display())]
    Decode { path: PathBuf, message: String },

    #[error(
        "{} line {line}: expected {expected} columns, found {found}",
        .path.display()
    )]
    Schema {
        path: PathBuf,
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("rendering spreadsheet {} failed: {message}", .path.display())]
    Conversion { path: PathBuf, message: String },

    #[error("packaging {} failed: {message}", .path.display())]
    Packaging { path: PathBuf, message: String },

    #[error("uploading {} to s3://{bucket}/{key} failed: {source}", .path.display())]
    Publish {
        path: PathBuf,
        bucket: String,
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("cleanup of {target} failed: {message}")]
    Cleanup { target: String, message: String },

    #[error("{operation} timed out after {}s", .elapsed.as_secs())]
    Timeout { operation: String, elapsed: Duration },

    #[error("background task failed: {0}")]
    Task(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Cleanup runs strictly after a successful publish, so its failure is the
    /// only one that leaves the run successful.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PipelineError::Cleanup { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
