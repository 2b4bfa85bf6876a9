//! # contract: the object-store collaborator and the fetch manifest
//!
//! The pipeline only ever talks to remote storage through [`LogStore`]. The
//! production implementation lives in [`crate::s3`]; tests use the generated
//! `MockLogStore` (exported under the `test-export-mocks` feature) or an
//! `ObjectStoreLogStore` over an in-memory store.
//!
//! Every method reports failure as a [`StoreError`]; the calling stage attaches
//! the bucket/key context and picks the [`crate::error::PipelineError`] variant.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::StoreError;

/// Remote storage as seen by the pipeline.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait LogStore: Send + Sync {
    /// List every key in `bucket` that starts with `prefix`, across all result pages.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Download one object to `local_path`, overwriting it if present.
    async fn get(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StoreError>;

    /// Upload the file at `local_path` under `key` with the given content type.
    async fn put(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<(), StoreError>;

    /// Delete every object in `bucket` whose key starts with `prefix`.
    /// Returns the number of deleted objects.
    async fn delete_all(&self, bucket: &str, prefix: &str) -> Result<usize, StoreError>;
}

/// Result of a fetch: one entry per downloaded key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedManifest {
    pub logs: Vec<FetchedLog>,
}

/// A remote log object and where its bytes now live on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedLog {
    pub key: String,
    pub local_path: PathBuf,
}

impl FetchedManifest {
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Local paths in aggregation order (lexicographic by file name).
    pub fn sorted_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.logs.iter().map(|l| l.local_path.clone()).collect();
        crate::aggregate::sort_for_aggregation(&mut paths);
        paths
    }
}
