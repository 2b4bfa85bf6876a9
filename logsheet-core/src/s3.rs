//! [`LogStore`] over the `object_store` crate.
//!
//! In production each bucket gets an `AmazonS3Builder::from_env()` client,
//! built on first use and cached. Any other `ObjectStore` (an in-memory store
//! in tests, a local filesystem, a preconfigured S3 client) can be registered
//! for a bucket with [`ObjectStoreLogStore::with_bucket`].
//!
//! `object_store` lists by path segment, while S3 prefixes are plain string
//! prefixes (CloudFront writes `prefix/DISTRIBUTION.date.id.gz`, and the
//! configured prefix often ends in the middle of a file name). Listing
//! therefore walks the deepest complete directory of the prefix and filters
//! the keys by string prefix.

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectStore, PutOptions, PutPayload,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::contract::LogStore;
use crate::error::StoreError;

pub struct ObjectStoreLogStore {
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
    build_missing: bool,
}

impl ObjectStoreLogStore {
    /// S3 clients configured from the standard `AWS_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            stores: Mutex::new(HashMap::new()),
            build_missing: true,
        }
    }

    /// A store that only knows the buckets registered with [`Self::with_bucket`].
    pub fn fixed() -> Self {
        Self {
            stores: Mutex::new(HashMap::new()),
            build_missing: false,
        }
    }

    pub fn with_bucket(self, bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        if let Ok(mut stores) = self.stores.lock() {
            stores.insert(bucket.into(), store);
        }
        self
    }

    fn store_for(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StoreError> {
        let mut stores = self
            .stores
            .lock()
            .map_err(|_| StoreError::from("object store cache poisoned"))?;
        if let Some(store) = stores.get(bucket) {
            return Ok(store.clone());
        }
        if !self.build_missing {
            return Err(StoreError::Other(format!("no object store registered for bucket {bucket}")));
        }
        info!(bucket, "[S3] Building S3 client from environment");
        let store: Arc<dyn ObjectStore> = Arc::new(
            AmazonS3Builder::from_env()
                .with_bucket_name(bucket)
                .build()?,
        );
        stores.insert(bucket.to_string(), store.clone());
        Ok(store)
    }
}

/// Deepest complete directory of `prefix`, as an object-store listing prefix.
fn listing_dir(prefix: &str) -> Option<ObjectPath> {
    let dir = prefix.rfind('/').map(|i| &prefix[..i]).unwrap_or("");
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        None
    } else {
        Some(ObjectPath::from(dir))
    }
}

#[async_trait]
impl LogStore for ObjectStoreLogStore {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let store = self.store_for(bucket)?;
        let dir = listing_dir(prefix);
        let metas: Vec<object_store::ObjectMeta> = store.list(dir.as_ref()).try_collect().await?;
        let keys: Vec<String> = metas
            .into_iter()
            .map(|meta| meta.location.to_string())
            .filter(|key| key.starts_with(prefix))
            .collect();
        debug!(bucket, prefix, count = keys.len(), "[S3] Listed objects");
        Ok(keys)
    }

    async fn get(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StoreError> {
        let store = self.store_for(bucket)?;
        let result = store.get(&ObjectPath::from(key)).await?;
        let mut body = result.into_stream();
        let mut file = tokio::fs::File::create(local_path).await?;
        while let Some(chunk) = body.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        debug!(bucket, key, path = %local_path.display(), "[S3] Downloaded object");
        Ok(())
    }

    async fn put(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<(), StoreError> {
        let store = self.store_for(bucket)?;
        let bytes = tokio::fs::read(local_path).await?;
        let mut attributes = Attributes::new();
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from(content_type.to_string()),
        );
        let options = PutOptions {
            attributes,
            ..Default::default()
        };
        store
            .put_opts(&ObjectPath::from(key), PutPayload::from(bytes), options)
            .await?;
        debug!(bucket, key, content_type, "[S3] Uploaded object");
        Ok(())
    }

    async fn delete_all(&self, bucket: &str, prefix: &str) -> Result<usize, StoreError> {
        let store = self.store_for(bucket)?;
        let keys = self.list(bucket, prefix).await?;
        let locations = stream::iter(
            keys.into_iter()
                .map(|k| Ok::<_, object_store::Error>(ObjectPath::from(k))),
        )
        .boxed();
        let deleted: Vec<ObjectPath> = store.delete_stream(locations).try_collect().await?;
        debug!(bucket, prefix, count = deleted.len(), "[S3] Deleted objects");
        Ok(deleted.len())
    }
}
