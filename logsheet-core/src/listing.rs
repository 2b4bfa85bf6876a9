use tracing::{error, info};

use crate::config::StorageLocation;
use crate::contract::LogStore;
use crate::error::{PipelineError, Result};

/// Enumerate every log object under the source prefix.
///
/// Keys come back sorted and deduplicated; keys ending in `/` are directory
/// placeholders and are dropped. An empty listing is a valid result.
pub async fn list_log_keys<S>(store: &S, location: &StorageLocation) -> Result<Vec<String>>
where
    S: LogStore + ?Sized,
{
    info!(bucket = %location.bucket, prefix = %location.prefix, "[LIST] Listing log objects");

    let mut keys = store
        .list(&location.bucket, &location.prefix)
        .await
        .map_err(|e| {
            error!(error = %e, bucket = %location.bucket, prefix = %location.prefix, "[LIST][ERROR] Listing failed");
            PipelineError::Listing {
                bucket: location.bucket.clone(),
                prefix: location.prefix.clone(),
                source: e,
            }
        })?;

    keys.retain(|k| !k.is_empty() && !k.ends_with('/'));
    keys.sort();
    keys.dedup();

    info!(count = keys.len(), "[LIST] Listed log objects");
    Ok(keys)
}
