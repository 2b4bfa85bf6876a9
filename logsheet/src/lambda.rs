//! Event-triggered entry point.
//!
//! The event payload is ignored; configuration comes from the environment
//! (see [`crate::load_config::config_from_env`]). A successful run answers
//! `{"status": "success"}`; any fatal pipeline error is returned to the
//! runtime so the invocation is marked as failed. After a successful upload
//! the local spreadsheet and archive are removed as well.

use anyhow::Result;
use chrono::Utc;
use lambda_runtime::LambdaEvent;
use logsheet_core::contract::LogStore;
use logsheet_core::pipeline::run_batch;
use logsheet_core::publish::delete_artifacts;
use logsheet_core::s3::ObjectStoreLogStore;
use logsheet_core::PipelineConfig;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::load_config::config_from_env;

/// Run the full batch for one invocation.
pub async fn handle_event<S>(store: &S, config: &PipelineConfig) -> Result<Value>
where
    S: LogStore + ?Sized,
{
    let mut report = run_batch(store, config, Utc::now()).await?;

    // Warm invocations share /tmp; drop the uploaded copies.
    if report.published.is_some() {
        let artifacts: Vec<_> = report
            .spreadsheet
            .iter()
            .chain(report.archive.iter())
            .cloned()
            .collect();
        if let Err(e) = delete_artifacts(&artifacts).await {
            report.cleanup_warnings.push(e.to_string());
        }
    }

    for warning in &report.cleanup_warnings {
        warn!(warning = %warning, "[LAMBDA] Cleanup warning");
    }
    info!(
        rows = report.rows_aggregated,
        published = ?report.published,
        "[LAMBDA] Invocation complete"
    );
    Ok(json!({ "status": "success" }))
}

/// `lambda_runtime` service function.
pub async fn handler(event: LambdaEvent<Value>) -> Result<Value, lambda_runtime::Error> {
    info!(request_id = %event.context.request_id, "[LAMBDA] Invocation received");
    let config = config_from_env()?;
    let store = ObjectStoreLogStore::from_env();
    Ok(handle_event(&store, &config).await?)
}
