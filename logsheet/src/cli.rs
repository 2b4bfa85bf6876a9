use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use logsheet_core::contract::LogStore;
use logsheet_core::pipeline::{
    convert_logs, delete_local_logs, delete_remote_logs, download_logs, run_batch, validate,
};
use logsheet_core::s3::ObjectStoreLogStore;
use logsheet_core::PipelineConfig;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::load_config::load_config;

pub const DONE_MARKER: &str = "Done.";

/// CLI for logsheet: CloudFront access log parser and Excel spreadsheet generator.
#[derive(Parser, Debug, Default)]
#[clap(
    name = "logsheet",
    version,
    about = "CloudFront access log parser and Excel spreadsheet generator."
)]
pub struct Cli {
    /// Download CloudFront access logs from S3.
    #[clap(short = 'd', long)]
    pub download_logs: bool,

    /// Convert downloaded CloudFront access logs to Excel spreadsheet.
    #[clap(short = 'x', long)]
    pub convert_to_excel: bool,

    /// Performs all operations.
    #[clap(short = 'b', long)]
    pub batch_operation: bool,

    /// Deletes all CloudFront access logs from S3 bucket.
    #[clap(short = 'r', long)]
    pub delete_remote: bool,

    /// Deletes all downloaded CloudFront access logs and directory.
    #[clap(short = 'l', long)]
    pub delete_local: bool,

    /// Optional YAML config file; environment variables override its values.
    #[clap(long)]
    pub config: Option<PathBuf>,
}

/// One operation the CLI ran, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Download,
    DeleteRemote,
    DeleteLocal,
    Convert,
    Batch,
}

impl Cli {
    /// Requested steps in the fixed execution order, regardless of flag order.
    pub fn steps(&self) -> Vec<Step> {
        let mut steps = Vec::new();
        if self.download_logs {
            steps.push(Step::Download);
        }
        if self.delete_remote {
            steps.push(Step::DeleteRemote);
        }
        if self.delete_local {
            steps.push(Step::DeleteLocal);
        }
        if self.convert_to_excel {
            steps.push(Step::Convert);
        }
        if self.batch_operation {
            steps.push(Step::Batch);
        }
        steps
    }
}

/// Run the requested steps against `store`. Any fatal error stops the run, and
/// a configuration that fails [`validate`] runs no step at all.
/// Explicit `--delete-*` flags report cleanup failures as errors; the batch
/// only warns about them.
pub async fn execute<S>(cli: &Cli, config: &PipelineConfig, store: &S) -> Result<Vec<Step>>
where
    S: LogStore + ?Sized,
{
    validate(config)?;
    let steps = cli.steps();
    if steps.is_empty() {
        warn!("No operation requested; pass --help to list them");
    }

    for step in &steps {
        info!(?step, "[CLI] Running step");
        match step {
            Step::Download => {
                let manifest = download_logs(store, config).await?;
                println!("Downloaded {} access logs.", manifest.len());
            }
            Step::DeleteRemote => {
                let deleted = delete_remote_logs(store, config).await?;
                println!("Deleted {deleted} remote access logs.");
            }
            Step::DeleteLocal => {
                delete_local_logs(config).await?;
                println!("Deleted local access logs.");
            }
            Step::Convert => {
                let conversion = convert_logs(config, None, Utc::now()).await?;
                println!(
                    "Created {} ({} rows).",
                    conversion.spreadsheet.display(),
                    conversion.rows_aggregated
                );
            }
            Step::Batch => {
                let report = run_batch(store, config, Utc::now()).await?;
                for warning in &report.cleanup_warnings {
                    eprintln!("[WARN] {warning}");
                }
                tracing::debug!(?report, "[CLI] Batch report");
                if let Some(published) = &report.published {
                    println!("Published s3://{}/{}.", published.bucket, published.key);
                } else if let Some(spreadsheet) = &report.spreadsheet {
                    println!("Created {}.", spreadsheet.display());
                }
            }
        }
    }
    Ok(steps)
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    let result = async {
        let config = load_config(cli.config.as_deref())?;
        let store = ObjectStoreLogStore::from_env();
        execute(&cli, &config, &store).await?;
        println!("\n{DONE_MARKER}");
        Ok::<(), anyhow::Error>(())
    }
    .await;

    let exit_span = tracing::info_span!("exit");
    exit_span.in_scope(|| {
        tracing::info!(success = result.is_ok(), "exiting");
    });

    result
}
