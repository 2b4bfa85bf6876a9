use anyhow::{Context, Result};
use logsheet_core::{Limits, PipelineConfig, StorageLocation};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const ENV_LOG_BUCKET: &str = "LOG_BUCKET";
pub const ENV_LOG_PREFIX: &str = "LOG_PREFIX";
pub const ENV_DESTINATION_BUCKET: &str = "DESTINATION_BUCKET";
pub const ENV_DESTINATION_PREFIX: &str = "DESTINATION_PREFIX";
pub const ENV_SCRATCH_DIR: &str = "SCRATCH_DIR";
pub const ENV_OUTPUT_DIR: &str = "OUTPUT_DIR";

pub const CLI_SCRATCH_DIR: &str = "temp_access_logs";
pub const CLI_OUTPUT_DIR: &str = "access_logs";
pub const LAMBDA_SCRATCH_DIR: &str = "/tmp/access_logs";
pub const LAMBDA_OUTPUT_DIR: &str = "/tmp/access_logs_out";

#[derive(Deserialize, Default)]
struct StaticConfig {
    #[serde(default)]
    source: Option<LocationYaml>,
    #[serde(default)]
    destination: Option<LocationYaml>,
    #[serde(default)]
    scratch_dir: Option<PathBuf>,
    #[serde(default)]
    output_dir: Option<PathBuf>,
    #[serde(default)]
    limits: Option<Limits>,
}

#[derive(Deserialize)]
struct LocationYaml {
    bucket: String,
    #[serde(default)]
    prefix: String,
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn require_env(name: &str) -> Result<String> {
    match env_value(name) {
        Some(v) => Ok(v),
        None => {
            error!(var = name, "Required environment variable not set");
            anyhow::bail!("{name} environment variable not set")
        }
    }
}

/// Overlay `*_BUCKET` / `*_PREFIX` variables onto a location from the file.
fn merge_location(
    from_file: Option<LocationYaml>,
    bucket_var: &str,
    prefix_var: &str,
) -> Option<StorageLocation> {
    let bucket = env_value(bucket_var).or_else(|| from_file.as_ref().map(|l| l.bucket.clone()))?;
    let prefix = env_value(prefix_var)
        .or_else(|| from_file.as_ref().map(|l| l.prefix.clone()))
        .unwrap_or_default();
    Some(StorageLocation { bucket, prefix })
}

/// Command-line configuration: optional YAML file, overridden by environment.
///
/// The source bucket is required; a destination is optional (without one the
/// batch keeps the spreadsheet locally). Directories default to
/// `./temp_access_logs` and `./access_logs`.
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let static_conf = match path {
        Some(path) => {
            info!(config_path = ?path, "Loading configuration from file");
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let parsed: StaticConfig = serde_yaml::from_str(&content).map_err(|e| {
                error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
                anyhow::anyhow!("Failed to parse config YAML: {e}")
            })?;
            info!(config_path = ?path, "Parsed config YAML successfully");
            parsed
        }
        None => {
            info!("No config file given; reading configuration from environment");
            StaticConfig::default()
        }
    };

    let source = merge_location(static_conf.source, ENV_LOG_BUCKET, ENV_LOG_PREFIX)
        .ok_or_else(|| {
            error!("No source bucket in config file or environment");
            anyhow::anyhow!("source bucket missing: set source.bucket in the config file or {ENV_LOG_BUCKET}")
        })?;
    let destination = merge_location(
        static_conf.destination,
        ENV_DESTINATION_BUCKET,
        ENV_DESTINATION_PREFIX,
    );

    let scratch_dir = env_value(ENV_SCRATCH_DIR)
        .map(PathBuf::from)
        .or(static_conf.scratch_dir)
        .unwrap_or_else(|| PathBuf::from(CLI_SCRATCH_DIR));
    let output_dir = env_value(ENV_OUTPUT_DIR)
        .map(PathBuf::from)
        .or(static_conf.output_dir)
        .unwrap_or_else(|| PathBuf::from(CLI_OUTPUT_DIR));

    let config = PipelineConfig {
        source,
        destination,
        scratch_dir,
        output_dir,
        limits: static_conf.limits.unwrap_or_default(),
    };
    config.trace_loaded();
    Ok(config)
}

/// Event-handler configuration: environment only, destination required.
pub fn config_from_env() -> Result<PipelineConfig> {
    let source = StorageLocation {
        bucket: require_env(ENV_LOG_BUCKET)?,
        prefix: require_env(ENV_LOG_PREFIX)?,
    };
    let destination = StorageLocation {
        bucket: require_env(ENV_DESTINATION_BUCKET)?,
        prefix: require_env(ENV_DESTINATION_PREFIX)?,
    };
    let config = PipelineConfig {
        source,
        destination: Some(destination),
        scratch_dir: env_value(ENV_SCRATCH_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(LAMBDA_SCRATCH_DIR)),
        output_dir: env_value(ENV_OUTPUT_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(LAMBDA_OUTPUT_DIR)),
        limits: Limits::default(),
    };
    config.trace_loaded();
    Ok(config)
}
