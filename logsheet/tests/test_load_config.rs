use logsheet::load_config::{config_from_env, load_config};
use serial_test::serial;
use std::path::PathBuf;
use tempfile::NamedTempFile;

const VARS: [&str; 6] = [
    "LOG_BUCKET",
    "LOG_PREFIX",
    "DESTINATION_BUCKET",
    "DESTINATION_PREFIX",
    "SCRATCH_DIR",
    "OUTPUT_DIR",
];

fn clear_env() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

fn write_yaml(content: &str) -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    std::fs::write(file.path(), content).unwrap();
    file
}

#[test]
#[serial]
fn yaml_file_populates_every_field() {
    clear_env();
    let file = write_yaml(
        r#"
source:
  bucket: edge-logs
  prefix: cf/2024/
destination:
  bucket: reports
  prefix: weekly/
scratch_dir: /var/tmp/scratch
output_dir: /var/tmp/out
limits:
  fetch_concurrency: 8
  call_timeout_secs: 30
"#,
    );

    let config = load_config(Some(file.path())).unwrap();
    assert_eq!(config.source.bucket, "edge-logs");
    assert_eq!(config.source.prefix, "cf/2024/");
    let destination = config.destination.expect("destination configured");
    assert_eq!(destination.bucket, "reports");
    assert_eq!(destination.prefix, "weekly/");
    assert_eq!(config.scratch_dir, PathBuf::from("/var/tmp/scratch"));
    assert_eq!(config.output_dir, PathBuf::from("/var/tmp/out"));
    assert_eq!(config.limits.fetch_workers(), 8);
    assert_eq!(config.limits.call_timeout_secs, 30);
    assert_eq!(config.limits.pipeline_timeout_secs, 900);
}

#[test]
#[serial]
fn environment_overrides_file_values() {
    clear_env();
    let file = write_yaml("source:\n  bucket: from-file\n  prefix: file/\n");
    std::env::set_var("LOG_BUCKET", "from-env");
    std::env::set_var("OUTPUT_DIR", "/srv/reports");

    let config = load_config(Some(file.path())).unwrap();
    clear_env();

    assert_eq!(config.source.bucket, "from-env");
    assert_eq!(config.source.prefix, "file/");
    assert_eq!(config.output_dir, PathBuf::from("/srv/reports"));
    assert_eq!(config.scratch_dir, PathBuf::from("temp_access_logs"));
    assert!(config.destination.is_none());
}

#[test]
#[serial]
fn environment_alone_is_enough() {
    clear_env();
    std::env::set_var("LOG_BUCKET", "edge-logs");
    std::env::set_var("DESTINATION_BUCKET", "reports");

    let config = load_config(None).unwrap();
    clear_env();

    assert_eq!(config.source.prefix, "");
    assert_eq!(config.destination.unwrap().bucket, "reports");
    assert_eq!(config.output_dir, PathBuf::from("access_logs"));
}

#[test]
#[serial]
fn missing_source_bucket_is_an_error() {
    clear_env();
    let err = load_config(None).unwrap_err();
    assert!(err.to_string().contains("LOG_BUCKET"), "{err}");
}

#[test]
#[serial]
fn malformed_yaml_is_an_error() {
    clear_env();
    let file = write_yaml("source: [not, a, mapping");
    let err = load_config(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config YAML"), "{err}");
}

#[test]
#[serial]
fn unreadable_file_is_an_error() {
    clear_env();
    let err = load_config(Some(std::path::Path::new("/nonexistent/logsheet.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"), "{err}");
}

#[test]
#[serial]
fn handler_config_requires_all_four_variables() {
    clear_env();
    std::env::set_var("LOG_BUCKET", "edge-logs");
    std::env::set_var("LOG_PREFIX", "cf/");
    std::env::set_var("DESTINATION_BUCKET", "reports");

    let err = config_from_env().unwrap_err();
    assert!(err.to_string().contains("DESTINATION_PREFIX"), "{err}");

    std::env::set_var("DESTINATION_PREFIX", "weekly/");
    let config = config_from_env().unwrap();
    clear_env();

    assert_eq!(config.scratch_dir, PathBuf::from("/tmp/access_logs"));
    assert_eq!(config.output_dir, PathBuf::from("/tmp/access_logs_out"));
    assert_eq!(config.destination.unwrap().prefix, "weekly/");
}
