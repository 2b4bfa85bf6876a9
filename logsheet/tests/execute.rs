use flate2::write::GzEncoder;
use flate2::Compression;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use serde_json::json;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

use futures::TryStreamExt;
use logsheet::cli::{execute, Cli, Step};
use logsheet::lambda::handle_event;
use logsheet_core::aggregate::HEADER;
use logsheet_core::s3::ObjectStoreLogStore;
use logsheet_core::{Limits, PipelineConfig, StorageLocation};

fn gzip(content: &str) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(content.as_bytes()).unwrap();
    enc.finish().unwrap()
}

fn log_body(rows: usize) -> String {
    let mut body = String::from("#Version: 1.0\n#Fields: date time\n");
    for i in 0..rows {
        let mut fields = vec!["2024-01-01".to_string(), format!("00:00:{i:02}")];
        fields.extend((2..HEADER.len()).map(|c| format!("v{c}")));
        body.push_str(&fields.join("\t"));
        body.push('\n');
    }
    body
}

fn config_in(root: &Path, destination: Option<StorageLocation>) -> PipelineConfig {
    PipelineConfig {
        source: StorageLocation::new("edge-logs", "cf/"),
        destination,
        scratch_dir: root.join("temp_access_logs"),
        output_dir: root.join("access_logs"),
        limits: Limits::default(),
    }
}

async fn seeded_source() -> Arc<InMemory> {
    let source = Arc::new(InMemory::new());
    for (key, rows) in [("cf/E1.2024-01-01-00.a.gz", 2), ("cf/E1.2024-01-01-01.b.gz", 3)] {
        source
            .put(&ObjectPath::from(key), PutPayload::from(gzip(&log_body(rows))))
            .await
            .unwrap();
    }
    source
}

async fn object_count(store: &InMemory) -> usize {
    let listed: Vec<_> = store.list(None).try_collect().await.unwrap();
    listed.len()
}

#[tokio::test]
async fn download_then_convert_uses_the_downloaded_files() {
    let root = tempdir().unwrap();
    let source = seeded_source().await;
    let store = ObjectStoreLogStore::fixed().with_bucket("edge-logs", source.clone());
    let config = config_in(root.path(), None);

    let cli = Cli {
        download_logs: true,
        convert_to_excel: true,
        ..Cli::default()
    };
    let steps = execute(&cli, &config, &store).await.unwrap();
    assert_eq!(steps, vec![Step::Download, Step::Convert]);

    assert!(config.scratch_dir.join("E1.2024-01-01-00.a.gz").exists());
    let intermediate = std::fs::read_to_string(config.scratch_dir.join("log.tsv")).unwrap();
    assert_eq!(intermediate.lines().count(), 1 + 5);

    let spreadsheets: Vec<_> = std::fs::read_dir(&config.output_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(spreadsheets.len(), 1);
    assert_eq!(object_count(&source).await, 2);
}

#[tokio::test]
async fn delete_flags_clear_both_sides() {
    let root = tempdir().unwrap();
    let source = seeded_source().await;
    let store = ObjectStoreLogStore::fixed().with_bucket("edge-logs", source.clone());
    let config = config_in(root.path(), None);

    let cli = Cli {
        download_logs: true,
        delete_remote: true,
        delete_local: true,
        ..Cli::default()
    };
    let steps = execute(&cli, &config, &store).await.unwrap();
    assert_eq!(
        steps,
        vec![Step::Download, Step::DeleteRemote, Step::DeleteLocal]
    );
    assert_eq!(object_count(&source).await, 0);
    assert!(!config.scratch_dir.exists());
}

#[tokio::test]
async fn failing_step_stops_later_steps() {
    let root = tempdir().unwrap();
    // No bucket registered, so the download cannot list anything.
    let store = ObjectStoreLogStore::fixed();
    let config = config_in(root.path(), None);

    let cli = Cli {
        download_logs: true,
        convert_to_excel: true,
        ..Cli::default()
    };
    let err = execute(&cli, &config, &store).await.unwrap_err();
    assert!(err.to_string().contains("edge-logs"), "{err}");
    assert!(!config.output_dir.exists());
}

#[tokio::test]
async fn event_handler_publishes_and_reports_success() {
    let root = tempdir().unwrap();
    let source = seeded_source().await;
    let reports = Arc::new(InMemory::new());
    let store = ObjectStoreLogStore::fixed()
        .with_bucket("edge-logs", source.clone())
        .with_bucket("reports", reports.clone());
    let config = config_in(root.path(), Some(StorageLocation::new("reports", "weekly/")));

    let response = handle_event(&store, &config).await.unwrap();
    assert_eq!(response, json!({ "status": "success" }));

    let published: Vec<_> = reports.list(None).try_collect().await.unwrap();
    assert_eq!(published.len(), 1);
    let key = published[0].location.to_string();
    assert!(key.starts_with("weekly/") && key.ends_with("_utc.xlsx.tgz"), "{key}");

    assert_eq!(object_count(&source).await, 0);
    assert!(!config.scratch_dir.exists());
}

#[tokio::test]
async fn event_handler_leaves_no_artifacts_behind_across_invocations() {
    let root = tempdir().unwrap();
    let source = seeded_source().await;
    let reports = Arc::new(InMemory::new());
    let store = ObjectStoreLogStore::fixed()
        .with_bucket("edge-logs", source.clone())
        .with_bucket("reports", reports.clone());
    let config = config_in(root.path(), Some(StorageLocation::new("reports", "weekly/")));

    for _ in 0..2 {
        let response = handle_event(&store, &config).await.unwrap();
        assert_eq!(response, json!({ "status": "success" }));

        let leftovers: Vec<_> = std::fs::read_dir(&config.output_dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }
    assert!(object_count(&reports).await >= 1);
}

#[tokio::test]
async fn scratch_enclosing_output_is_refused_before_deleting_anything() {
    let root = tempdir().unwrap();
    let keep = root.path().join("keep.txt");
    std::fs::write(&keep, b"precious").unwrap();
    let store = ObjectStoreLogStore::fixed();
    let config = PipelineConfig {
        source: StorageLocation::new("edge-logs", "cf/"),
        destination: None,
        scratch_dir: root.path().join("."),
        output_dir: root.path().join("access_logs"),
        limits: Limits::default(),
    };

    let cli = Cli {
        delete_local: true,
        ..Cli::default()
    };
    let err = execute(&cli, &config, &store).await.unwrap_err();

    assert!(err.to_string().contains("scratch directory"), "{err}");
    assert!(keep.exists());
}
