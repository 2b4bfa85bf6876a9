//! Packager: wraps the spreadsheet into a gzip-compressed tar archive.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::error::{PipelineError, Result};

pub const ARCHIVE_SUFFIX: &str = ".tgz";

/// `<artifact>.tgz`, next to the artifact.
pub fn archive_path_for(artifact: &Path) -> PathBuf {
    let mut name = OsString::from(artifact.as_os_str());
    name.push(ARCHIVE_SUFFIX);
    PathBuf::from(name)
}

/// Create `<artifact>.tgz` containing exactly the artifact, stored under its
/// file name so extraction yields the spreadsheet directly.
pub fn package(artifact: &Path) -> Result<PathBuf> {
    let archive = archive_path_for(artifact);
    let packaging = |message: String| {
        error!(path = %archive.display(), %message, "[PACKAGE][ERROR] Packaging failed");
        PipelineError::Packaging {
            path: archive.clone(),
            message,
        }
    };

    let entry_name = artifact
        .file_name()
        .ok_or_else(|| packaging(format!("{} has no file name", artifact.display())))?;

    let file = File::create(&archive).map_err(|e| packaging(e.to_string()))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder
        .append_path_with_name(artifact, entry_name)
        .map_err(|e| packaging(format!("adding {}: {e}", artifact.display())))?;
    let encoder = builder
        .into_inner()
        .map_err(|e| packaging(format!("finishing tar stream: {e}")))?;
    encoder
        .finish()
        .map_err(|e| packaging(format!("finishing gzip stream: {e}")))?;

    info!(artifact = %artifact.display(), archive = %archive.display(), "[PACKAGE] Archive created");
    Ok(archive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn archive_name_appends_suffix() {
        assert_eq!(
            archive_path_for(Path::new("/out/2024-01-01_00-00-00_utc.xlsx")),
            PathBuf::from("/out/2024-01-01_00-00-00_utc.xlsx.tgz")
        );
    }

    #[test]
    fn archive_holds_exactly_the_artifact() {
        let dir = tempdir().unwrap();
        let artifact = dir.path().join("report_utc.xlsx");
        std::fs::write(&artifact, b"PK fake workbook").unwrap();

        let archive = package(&artifact).unwrap();

        let mut tar = tar::Archive::new(GzDecoder::new(File::open(&archive).unwrap()));
        let mut entries: Vec<(String, Vec<u8>)> = Vec::new();
        for entry in tar.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut body = Vec::new();
            entry.read_to_end(&mut body).unwrap();
            entries.push((name, body));
        }
        assert_eq!(
            entries,
            vec![("report_utc.xlsx".to_string(), b"PK fake workbook".to_vec())]
        );
    }

    #[test]
    fn missing_artifact_is_a_packaging_error() {
        let dir = tempdir().unwrap();
        let err = package(&dir.path().join("absent.xlsx")).unwrap_err();
        assert!(matches!(err, PipelineError::Packaging { .. }));
    }
}
