//! Aggregator: folds decoded logs into the single tab-delimited table.
//!
//! The table is owned by whoever calls [`aggregate`]; files are visited in
//! lexicographic order of their file names so that the same input set always
//! produces the same bytes, whatever order the fetcher finished in.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::contract::FetchedManifest;
use crate::decode::decode_log;
use crate::error::{PipelineError, Result};

pub const FIELD_DELIMITER: char = '\t';

/// Column names of a CloudFront standard access log, in field order.
pub const HEADER: [&str; 33] = [
    "Date",
    "Time",
    "Edge Location",
    "Response Bytes",
    "IP",
    "Method",
    "Host",
    "Path",
    "Status Code",
    "Referer",
    "User-Agent",
    "Query String",
    "Cookie",
    "Cache Status",
    "Edge Request ID",
    "Host Header",
    "Protocol",
    "Request Bytes",
    "Total Time",
    "Forwarded For",
    "SSL Protocol",
    "SSL Cipher",
    "Edge Response Result",
    "HTTP Version",
    "FLE Status",
    "FLE Encrypted Fields",
    "Port",
    "Time to First Byte",
    "Detailed Cache Status",
    "Content Type",
    "Content Length",
    "Content Range Start",
    "Content Range End",
];

/// Header row followed by every retained log line, in processing order.
///
/// Append-only: rows are never reordered, rewritten or deduplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedTable {
    records: Vec<String>,
}

impl Default for AggregatedTable {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregatedTable {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn header_line() -> String {
        HEADER.join("\t")
    }

    pub fn column_count(&self) -> usize {
        HEADER.len()
    }

    pub fn append<I>(&mut self, lines: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.records.extend(lines);
    }

    /// Data rows only, without the header.
    pub fn records(&self) -> &[String] {
        &self.records
    }

    pub fn data_row_count(&self) -> usize {
        self.records.len()
    }

    /// Every row including the header, as it would appear in the delimited form.
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(Self::header_line()).chain(self.records.iter().cloned())
    }

    /// Header and records joined by `\n`, without a trailing newline.
    pub fn to_tsv(&self) -> String {
        let mut out = Self::header_line();
        for record in &self.records {
            out.push('\n');
            out.push_str(record);
        }
        out
    }
}

/// Sort paths by file name (full path as tie-breaker).
pub fn sort_for_aggregation(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()).then_with(|| a.cmp(b)));
}

/// Decode each file in deterministic order and append its lines to a fresh table.
pub fn aggregate(paths: &[PathBuf]) -> Result<AggregatedTable> {
    let mut ordered = paths.to_vec();
    sort_for_aggregation(&mut ordered);

    info!(files = ordered.len(), "[AGGREGATE] Aggregating access logs");
    let mut table = AggregatedTable::new();
    for path in &ordered {
        let lines = decode_log(path)?;
        table.append(lines);
    }
    info!(
        files = ordered.len(),
        rows = table.data_row_count(),
        "[AGGREGATE] Aggregation complete"
    );
    Ok(table)
}

pub fn aggregate_manifest(manifest: &FetchedManifest) -> Result<AggregatedTable> {
    aggregate(&manifest.sorted_paths())
}

/// Find previously downloaded logs in `dir`: regular `.gz` files, sorted.
///
/// A missing directory means nothing was fetched and yields an empty list.
pub fn discover_local_logs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(dir = %dir.display(), "[AGGREGATE] Scratch directory does not exist; nothing to aggregate");
            return Ok(Vec::new());
        }
        Err(e) => return Err(PipelineError::io(dir, e)),
    };

    let mut logs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| PipelineError::io(entry.path(), e))?;
        let path = entry.path();
        let is_log = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("gz"))
            .unwrap_or(false);
        if file_type.is_file() && is_log {
            logs.push(path);
        }
    }
    sort_for_aggregation(&mut logs);
    Ok(logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_gz(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(content.as_bytes()).unwrap();
        std::fs::write(&path, enc.finish().unwrap()).unwrap();
        path
    }

    #[test]
    fn header_has_33_columns() {
        assert_eq!(HEADER.len(), 33);
        assert_eq!(AggregatedTable::header_line().split('\t').count(), 33);
        assert!(HEADER.contains(&"Request Bytes"));
    }

    #[test]
    fn empty_input_is_header_only() {
        let table = aggregate(&[]).unwrap();
        assert_eq!(table.data_row_count(), 0);
        assert_eq!(table.to_tsv(), AggregatedTable::header_line());
    }

    #[test]
    fn files_are_visited_in_name_order_regardless_of_input_order() {
        let dir = tempdir().unwrap();
        let b = write_gz(dir.path(), "b.gz", "row-b1\nrow-b2\n");
        let a = write_gz(dir.path(), "a.gz", "# x\nrow-a\n");

        let table = aggregate(&[b.clone(), a.clone()]).unwrap();
        assert_eq!(table.records(), &["row-a", "row-b1", "row-b2"]);

        let again = aggregate(&[a, b]).unwrap();
        assert_eq!(table.to_tsv(), again.to_tsv());
    }

    #[test]
    fn row_count_is_lines_minus_comments() {
        let dir = tempdir().unwrap();
        let files = vec![
            write_gz(dir.path(), "1.gz", "#Version: 1.0\n#Fields: ...\nr1\nr2\nr3\n"),
            write_gz(dir.path(), "2.gz", "#Version: 1.0\nr4\n"),
            write_gz(dir.path(), "3.gz", "#only comments\n"),
        ];
        let table = aggregate(&files).unwrap();
        assert_eq!(table.data_row_count(), 4);
        assert!(table.records().iter().all(|r| !r.starts_with('#')));
    }

    #[test]
    fn discover_only_returns_gz_files() {
        let dir = tempdir().unwrap();
        write_gz(dir.path(), "b.gz", "x\n");
        write_gz(dir.path(), "a.gz", "y\n");
        std::fs::write(dir.path().join("log.tsv"), "stale").unwrap();
        std::fs::create_dir(dir.path().join("nested.gz")).unwrap();

        let found = discover_local_logs(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.gz", "b.gz"]);
    }

    #[test]
    fn discover_in_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let found = discover_local_logs(&dir.path().join("absent")).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn corrupt_file_aborts_aggregation() {
        let dir = tempdir().unwrap();
        let good = write_gz(dir.path(), "a.gz", "row\n");
        let bad = dir.path().join("b.gz");
        std::fs::write(&bad, b"nope").unwrap();
        let err = aggregate(&[good, bad]).unwrap_err();
        assert!(matches!(err, PipelineError::Decode { .. }));
    }
}
