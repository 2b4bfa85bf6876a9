//! Tabular converter: aggregated table → tab-separated intermediate → `.xlsx`.
//!
//! Column counts are checked twice: when the intermediate file is written and
//! again when it is parsed back. A row that disagrees with the header is a
//! [`PipelineError::Schema`] error; rows are never padded or truncated.

use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, Terminator};
use rust_xlsxwriter::{Format, Workbook};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::aggregate::{AggregatedTable, FIELD_DELIMITER};
use crate::error::{PipelineError, Result};

pub const INTERMEDIATE_FILE_NAME: &str = "log.tsv";
pub const WORKSHEET_NAME: &str = "access_logs";

/// Rows per worksheet, header included.
pub const MAX_SPREADSHEET_ROWS: usize = 1_048_576;

/// Parsed form of the intermediate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularData {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// `2024-01-01_09-05-03_utc.xlsx` for 2024-01-01 09:05:03 UTC.
pub fn artifact_file_name(now: DateTime<Utc>) -> String {
    format!("{}_utc.xlsx", now.format("%Y-%m-%d_%H-%M-%S"))
}

/// Write the table as tab-separated text, one row per line, header first.
pub fn write_intermediate(table: &AggregatedTable, path: &Path) -> Result<()> {
    let expected = table.column_count();
    for (idx, record) in table.records().iter().enumerate() {
        let found = record.split(FIELD_DELIMITER).count();
        if found != expected {
            let line = idx as u64 + 2;
            error!(path = %path.display(), line, expected, found, "[CONVERT][ERROR] Column count mismatch");
            return Err(PipelineError::Schema {
                path: path.to_path_buf(),
                line,
                expected,
                found,
            });
        }
    }

    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for (idx, line) in table.lines().enumerate() {
        if idx > 0 {
            writer
                .write_all(b"\n")
                .map_err(|e| PipelineError::io(path, e))?;
        }
        writer
            .write_all(line.as_bytes())
            .map_err(|e| PipelineError::io(path, e))?;
    }
    writer.flush().map_err(|e| PipelineError::io(path, e))?;
    info!(path = %path.display(), rows = table.data_row_count(), "[CONVERT] Wrote intermediate TSV");
    Ok(())
}

/// Parse a tab-separated file written by [`write_intermediate`].
///
/// Quoting is disabled so field text comes back byte-for-byte.
pub fn read_intermediate(path: &Path) -> Result<TabularData> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .terminator(Terminator::Any(b'\n'))
        .has_headers(true)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    let header: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(path, e))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| csv_error(path, e))?;
        if record.len() != header.len() {
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            error!(path = %path.display(), line, "[CONVERT][ERROR] Column count mismatch in intermediate file");
            return Err(PipelineError::Schema {
                path: path.to_path_buf(),
                line,
                expected: header.len(),
                found: record.len(),
            });
        }
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(TabularData { header, rows })
}

fn csv_error(path: &Path, e: csv::Error) -> PipelineError {
    PipelineError::Conversion {
        path: path.to_path_buf(),
        message: format!("could not parse intermediate file: {e}"),
    }
}

/// Render `data` as a single-sheet workbook at `path`. Every cell is a string.
pub fn render_spreadsheet(data: &TabularData, path: &Path) -> Result<()> {
    let conversion = |message: String| PipelineError::Conversion {
        path: path.to_path_buf(),
        message,
    };

    if data.rows.len() + 1 > MAX_SPREADSHEET_ROWS {
        return Err(conversion(format!(
            "{} data rows exceed the worksheet limit of {} rows",
            data.rows.len(),
            MAX_SPREADSHEET_ROWS
        )));
    }

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(WORKSHEET_NAME)
        .map_err(|e| conversion(e.to_string()))?;

    for (col, name) in data.header.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, name, &bold)
            .map_err(|e| conversion(e.to_string()))?;
    }
    for (idx, row) in data.rows.iter().enumerate() {
        let row_num = idx as u32 + 1;
        for (col, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_num, col as u16, value)
                .map_err(|e| conversion(format!("row {row_num}: {e}")))?;
        }
    }

    workbook
        .save(path)
        .map_err(|e| conversion(e.to_string()))?;
    Ok(())
}

/// Full conversion step: writes `log.tsv` into `scratch_dir`, parses it back and
/// renders the spreadsheet into `output_dir`. Returns the spreadsheet path.
pub fn convert_to_spreadsheet(
    table: &AggregatedTable,
    scratch_dir: &Path,
    output_dir: &Path,
    now: DateTime<Utc>,
) -> Result<PathBuf> {
    std::fs::create_dir_all(scratch_dir).map_err(|e| PipelineError::io(scratch_dir, e))?;
    std::fs::create_dir_all(output_dir).map_err(|e| PipelineError::io(output_dir, e))?;

    let intermediate = scratch_dir.join(INTERMEDIATE_FILE_NAME);
    write_intermediate(table, &intermediate)?;
    let data = read_intermediate(&intermediate)?;

    let spreadsheet = output_dir.join(artifact_file_name(now));
    info!(path = %spreadsheet.display(), rows = data.rows.len(), "[CONVERT] Creating spreadsheet");
    render_spreadsheet(&data, &spreadsheet)?;
    info!(path = %spreadsheet.display(), "[CONVERT] Spreadsheet written");
    Ok(spreadsheet)
}
