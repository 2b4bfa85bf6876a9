//! Log decoder: gunzip one downloaded log and keep its non-comment lines.

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::{debug, error};

use crate::error::{PipelineError, Result};

pub const COMMENT_MARKER: char = '#';

/// Decode the gzip file at `path` into its retained lines.
///
/// Line terminators (`\n`, `\r\n`) are removed; lines whose first character is
/// `#` are dropped; everything else is returned verbatim, in file order.
pub fn decode_log(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let lines = decode_reader(MultiGzDecoder::new(file)).map_err(|message| {
        error!(path = %path.display(), %message, "[DECODE][ERROR] Could not decode log");
        PipelineError::Decode {
            path: path.to_path_buf(),
            message,
        }
    })?;
    debug!(path = %path.display(), lines = lines.len(), "[DECODE] Decoded log");
    Ok(lines)
}

/// Decode already-decompressed bytes from `reader`. Errors are returned as text
/// so the caller can attach the path.
pub fn decode_reader<R: Read>(reader: R) -> std::result::Result<Vec<String>, String> {
    let mut reader = BufReader::new(reader);
    let mut lines = Vec::new();
    let mut buf = Vec::new();
    let mut line_no: u64 = 0;
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| format!("line {}: {e}", line_no + 1))?;
        if read == 0 {
            break;
        }
        line_no += 1;
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        let line = std::str::from_utf8(&buf)
            .map_err(|e| format!("line {line_no}: invalid UTF-8: {e}"))?;
        if line.starts_with(COMMENT_MARKER) {
            continue;
        }
        lines.push(line.to_string());
    }
    Ok(lines)
}
