//! 📂 Previously, on "Things That Could Go Wrong With A File"...
//!
//! The crawl ran for nine hours. Then the disk filled up, the gzip stream got cut mid-sentence,
//! and the last line of the dump ends in `{"_id": "abc", "tit`. Somebody still wants the first
//! eight hours and fifty-nine minutes uploaded.
//!
//! This module reads line-delimited JSON, one record per line, lazily. `.gz` inputs are
//! decompressed on the fly. In `broken` mode the final line (and a truncated gzip tail) are
//! forgiven. Every other bad line is fatal.
//!
//! 🚰 File → (gunzip) → BufReader → one [`Record`] per line → whoever is pulling
//! 🦆

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use tracing::{debug, warn};

use crate::common::Record;
use crate::errors::UploadError;

/// 📄 A record plus the line it came from, so error messages can point at it.
#[derive(Debug, Clone, PartialEq)]
pub struct LineRecord {
    /// 1-based line number
    pub line: u64,
    pub record: Record,
}

/// 📂 Forward-only JSON-lines reader.
///
/// Never reads past the record it hands out. A line that fails to parse in broken mode is
/// the one exception: the reader peeks one line further to learn whether it was the last.
pub struct RecordSource<R> {
    reader: R,
    broken: bool,
    lines_read: u64,
    exhausted: bool,
    finished: bool,
}

impl<R> std::fmt::Debug for RecordSource<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordSource")
            .field("broken", &self.broken)
            .field("lines_read", &self.lines_read)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

/// 🫁 Does this path want gunzipping? Same rule as every crawl dump ever: look at the extension.
pub fn is_gzipped(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// 🚪 Opens `path` as a record source, gunzipping `.gz` files.
pub fn open(path: &Path, broken: bool) -> Result<RecordSource<Box<dyn BufRead + Send>>> {
    let file = File::open(path).with_context(|| {
        format!(
            "💀 The door to '{}' would not budge. It might not exist. It might not be ours to read.",
            path.display()
        )
    })?;

    let reader: Box<dyn BufRead + Send> = if is_gzipped(path) {
        debug!("🫁 {} looks gzipped, decompressing on the fly", path.display());
        Box::new(BufReader::new(MultiGzDecoder::new(BufReader::new(file))))
    } else {
        Box::new(BufReader::new(file))
    };

    Ok(RecordSource::new(reader, broken))
}

impl<R: BufRead> RecordSource<R> {
    pub fn new(reader: R, broken: bool) -> Self {
        Self {
            reader,
            broken,
            lines_read: 0,
            exhausted: false,
            finished: false,
        }
    }

    /// 🔢 Physical lines consumed so far, blank ones included.
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    /// 📖 Next non-blank line, or `None` at end of input.
    ///
    /// In broken mode a decompression/read failure counts as end of input; whatever bytes made
    /// it out before the failure become the final line.
    fn read_line(&mut self) -> Result<Option<(u64, Vec<u8>)>> {
        loop {
            if self.exhausted {
                return Ok(None);
            }
            let mut buf = Vec::new();
            match self.reader.read_until(b'\n', &mut buf) {
                Ok(0) => {
                    self.exhausted = true;
                    return Ok(None);
                }
                Ok(_) => {}
                Err(err) if self.broken && is_truncation(&err) => {
                    warn!(
                        "⚠️ input ended abruptly after line {} ({}); treating it as the end",
                        self.lines_read, err
                    );
                    self.exhausted = true;
                    if buf.is_empty() {
                        return Ok(None);
                    }
                }
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("💀 failed reading input after line {}", self.lines_read)
                    });
                }
            }

            self.lines_read += 1;
            let trimmed = buf.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Some((self.lines_read, trimmed.to_vec())));
        }
    }

    fn next_record(&mut self) -> Result<Option<LineRecord>> {
        let Some((line, bytes)) = self.read_line()? else {
            return Ok(None);
        };

        match parse_record(&bytes) {
            Ok(record) => Ok(Some(LineRecord { line, record })),
            // -- 🔭 only a bad line earns a peek ahead: is there anything after it?
            Err(reason) if self.broken && self.read_line()?.is_none() => {
                warn!(
                    "✂️ dropping truncated trailing line {} ({} bytes): {}",
                    line,
                    bytes.len(),
                    reason
                );
                Ok(None)
            }
            Err(reason) => Err(UploadError::InputParse { line, reason }.into()),
        }
    }
}

impl<R: BufRead> Iterator for RecordSource<R> {
    type Item = Result<LineRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let next = self.next_record().transpose();
        if !matches!(next, Some(Ok(_))) {
            // -- 🏁 end of input or a fatal line; either way, we are done here
            self.finished = true;
        }
        next
    }
}

fn parse_record(bytes: &[u8]) -> std::result::Result<Record, String> {
    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(serde_json::Value::Object(record)) => Ok(record),
        Ok(other) => Err(format!("expected a JSON object, found {}", json_kind(&other))),
        Err(err) => Err(err.to_string()),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

// -- ✂️ what a cut-off gzip stream looks like from the reading end
fn is_truncation(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData
    )
}
