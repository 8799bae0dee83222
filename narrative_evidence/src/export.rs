//! JSONL exporter for [`DecisionTraceRecord`] chains.
//!
//! Writes one JSON object per line to an append-only file so an external
//! reporting collaborator can replay the chain without this crate.
//!
//! - Append-only semantics: existing lines are never modified.
//! - Schema version header: first line of each file is a version record.
//! - Chains are verified before a single line is written; a chain that
//!   fails [`verify_chain`] is refused whole.
//!
//! ```no_run
//! use narrative_evidence::export::JsonlExporter;
//! # fn demo(chain: &narrative_evidence::DecisionChain) -> Result<(), narrative_evidence::export::ExportError> {
//! let mut exporter = JsonlExporter::open("/tmp/case-7.dtr.jsonl".into())?;
//! exporter.append_chain(chain.records())?;
//! exporter.flush()?;
//! # Ok(())
//! # }
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use narrative_kernel::SchemaVersion;
use serde::Deserialize;

use crate::chain::{ChainIntegrityError, verify_chain};
use crate::{DTR_SCHEMA_VERSION, DecisionTraceRecord};

/// Errors raised while exporting a chain.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Underlying file I/O failed.
    #[error("audit export i/o: {0}")]
    Io(#[from] io::Error),
    /// A record could not be serialized.
    #[error("audit export serialization: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The chain failed verification and must not be exported.
    #[error("refusing to export chain: {} integrity error(s), first at position {}", .errors.len(), .errors.first().map_or(0, |e| e.position))]
    IntegrityFailure {
        /// Every finding from the verifier.
        errors: Vec<ChainIntegrityError>,
    },
}

fn schema_header() -> String {
    format!("{{\"_schema\":\"DecisionTraceRecord\",\"_version\":\"{DTR_SCHEMA_VERSION}\"}}\n")
}

/// JSONL exporter for decision trace records.
pub struct JsonlExporter {
    writer: BufWriter<File>,
    path: PathBuf,
    bytes_written: u64,
    records_written: u64,
}

impl JsonlExporter {
    /// Open a JSONL file for appending, writing a schema header if the file is new/empty.
    pub fn open(path: PathBuf) -> io::Result<Self> {
        let existing_size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::new(file);

        let mut bytes_written = existing_size;
        if existing_size == 0 {
            let header = schema_header();
            writer.write_all(header.as_bytes())?;
            bytes_written += header.len() as u64;
        }

        Ok(Self {
            writer,
            path,
            bytes_written,
            records_written: 0,
        })
    }

    /// Verify `records` as one chain, then append every record as a line.
    ///
    /// Nothing is written when verification fails. Returns bytes written.
    pub fn append_chain(&mut self, records: &[DecisionTraceRecord]) -> Result<u64, ExportError> {
        let report = verify_chain(records);
        if !report.valid {
            return Err(ExportError::IntegrityFailure {
                errors: report.errors,
            });
        }
        let mut total = 0;
        for record in records {
            total += self.append_line(record)?;
        }
        Ok(total)
    }

    fn append_line(&mut self, record: &DecisionTraceRecord) -> Result<u64, ExportError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes())?;
        let n = line.len() as u64;
        self.bytes_written += n;
        self.records_written += 1;
        Ok(n)
    }

    /// Flush buffered data to disk.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Number of records written since this exporter was opened.
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Approximate bytes in the current file.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Path of the output file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Serialize `records` to an in-memory JSONL string without a header.
pub fn to_jsonl(records: &[DecisionTraceRecord]) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    Ok(out)
}

#[derive(Deserialize)]
struct SchemaHeader {
    #[serde(rename = "_version")]
    version: String,
}

/// Read a JSONL file, returning parsed records (skipping the header).
///
/// A header from an incompatible major schema version is an
/// [`io::ErrorKind::InvalidData`] error. Partial/corrupt record lines are
/// skipped (crash recovery); run [`verify_chain`] on the result to learn
/// whether anything went missing.
pub fn read_jsonl(path: &Path) -> io::Result<Vec<DecisionTraceRecord>> {
    let content = fs::read_to_string(path)?;
    let mut records = Vec::new();
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.contains("\"_schema\"") {
            check_header(line)?;
        } else if let Ok(record) = serde_json::from_str(line) {
            records.push(record);
        }
    }
    Ok(records)
}

fn check_header(line: &str) -> io::Result<()> {
    let invalid = |detail: String| io::Error::new(io::ErrorKind::InvalidData, detail);
    let header: SchemaHeader =
        serde_json::from_str(line).map_err(|e| invalid(format!("unreadable schema header: {e}")))?;
    let written: SchemaVersion = header
        .version
        .parse()
        .map_err(|e| invalid(format!("schema header: {e}")))?;
    if DTR_SCHEMA_VERSION.is_compatible(&written) {
        Ok(())
    } else {
        Err(invalid(format!(
            "file schema {written} cannot be read at {DTR_SCHEMA_VERSION}"
        )))
    }
}
