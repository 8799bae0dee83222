//! Verified audit export.
//!
//! A chain leaves the process only after it verifies. The guard re-runs
//! verification on the recorder's snapshot and refuses the whole chain on
//! any integrity finding, logging every failing position. Verified chains
//! leave as JSONL, as a graph, or as a readable paragraph report.

use std::path::Path;

use narrative_evidence::export::{ExportError, JsonlExporter, to_jsonl};
use narrative_evidence::graph::ChainGraph;
use narrative_evidence::render::{level1, level1_plain};
use narrative_evidence::{DecisionTraceRecord, verify_chain};
use narrative_kernel::CaseId;

use crate::enhance::DecisionRecorder;
use crate::error::Result;
use crate::tracing_compat::{error, info};

/// Verify `records` and return them as header-less JSONL.
pub fn export_verified(records: &[DecisionTraceRecord]) -> Result<String> {
    guard(records)?;
    Ok(to_jsonl(records).map_err(ExportError::from)?)
}

/// Append the verified chain of `case_id` to the JSONL file at `path`.
///
/// The file gets a schema header when new. Returns the record count written.
pub fn export_chain_jsonl<R>(recorder: &R, case_id: &CaseId, path: &Path) -> Result<u64>
where
    R: DecisionRecorder + ?Sized,
{
    let records = recorder.chain(case_id);
    guard(&records)?;
    let mut exporter = JsonlExporter::open(path.to_path_buf()).map_err(ExportError::from)?;
    exporter.append_chain(&records)?;
    exporter.flush().map_err(ExportError::from)?;
    info!(
        case = %case_id,
        records = exporter.records_written(),
        path = %path.display(),
        "decision chain exported"
    );
    Ok(exporter.records_written())
}

/// Graph view of the verified chain of `case_id`.
pub fn chain_graph<R>(recorder: &R, case_id: &CaseId) -> Result<ChainGraph>
where
    R: DecisionRecorder + ?Sized,
{
    let records = recorder.chain(case_id);
    guard(&records)?;
    Ok(ChainGraph::from_records(&records))
}

/// Paragraph report of the verified chain of `case_id`, one block per record.
///
/// `ansi` selects terminal colors.
pub fn chain_report<R>(recorder: &R, case_id: &CaseId, ansi: bool) -> Result<String>
where
    R: DecisionRecorder + ?Sized,
{
    let records = recorder.chain(case_id);
    guard(&records)?;
    let render = if ansi { level1 } else { level1_plain };
    Ok(records.iter().map(render).collect::<Vec<_>>().join("\n"))
}

fn guard(records: &[DecisionTraceRecord]) -> std::result::Result<(), ExportError> {
    let report = verify_chain(records);
    if report.valid {
        return Ok(());
    }
    for finding in &report.errors {
        error!(position = finding.position, kind = ?finding.kind, "{}", finding.message);
    }
    Err(ExportError::IntegrityFailure {
        errors: report.errors,
    })
}
