//! Human-readable renderings of [`DecisionTraceRecord`] entries.
//!
//! - **Level 0** (one-liner): fits in a single 120-char terminal line.
//! - **Level 1** (paragraph): multi-line block, with or without ANSI colors.
//!
//! Renderers are stateless and deterministic.

use std::fmt::Write;

use crate::{DecisionTraceRecord, OutputContent, RejectionDisposition};

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const CYAN: &str = "\x1b[36m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";

fn outcome_summary(content: &OutputContent) -> String {
    match content {
        OutputContent::NarrativeDrafted {
            attempt,
            corrective,
            call,
            ..
        } => {
            let kind = if *corrective { "corrective" } else { "base" };
            format!(
                "attempt {attempt} drafted ({kind}, {}ms, corr={})",
                call.latency_ms, call.correlation_id
            )
        }
        OutputContent::DrafterFailed {
            attempt,
            error,
            disposition,
            ..
        } => format!(
            "attempt {attempt} drafter failed: {error} -> {}",
            disposition_label(*disposition)
        ),
        OutputContent::GateAccepted {
            attempt,
            numbers_checked,
            ..
        } => format!("attempt {attempt} accepted ({numbers_checked} numbers checked)"),
        OutputContent::GateRejected {
            attempt,
            violating_numbers,
            disposition,
        } => {
            format!(
                "attempt {attempt} rejected [{}] -> {}",
                violating_numbers.join(", "),
                disposition_label(*disposition)
            )
        }
    }
}

const fn disposition_label(disposition: RejectionDisposition) -> &'static str {
    match disposition {
        RejectionDisposition::Retry => "retry",
        RejectionDisposition::FallbackOriginal => "FALLBACK",
    }
}

fn outcome_color(content: &OutputContent) -> &'static str {
    match content {
        OutputContent::GateAccepted { .. } => GREEN,
        OutputContent::NarrativeDrafted { .. } => CYAN,
        OutputContent::GateRejected {
            disposition: RejectionDisposition::Retry,
            ..
        }
        | OutputContent::DrafterFailed {
            disposition: RejectionDisposition::Retry,
            ..
        } => YELLOW,
        OutputContent::GateRejected { .. } | OutputContent::DrafterFailed { .. } => RED,
    }
}

/// Render a Level 0 one-liner (no ANSI, max 120 chars).
///
/// Format: `#{position} {case} {trace_type}: {summary}`
pub fn level0(record: &DecisionTraceRecord) -> String {
    let line = format!(
        "#{} {} {}: {}",
        record.chain_position,
        record.case_id,
        record.trace_type,
        outcome_summary(&record.output_content)
    );
    if line.chars().count() > 120 {
        let mut truncated: String = line.chars().take(117).collect();
        truncated.push_str("...");
        truncated
    } else {
        line
    }
}

/// Render a Level 1 paragraph with ANSI colors.
pub fn level1(record: &DecisionTraceRecord) -> String {
    paragraph(record, true)
}

/// Render a Level 1 paragraph without ANSI colors.
pub fn level1_plain(record: &DecisionTraceRecord) -> String {
    paragraph(record, false)
}

fn paragraph(record: &DecisionTraceRecord, ansi: bool) -> String {
    let (reset, bold, dim, cyan) = if ansi {
        (RESET, BOLD, DIM, CYAN)
    } else {
        ("", "", "", "")
    };
    let color = if ansi {
        outcome_color(&record.output_content)
    } else {
        ""
    };
    let mut out = String::with_capacity(512);

    let _ = writeln!(
        out,
        "{bold}{cyan}#{} {}{reset} {dim}->{reset} {color}{bold}{}{reset}",
        record.chain_position, record.case_id, record.trace_type,
    );
    let _ = writeln!(
        out,
        "  {}  {dim}({}ms){reset}",
        outcome_summary(&record.output_content),
        record.completed_at.saturating_sub(record.initiated_at),
    );

    if !record.input_lineage.is_empty() {
        let _ = write!(out, "  lineage: ");
        for (i, src) in record.input_lineage.iter().enumerate() {
            if i > 0 {
                let _ = write!(out, ", ");
            }
            let short = src.source_hash.get(..8).unwrap_or(&src.source_hash);
            let _ = write!(
                out,
                "{}:{} {dim}{short}{reset}",
                src.source_type.as_str(),
                src.source_id
            );
        }
        let _ = writeln!(out);
    }

    for step in &record.reasoning_chain {
        let _ = writeln!(
            out,
            "  {dim}{}.{reset} {bold}{}{reset}: {}",
            step.step_number, step.action, step.detail
        );
    }

    let status = if record.validation_results.pass {
        "pass"
    } else {
        "fail"
    };
    let _ = writeln!(out, "  validation: {status}");
    for msg in &record.validation_results.messages {
        let _ = writeln!(out, "    - {msg}");
    }

    let short_hash = record
        .hash_chain
        .content_hash
        .get(..16)
        .unwrap_or(&record.hash_chain.content_hash);
    let _ = writeln!(out, "  {dim}hash {short_hash}{reset}");
    out
}
