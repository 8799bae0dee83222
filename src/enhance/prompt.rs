//! Prompt text sent to the drafter.
//!
//! The exact prompt is part of each drafted record's lineage, so it is built
//! here rather than inside drafter implementations.

use std::fmt::Write;

use super::drafter::{Correction, NarrativeUnit};

/// Prompt for the first attempt.
pub fn base_prompt(unit: &NarrativeUnit) -> String {
    let mut out = String::with_capacity(unit.source_text.len() + 512);
    let _ = writeln!(out, "Rewrite the section \"{}\" ({}) as clear regulatory prose.", unit.title, unit.unit_id);
    out.push_str("Use only numbers that appear in the source text or its supporting data. ");
    out.push_str("Do not introduce, round, or recompute any figure.\n");
    if let Some(guidance) = &unit.guidance {
        let _ = writeln!(out, "\nGuidance:\n{guidance}");
    }
    let _ = write!(out, "\nSource text:\n{}\n", unit.source_text);
    out
}

/// Prompt for a corrective attempt.
///
/// Embeds the rejected text, the original source and the exact rejected
/// numbers so the drafter can remove them.
pub fn corrective_prompt(unit: &NarrativeUnit, correction: &Correction) -> String {
    let mut out = base_prompt(unit);
    let _ = write!(
        out,
        "\nYour previous draft was rejected because it stated numbers that are not \
         supported by the source data: {}.\n\
         Remove or replace every one of them with figures from the source text.\n\
         \nPrevious draft:\n{}\n",
        correction.violating_numbers.join(", "),
        correction.previous_output
    );
    out
}
