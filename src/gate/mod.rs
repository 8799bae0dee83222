//! The numeric integrity gate.
//!
//! Bottom-up: [`token`] extracts numbers, [`corpus`] collects the numbers
//! upstream data supports, [`exemption`] and [`metric`] classify the context
//! of each number in one text, [`registry`] lists citation numbers, and
//! [`engine`] composes them into a [`GateVerdict`].
//!
//! ```
//! use narrative_gate::gate::{AllowedNumberCorpus, run_gate};
//!
//! let corpus = AllowedNumberCorpus::from_numbers(["42", "0.85"]);
//! let ok = run_gate("42 complaints, a rate of 0.85 per 1,000 units, in Section 3.2.", &corpus);
//! assert!(ok.passed);
//!
//! let bad = run_gate("42 complaints, a rate of 1.20 per 1,000 units.", &corpus);
//! assert_eq!(bad.violating_numbers, vec!["1.20"]);
//! ```

pub mod corpus;
pub mod engine;
pub mod exemption;
pub mod metric;
pub mod registry;
pub mod token;

pub use corpus::{AllowedNumberCorpus, AnalyticsCategory, AnnexTable, ArtifactValue, CaseArtifacts};
pub use engine::{GateVerdict, NumberGate, REJECTION_PREFIX, Tier, TokenEvaluation};
pub use exemption::{ContextExemptionSet, exemptions, roman_to_arabic};
pub use metric::is_metric;
pub use token::{NumericToken, extract_numbers, extract_tokens, numbers_in_value};

/// Gate `text` against `corpus` with the default policy.
pub fn run_gate(text: &str, corpus: &AllowedNumberCorpus) -> GateVerdict {
    NumberGate::default().check(text, corpus)
}

/// Build the allowed-number corpus for one case.
pub fn build_corpus(artifacts: &CaseArtifacts) -> AllowedNumberCorpus {
    AllowedNumberCorpus::build(artifacts)
}
