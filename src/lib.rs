//! Narrative gate: numeric integrity checking for generated regulatory prose.
//!
//! # Overview
//!
//! Generated narrative may restate computed figures in its own words, but it
//! must never assert a number that cannot be traced to the data it was
//! generated from. This crate enforces that with a gate that every drafted
//! text passes through, and records every accept or reject decision in a
//! per-case, hash-linked chain that can be verified and exported.
//!
//! # Core Guarantees
//!
//! - **No unsupported rates**: a number in rate, percentage or count context is
//!   accepted only if the corpus backs it, within a tolerance band at most
//! - **Citation tolerance**: article, annex, guidance, standard and date
//!   numbers are recognized from their context, not from a blanket allowlist
//! - **Safe convergence**: after the last failed attempt the original
//!   narrative is kept unchanged
//! - **Tamper evidence**: altering any recorded decision invalidates it and
//!   every later record
//!
//! # Module Structure
//!
//! - [`gate`]: token extraction, corpus, exemptions, metric context, verdicts
//! - [`enhance`]: drafter seam, retry controller, decision recorder
//! - [`audit`]: verified JSONL export, graph view and paragraph report
//! - [`config`]: [`GatePolicy`] and TOML loading
//! - [`time`]: wall and virtual clocks
//! - [`util`]: entropy sources for trace ids
//! - [`error`](mod@error): crate error type
//! - [`tracing_compat`]: optional tracing integration
//!
//! # Example
//!
//! ```
//! use narrative_gate::{AnalyticsCategory, CaseArtifacts, build_corpus, run_gate};
//!
//! let artifacts = CaseArtifacts::default()
//!     .with_analytics(AnalyticsCategory::Complaints, serde_json::json!({"count": 42, "rate": 0.85}))
//!     .with_original_narrative("Complaint handling is described in Section 3.2.");
//! let corpus = build_corpus(&artifacts);
//!
//! let verdict = run_gate("42 complaints, a rate of 0.85 per 1,000 units, in Section 3.2.", &corpus);
//! assert!(verdict.passed);
//!
//! let verdict = run_gate("42 complaints, a rate of 1.20 per 1,000 units.", &corpus);
//! assert_eq!(verdict.violating_numbers, vec!["1.20"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_inception)]
#![allow(clippy::doc_markdown)]

pub mod audit;
pub mod config;
pub mod enhance;
pub mod error;
pub mod gate;
pub mod time;
pub mod tracing_compat;
pub mod util;

pub use config::{ConfigError, GatePolicy, YearRange};
pub use enhance::{
    DecisionRecorder, Disposition, DraftRequest, DraftResponse, Drafter, DrafterError,
    EnhanceOutcome, Enhancer, InMemoryRecorder, NarrativeUnit, enhance_with_gate,
};
pub use error::{Error, Result};
pub use gate::{
    AllowedNumberCorpus, AnalyticsCategory, AnnexTable, ArtifactValue, CaseArtifacts, GateVerdict,
    NumberGate, build_corpus, run_gate,
};

pub use narrative_evidence::{
    ChainVerification, DecisionChain, DecisionTraceRecord, TraceType, verify_chain,
};
pub use narrative_kernel::{CaseId, TraceId, UnitId};
