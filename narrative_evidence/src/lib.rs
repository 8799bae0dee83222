//! Decision trace records for the narrative gate.
//!
//! A [`DecisionTraceRecord`] (DTR) is one immutable entry in a per-case,
//! append-only [`DecisionChain`]. Each record carries the lineage of the
//! artifacts it consumed, a numbered reasoning narration, a typed
//! [`OutputContent`] payload and a [`HashChain`] linking it to its
//! predecessor.
//!
//! # Example
//!
//! ```
//! use narrative_evidence::{DecisionChain, DraftRecord, OutputContent, RejectionDisposition};
//! use narrative_kernel::{CaseId, TraceId};
//!
//! let case = CaseId::new("case-7").unwrap();
//! let mut chain = DecisionChain::new(case);
//!
//! let draft = DraftRecord::builder(TraceId::from_parts(1_700_000_000_000, 1))
//!     .timestamps(1_700_000_000_000, 1_700_000_000_010)
//!     .step("gate", "rejected 3.7")
//!     .output(OutputContent::GateRejected {
//!         attempt: 1,
//!         violating_numbers: vec!["3.7".into()],
//!         disposition: RejectionDisposition::Retry,
//!     })
//!     .validation(false, ["unsupported number 3.7"])
//!     .build()
//!     .unwrap();
//!
//! let record = chain.append(draft);
//! assert_eq!(record.chain_position, 0);
//! assert!(record.hash_chain.previous_hash.is_none());
//! assert!(chain.verify().valid);
//! ```

#![forbid(unsafe_code)]

pub mod chain;
pub mod export;
pub mod graph;
pub mod hash;
pub mod render;

use std::fmt;

use narrative_kernel::{CaseId, SchemaVersion, TraceId};
use serde::{Deserialize, Serialize};

pub use chain::{ChainIntegrityError, ChainVerification, DecisionChain, IntegrityErrorKind, verify_chain};
pub use hash::{MerkleAccumulator, content_hash, sha256_hex};

/// Schema version of [`DecisionTraceRecord`] as exported.
pub const DTR_SCHEMA_VERSION: SchemaVersion = SchemaVersion::new(1, 0, 0);

// ---------------------------------------------------------------------------
// Closed enumerations
// ---------------------------------------------------------------------------

/// Kind of decision a record documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceType {
    /// The drafter returned a candidate narrative.
    NarrativeDrafted,
    /// The drafter call errored or timed out.
    DrafterFailed,
    /// The gate accepted a drafted narrative.
    GateAccepted,
    /// The gate rejected a drafted narrative.
    GateRejected,
}

impl TraceType {
    /// Stable snake_case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NarrativeDrafted => "narrative_drafted",
            Self::DrafterFailed => "drafter_failed",
            Self::GateAccepted => "gate_accepted",
            Self::GateRejected => "gate_rejected",
        }
    }
}

impl fmt::Display for TraceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of upstream artifact referenced from `input_lineage`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// The pre-enhancement narrative of the unit.
    SourceNarrative,
    /// The prompt sent to the drafter.
    Prompt,
    /// Text returned by the drafter.
    DraftOutput,
    /// The allowed-number corpus snapshot the gate ran against.
    NumberCorpus,
    /// One computed analytics category.
    Analytics,
    /// One annex or summary table.
    AnnexTable,
}

impl SourceType {
    /// Stable snake_case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SourceNarrative => "source_narrative",
            Self::Prompt => "prompt",
            Self::DraftOutput => "draft_output",
            Self::NumberCorpus => "number_corpus",
            Self::Analytics => "analytics",
            Self::AnnexTable => "annex_table",
        }
    }
}

/// What the controller does after a rejection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionDisposition {
    /// Another corrective attempt follows.
    Retry,
    /// Attempts are exhausted; the original narrative is retained.
    FallbackOriginal,
}

// ---------------------------------------------------------------------------
// Record components
// ---------------------------------------------------------------------------

/// Reference to an upstream artifact that fed a decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageRef {
    /// Stable identifier of the artifact in its own store.
    pub source_id: String,
    /// Hex SHA-256 of the artifact content.
    pub source_hash: String,
    /// Artifact kind.
    pub source_type: SourceType,
}

impl LineageRef {
    /// Build a reference, hashing `content` for `source_hash`.
    pub fn hashed(source_id: impl Into<String>, source_type: SourceType, content: &[u8]) -> Self {
        Self {
            source_id: source_id.into(),
            source_hash: sha256_hex(content),
            source_type,
        }
    }
}

/// One step of the human-auditable narration of a decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// 1-based step number.
    pub step_number: u32,
    /// Short verb phrase.
    pub action: String,
    /// Free-text detail.
    pub detail: String,
}

/// Metadata of one drafter call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallMetadata {
    /// Correlation identifier assigned by the drafting service.
    pub correlation_id: String,
    /// Prompt tokens consumed.
    pub input_tokens: u64,
    /// Completion tokens produced.
    pub output_tokens: u64,
    /// Wall-clock latency of the call.
    pub latency_ms: u64,
    /// Cost in millionths of the billing currency.
    pub cost_micros: u64,
    /// Service that produced the draft.
    pub provider: String,
    /// Model or engine identifier.
    pub model: String,
}

/// Decision-specific payload; one variant per [`TraceType`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputContent {
    /// A candidate narrative was received.
    NarrativeDrafted {
        /// 1-based attempt number.
        attempt: u32,
        /// Whether the prompt was a corrective one.
        corrective: bool,
        /// Hex SHA-256 of the drafted text.
        draft_hash: String,
        /// Call metadata reported by the drafter.
        call: CallMetadata,
    },
    /// The drafter call failed.
    DrafterFailed {
        /// 1-based attempt number.
        attempt: u32,
        /// Whether the prompt was a corrective one.
        corrective: bool,
        /// Rendered error.
        error: String,
        /// What happens next.
        disposition: RejectionDisposition,
    },
    /// The gate accepted the drafted text.
    GateAccepted {
        /// 1-based attempt number.
        attempt: u32,
        /// Hex SHA-256 of the accepted text.
        accepted_hash: String,
        /// Numeric tokens the gate evaluated.
        numbers_checked: usize,
    },
    /// The gate rejected the drafted text.
    GateRejected {
        /// 1-based attempt number.
        attempt: u32,
        /// Deduplicated normalized violating numbers, in order of appearance.
        violating_numbers: Vec<String>,
        /// What happens next.
        disposition: RejectionDisposition,
    },
}

impl OutputContent {
    /// The trace type this payload belongs to.
    pub const fn trace_type(&self) -> TraceType {
        match self {
            Self::NarrativeDrafted { .. } => TraceType::NarrativeDrafted,
            Self::DrafterFailed { .. } => TraceType::DrafterFailed,
            Self::GateAccepted { .. } => TraceType::GateAccepted,
            Self::GateRejected { .. } => TraceType::GateRejected,
        }
    }

    /// Attempt number carried by every variant.
    pub const fn attempt(&self) -> u32 {
        match self {
            Self::NarrativeDrafted { attempt, .. }
            | Self::DrafterFailed { attempt, .. }
            | Self::GateAccepted { attempt, .. }
            | Self::GateRejected { attempt, .. } => *attempt,
        }
    }
}

/// Outcome of the checks a decision ran.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResults {
    /// Whether the checks passed.
    pub pass: bool,
    /// Ordered human-readable messages.
    pub messages: Vec<String>,
}

/// Hash linkage of a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashChain {
    /// Hex SHA-256 over every record field except this one.
    pub content_hash: String,
    /// `content_hash` of the previous record; `None` for position 0.
    pub previous_hash: Option<String>,
    /// Hash over `content_hash[0..=position]`.
    pub merkle_root: String,
}

/// One immutable, hash-linked audit entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionTraceRecord {
    /// Unique record identifier.
    pub trace_id: TraceId,
    /// Case whose chain holds this record.
    pub case_id: CaseId,
    /// Decision kind.
    pub trace_type: TraceType,
    /// Zero-based index within the case chain.
    pub chain_position: u64,
    /// Decision start, unix milliseconds.
    pub initiated_at: u64,
    /// Decision end, unix milliseconds.
    pub completed_at: u64,
    /// Upstream artifacts consumed.
    pub input_lineage: Vec<LineageRef>,
    /// Why the decision was reached.
    pub reasoning_chain: Vec<ReasoningStep>,
    /// Decision payload.
    pub output_content: OutputContent,
    /// Checks run and their messages.
    pub validation_results: ValidationResults,
    /// Hash linkage.
    pub hash_chain: HashChain,
}

// ---------------------------------------------------------------------------
// DraftRecord + builder
// ---------------------------------------------------------------------------

/// A record before it is placed in a chain.
///
/// Only [`DecisionChain::append`] can turn a draft into a
/// [`DecisionTraceRecord`], because only the chain knows the position and
/// predecessor hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DraftRecord {
    pub(crate) trace_id: TraceId,
    pub(crate) initiated_at: u64,
    pub(crate) completed_at: u64,
    pub(crate) input_lineage: Vec<LineageRef>,
    pub(crate) reasoning_chain: Vec<ReasoningStep>,
    pub(crate) output_content: OutputContent,
    pub(crate) validation_results: ValidationResults,
}

impl DraftRecord {
    /// Start building a draft with the given trace id.
    pub fn builder(trace_id: TraceId) -> DraftRecordBuilder {
        DraftRecordBuilder::new(trace_id)
    }

    /// Decision kind of the payload.
    pub const fn trace_type(&self) -> TraceType {
        self.output_content.trace_type()
    }

    /// Trace id the record will carry.
    pub const fn trace_id(&self) -> TraceId {
        self.trace_id
    }
}

/// Errors from [`DraftRecordBuilder::build`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    /// No output payload was set.
    #[error("draft record is missing its output content")]
    MissingOutput,
    /// `completed_at` precedes `initiated_at`.
    #[error("completed_at {completed_at} precedes initiated_at {initiated_at}")]
    TimestampsReversed {
        /// Start time.
        initiated_at: u64,
        /// End time.
        completed_at: u64,
    },
}

/// Builder for [`DraftRecord`]; reasoning steps are numbered in call order.
#[derive(Clone, Debug)]
pub struct DraftRecordBuilder {
    trace_id: TraceId,
    initiated_at: u64,
    completed_at: u64,
    input_lineage: Vec<LineageRef>,
    reasoning_chain: Vec<ReasoningStep>,
    output_content: Option<OutputContent>,
    validation_results: ValidationResults,
}

impl DraftRecordBuilder {
    /// New builder.
    pub fn new(trace_id: TraceId) -> Self {
        Self {
            trace_id,
            initiated_at: 0,
            completed_at: 0,
            input_lineage: Vec::new(),
            reasoning_chain: Vec::new(),
            output_content: None,
            validation_results: ValidationResults::default(),
        }
    }

    /// Set start and end timestamps (unix ms).
    #[must_use]
    pub fn timestamps(mut self, initiated_at: u64, completed_at: u64) -> Self {
        self.initiated_at = initiated_at;
        self.completed_at = completed_at;
        self
    }

    /// Append a lineage reference.
    #[must_use]
    pub fn lineage(mut self, reference: LineageRef) -> Self {
        self.input_lineage.push(reference);
        self
    }

    /// Append a reasoning step; its number is assigned here.
    #[must_use]
    pub fn step(mut self, action: impl Into<String>, detail: impl Into<String>) -> Self {
        let step_number = u32::try_from(self.reasoning_chain.len() + 1).unwrap_or(u32::MAX);
        self.reasoning_chain.push(ReasoningStep {
            step_number,
            action: action.into(),
            detail: detail.into(),
        });
        self
    }

    /// Set the decision payload.
    #[must_use]
    pub fn output(mut self, content: OutputContent) -> Self {
        self.output_content = Some(content);
        self
    }

    /// Set validation outcome and messages.
    #[must_use]
    pub fn validation<I, S>(mut self, pass: bool, messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.validation_results = ValidationResults {
            pass,
            messages: messages.into_iter().map(Into::into).collect(),
        };
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<DraftRecord, DraftError> {
        let output_content = self.output_content.ok_or(DraftError::MissingOutput)?;
        if self.completed_at < self.initiated_at {
            return Err(DraftError::TimestampsReversed {
                initiated_at: self.initiated_at,
                completed_at: self.completed_at,
            });
        }
        Ok(DraftRecord {
            trace_id: self.trace_id,
            initiated_at: self.initiated_at,
            completed_at: self.completed_at,
            input_lineage: self.input_lineage,
            reasoning_chain: self.reasoning_chain,
            output_content,
            validation_results: self.validation_results,
        })
    }
}
