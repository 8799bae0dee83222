//! The drafting seam.
//!
//! Text generation lives outside this crate. The controller only needs an
//! awaitable call that turns a [`DraftRequest`] into text plus call metadata.

use std::future::Future;

use narrative_evidence::CallMetadata;
use narrative_kernel::{CaseId, UnitId};
use serde::{Deserialize, Serialize};

/// Narrative section to enhance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeUnit {
    /// Case the section belongs to; selects the decision chain.
    pub case_id: CaseId,
    /// Section identifier.
    pub unit_id: UnitId,
    /// Section title.
    pub title: String,
    /// Pre-enhancement narrative. Returned unchanged on fallback.
    pub source_text: String,
    /// Optional writing guidance for the drafter.
    pub guidance: Option<String>,
}

/// Feedback carried into a corrective attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Correction {
    /// Text of the rejected attempt.
    pub previous_output: String,
    /// Exact numbers the gate rejected.
    pub violating_numbers: Vec<String>,
}

/// One call to the drafter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DraftRequest {
    /// Section identifier.
    pub unit_id: UnitId,
    /// Section title.
    pub title: String,
    /// Original narrative.
    pub source_text: String,
    /// Writing guidance, if any.
    pub guidance: Option<String>,
    /// Present on corrective attempts.
    pub correction: Option<Correction>,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Fully rendered prompt.
    pub prompt: String,
}

impl DraftRequest {
    /// Whether this is a corrective attempt.
    pub fn is_corrective(&self) -> bool {
        self.correction.is_some()
    }
}

/// Text returned by the drafter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DraftResponse {
    /// Drafted narrative.
    pub text: String,
    /// Correlation, token, latency, cost and provenance data.
    pub metadata: CallMetadata,
}

/// Errors a drafter can report. Each counts as a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DrafterError {
    /// Transport or service failure.
    #[error("drafter transport failure: {0}")]
    Transport(String),
    /// The call exceeded its deadline.
    #[error("drafter timed out after {after_ms}ms")]
    Timeout {
        /// Elapsed time when the caller gave up.
        after_ms: u64,
    },
    /// The service answered with no text.
    #[error("drafter returned an empty response")]
    EmptyResponse,
}

/// Source of drafted narrative text.
pub trait Drafter: Send + Sync {
    /// Draft text for `request`.
    fn draft(
        &self,
        request: &DraftRequest,
    ) -> impl Future<Output = Result<DraftResponse, DrafterError>> + Send;
}
