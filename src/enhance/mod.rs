//! Gated narrative enhancement.
//!
//! [`Enhancer`] asks a [`Drafter`] for a rewrite of one [`NarrativeUnit`],
//! gates it, and either accepts it or redrafts with a corrective prompt until
//! the attempt limit, after which the original narrative is kept. Each
//! decision is sealed into the case chain held by a [`DecisionRecorder`].

pub mod controller;
pub mod drafter;
pub mod prompt;
pub mod recorder;

pub use controller::{
    Disposition, EnhanceOutcome, EnhanceState, Enhancer, EnhancerBuilder, after_failure,
    disposition_after_failure, enhance_with_gate,
};
pub use drafter::{Correction, DraftRequest, DraftResponse, Drafter, DrafterError, NarrativeUnit};
pub use prompt::{base_prompt, corrective_prompt};
pub use recorder::{DecisionRecorder, InMemoryRecorder};
