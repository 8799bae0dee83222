//! Crate-level error type.
//!
//! Gate verdicts and chain verification reports are values, not errors.
//! [`Error`] only covers the operations that can genuinely fail: loading a
//! policy, parsing case artifacts, sealing a record and exporting a chain.

use narrative_evidence::DraftError;
use narrative_evidence::export::ExportError;

use crate::config::ConfigError;

/// Errors surfaced by the public API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The gate policy could not be loaded or is out of range.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A decision record could not be built.
    #[error("decision record: {0}")]
    Record(#[from] DraftError),
    /// Audit export failed or was refused.
    #[error(transparent)]
    Export(#[from] ExportError),
    /// Case artifacts could not be parsed.
    #[error("case artifacts: {0}")]
    Artifacts(#[from] serde_json::Error),
}

impl Error {
    /// Whether this is an export refused because the chain failed verification.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::Export(ExportError::IntegrityFailure { .. }))
    }
}

/// Result alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
