//! Per-case decision chains.
//!
//! A recorder owns one [`DecisionChain`] per case and linearizes appends to
//! it. Different cases never contend on record order, only on the map lock.

use std::collections::BTreeMap;

use narrative_evidence::render::level0;
use narrative_evidence::{ChainVerification, DecisionChain, DecisionTraceRecord, DraftRecord, verify_chain};
use narrative_kernel::CaseId;
use parking_lot::Mutex;

use crate::tracing_compat::trace;

/// Append-only store of decision chains.
pub trait DecisionRecorder: Send + Sync {
    /// Seal `draft` at the end of the chain for `case_id`.
    fn append(&self, case_id: &CaseId, draft: DraftRecord) -> DecisionTraceRecord;

    /// Snapshot of the chain for `case_id`; empty for unknown cases.
    fn chain(&self, case_id: &CaseId) -> Vec<DecisionTraceRecord>;

    /// Verify the stored chain for `case_id`.
    fn verify(&self, case_id: &CaseId) -> ChainVerification {
        verify_chain(&self.chain(case_id))
    }
}

/// In-memory recorder.
#[derive(Debug, Default)]
pub struct InMemoryRecorder {
    chains: Mutex<BTreeMap<CaseId, DecisionChain>>,
}

impl InMemoryRecorder {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cases with at least one record.
    pub fn cases(&self) -> Vec<CaseId> {
        self.chains.lock().keys().cloned().collect()
    }

    /// Total records across all cases.
    pub fn total_records(&self) -> usize {
        self.chains.lock().values().map(DecisionChain::len).sum()
    }
}

impl DecisionRecorder for InMemoryRecorder {
    fn append(&self, case_id: &CaseId, draft: DraftRecord) -> DecisionTraceRecord {
        let mut chains = self.chains.lock();
        let chain = chains
            .entry(case_id.clone())
            .or_insert_with(|| DecisionChain::new(case_id.clone()));
        let record = chain.append(draft).clone();
        trace!(
            case = %case_id,
            position = record.chain_position,
            record = %level0(&record),
            "decision recorded"
        );
        record
    }

    fn chain(&self, case_id: &CaseId) -> Vec<DecisionTraceRecord> {
        self.chains
            .lock()
            .get(case_id)
            .map(|c| c.records().to_vec())
            .unwrap_or_default()
    }

    fn verify(&self, case_id: &CaseId) -> ChainVerification {
        self.chains
            .lock()
            .get(case_id)
            .map(DecisionChain::verify)
            .unwrap_or_else(|| verify_chain(&[]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use narrative_evidence::{OutputContent, RejectionDisposition};
    use narrative_kernel::TraceId;
    use std::sync::Arc;

    fn failure(seq: u64) -> DraftRecord {
        DraftRecord::builder(TraceId::from_parts(1_000 + seq, u128::from(seq)))
            .timestamps(1_000 + seq, 1_001 + seq)
            .step("draft", "timeout")
            .output(OutputContent::DrafterFailed {
                attempt: 1,
                corrective: false,
                error: "timeout".into(),
                disposition: RejectionDisposition::Retry,
            })
            .build()
            .unwrap()
    }

    #[test]
    fn cases_have_independent_chains() {
        let recorder = InMemoryRecorder::new();
        let a = CaseId::new("a").unwrap();
        let b = CaseId::new("b").unwrap();
        recorder.append(&a, failure(0));
        recorder.append(&a, failure(1));
        let first_b = recorder.append(&b, failure(2));
        assert_eq!(first_b.chain_position, 0);
        assert!(first_b.hash_chain.previous_hash.is_none());
        assert_eq!(recorder.chain(&a).len(), 2);
        assert_eq!(recorder.total_records(), 3);
        assert_eq!(recorder.cases(), vec![a.clone(), b.clone()]);
        assert!(recorder.verify(&a).valid);
        assert!(recorder.verify(&b).valid);
    }

    #[test]
    fn unknown_case_is_empty_and_valid() {
        let recorder = InMemoryRecorder::new();
        let case = CaseId::new("nobody").unwrap();
        assert!(recorder.chain(&case).is_empty());
        assert!(recorder.verify(&case).valid);
    }

    #[test]
    fn concurrent_appends_stay_linear() {
        let recorder = Arc::new(InMemoryRecorder::new());
        let case = CaseId::new("shared").unwrap();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let recorder = Arc::clone(&recorder);
                let case = case.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        recorder.append(&case, failure(t * 100 + i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let chain = recorder.chain(&case);
        assert_eq!(chain.len(), 100);
        assert!(verify_chain(&chain).valid);
    }
}
