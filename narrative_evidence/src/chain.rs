//! Append-only per-case decision chain and its verifier.
//!
//! Invariants maintained by [`DecisionChain::append`] and checked by
//! [`verify_chain`]:
//!
//! - `chain[i].chain_position == i`
//! - `chain[0].hash_chain.previous_hash` is `None`
//! - `chain[i].hash_chain.previous_hash == chain[i-1].hash_chain.content_hash`
//! - `chain[i].hash_chain.merkle_root` covers `content_hash[0..=i]`
//!
//! Verification never stops at the first failure. Every position whose own
//! checks fail is reported, and every position after the first failure is
//! reported as untrusted even when its own fields are intact.

use std::fmt;

use narrative_kernel::CaseId;
use serde::{Deserialize, Serialize};

use crate::hash::{MerkleAccumulator, content_hash};
use crate::{DecisionTraceRecord, DraftRecord, HashChain};

/// Append-only chain of decision trace records for one case.
#[derive(Debug, Clone)]
pub struct DecisionChain {
    case_id: CaseId,
    records: Vec<DecisionTraceRecord>,
    merkle: MerkleAccumulator,
}

impl DecisionChain {
    /// Empty chain for `case_id`.
    pub fn new(case_id: CaseId) -> Self {
        Self {
            case_id,
            records: Vec::new(),
            merkle: MerkleAccumulator::new(),
        }
    }

    /// Seal `draft` at the end of the chain and return the stored record.
    ///
    /// Cannot fail: the draft was validated by its builder, and position,
    /// linkage and hashes are assigned here.
    pub fn append(&mut self, draft: DraftRecord) -> &DecisionTraceRecord {
        let DraftRecord {
            trace_id,
            initiated_at,
            completed_at,
            input_lineage,
            reasoning_chain,
            output_content,
            validation_results,
        } = draft;

        let previous_hash = self
            .records
            .last()
            .map(|prev| prev.hash_chain.content_hash.clone());

        let mut record = DecisionTraceRecord {
            trace_id,
            case_id: self.case_id.clone(),
            trace_type: output_content.trace_type(),
            chain_position: self.records.len() as u64,
            initiated_at,
            completed_at,
            input_lineage,
            reasoning_chain,
            output_content,
            validation_results,
            hash_chain: HashChain {
                content_hash: String::new(),
                previous_hash,
                merkle_root: String::new(),
            },
        };
        let hash = content_hash(&record);
        record.hash_chain.merkle_root = self.merkle.push(&hash);
        record.hash_chain.content_hash = hash;

        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    /// Case this chain belongs to.
    pub fn case_id(&self) -> &CaseId {
        &self.case_id
    }

    /// All records in chain order.
    pub fn records(&self) -> &[DecisionTraceRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Merkle root of the last record, if any.
    pub fn head_root(&self) -> Option<&str> {
        self.records
            .last()
            .map(|r| r.hash_chain.merkle_root.as_str())
    }

    /// Verify this chain's stored records.
    pub fn verify(&self) -> ChainVerification {
        verify_chain(&self.records)
    }
}

/// What went wrong at one position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityErrorKind {
    /// `chain_position` differs from the record's index.
    Position,
    /// Record belongs to a different case than position 0.
    CaseMismatch,
    /// `trace_type` disagrees with the `output_content` variant.
    TraceType,
    /// Stored `content_hash` differs from the recomputed one.
    ContentHash,
    /// `previous_hash` does not match the predecessor.
    Linkage,
    /// Stored `merkle_root` differs from the recomputed one.
    MerkleRoot,
    /// Record follows an earlier integrity failure.
    Untrusted,
}

/// One integrity finding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainIntegrityError {
    /// Zero-based chain index.
    pub position: usize,
    /// Failure class.
    pub kind: IntegrityErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl fmt::Display for ChainIntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "position {}: {}", self.position, self.message)
    }
}

/// Result of [`verify_chain`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    /// `true` iff `errors` is empty.
    pub valid: bool,
    /// Number of records examined.
    pub checked: usize,
    /// Findings ordered by position.
    pub errors: Vec<ChainIntegrityError>,
}

impl ChainVerification {
    /// Lowest failing position, if any.
    pub fn first_failure(&self) -> Option<usize> {
        self.errors.first().map(|e| e.position)
    }

    /// Distinct failing positions in ascending order.
    pub fn failing_positions(&self) -> Vec<usize> {
        let mut positions: Vec<usize> = self.errors.iter().map(|e| e.position).collect();
        positions.dedup();
        positions
    }
}

/// Recompute every hash in `records` and report every mismatch.
pub fn verify_chain(records: &[DecisionTraceRecord]) -> ChainVerification {
    let mut errors = Vec::new();
    let mut merkle = MerkleAccumulator::new();
    let mut first_failure: Option<usize> = None;
    let chain_case = records.first().map(|r| &r.case_id);

    for (i, record) in records.iter().enumerate() {
        let mut own = Vec::new();
        let mut report = |kind: IntegrityErrorKind, message: String| {
            own.push(ChainIntegrityError {
                position: i,
                kind,
                message,
            });
        };

        if record.chain_position != i as u64 {
            report(
                IntegrityErrorKind::Position,
                format!("chain_position {} stored at index {i}", record.chain_position),
            );
        }
        if let Some(case) = chain_case
            && *case != record.case_id
        {
            report(
                IntegrityErrorKind::CaseMismatch,
                format!("case {} in chain of case {case}", record.case_id),
            );
        }
        let expected_type = record.output_content.trace_type();
        if record.trace_type != expected_type {
            report(
                IntegrityErrorKind::TraceType,
                format!(
                    "trace_type {} but payload is {expected_type}",
                    record.trace_type
                ),
            );
        }

        let recomputed = content_hash(record);
        if recomputed != record.hash_chain.content_hash {
            report(
                IntegrityErrorKind::ContentHash,
                format!(
                    "content hash mismatch: stored {}, recomputed {recomputed}",
                    record.hash_chain.content_hash
                ),
            );
        }

        let expected_previous = i
            .checked_sub(1)
            .map(|p| records[p].hash_chain.content_hash.as_str());
        if record.hash_chain.previous_hash.as_deref() != expected_previous {
            report(
                IntegrityErrorKind::Linkage,
                format!(
                    "previous_hash {:?} does not match predecessor {:?}",
                    record.hash_chain.previous_hash, expected_previous
                ),
            );
        }

        let root = merkle.push(&recomputed);
        if root != record.hash_chain.merkle_root {
            report(
                IntegrityErrorKind::MerkleRoot,
                format!(
                    "merkle root mismatch: stored {}, recomputed {root}",
                    record.hash_chain.merkle_root
                ),
            );
        }

        if own.is_empty() {
            if let Some(k) = first_failure {
                errors.push(ChainIntegrityError {
                    position: i,
                    kind: IntegrityErrorKind::Untrusted,
                    message: format!("follows integrity failure at position {k}"),
                });
            }
        } else {
            first_failure.get_or_insert(i);
            errors.append(&mut own);
        }
    }

    ChainVerification {
        valid: errors.is_empty(),
        checked: records.len(),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{case, rejection};
    use crate::{OutputContent, TraceType};

    fn chain_of(n: u64) -> DecisionChain {
        let mut chain = DecisionChain::new(case());
        for i in 0..n {
            chain.append(rejection(i, &["7.7"]));
        }
        chain
    }

    #[test]
    fn append_links_and_positions() {
        let chain = chain_of(4);
        let records = chain.records();
        assert!(records[0].hash_chain.previous_hash.is_none());
        for i in 1..records.len() {
            assert_eq!(
                records[i].hash_chain.previous_hash.as_deref(),
                Some(records[i - 1].hash_chain.content_hash.as_str())
            );
        }
        for (i, r) in records.iter().enumerate() {
            assert_eq!(r.chain_position, i as u64);
            assert_eq!(r.case_id, *chain.case_id());
        }
        assert_eq!(chain.head_root(), Some(records[3].hash_chain.merkle_root.as_str()));
    }

    #[test]
    fn merkle_roots_differ_per_position() {
        let chain = chain_of(3);
        let roots: Vec<&str> = chain
            .records()
            .iter()
            .map(|r| r.hash_chain.merkle_root.as_str())
            .collect();
        assert_ne!(roots[0], roots[1]);
        assert_ne!(roots[1], roots[2]);
    }

    #[test]
    fn untouched_chain_verifies() {
        let chain = chain_of(5);
        let report = chain.verify();
        assert!(report.valid, "{:?}", report.errors);
        assert_eq!(report.checked, 5);
        assert_eq!(report.first_failure(), None);
    }

    #[test]
    fn empty_chain_verifies() {
        let report = verify_chain(&[]);
        assert!(report.valid);
        assert_eq!(report.checked, 0);
    }

    #[test]
    fn tampered_payload_fails_at_and_after_position() {
        let chain = chain_of(6);
        let mut records = chain.records().to_vec();
        if let OutputContent::GateRejected {
            violating_numbers, ..
        } = &mut records[2].output_content
        {
            violating_numbers[0] = "1.1".into();
        }
        let report = verify_chain(&records);
        assert!(!report.valid);
        assert_eq!(report.failing_positions(), vec![2, 3, 4, 5]);
        assert!(
            report
                .errors
                .iter()
                .any(|e| e.position == 2 && e.kind == IntegrityErrorKind::ContentHash)
        );
    }

    #[test]
    fn tampered_content_hash_breaks_linkage_of_successor() {
        let chain = chain_of(4);
        let mut records = chain.records().to_vec();
        records[1].hash_chain.content_hash = "00".repeat(32);
        let report = verify_chain(&records);
        assert_eq!(report.failing_positions(), vec![1, 2, 3]);
        assert!(
            report
                .errors
                .iter()
                .any(|e| e.position == 2 && e.kind == IntegrityErrorKind::Linkage)
        );
    }

    #[test]
    fn tampered_merkle_root_only_invalidates_suffix() {
        let chain = chain_of(4);
        let mut records = chain.records().to_vec();
        records[3].hash_chain.merkle_root = "ff".repeat(32);
        let report = verify_chain(&records);
        assert_eq!(report.failing_positions(), vec![3]);
    }

    #[test]
    fn trace_type_must_match_payload() {
        let chain = chain_of(2);
        let mut records = chain.records().to_vec();
        records[0].trace_type = TraceType::GateAccepted;
        let report = verify_chain(&records);
        assert!(
            report
                .errors
                .iter()
                .any(|e| e.kind == IntegrityErrorKind::TraceType)
        );
        assert_eq!(report.failing_positions(), vec![0, 1]);
    }

    #[test]
    fn reordered_records_fail_position_checks() {
        let chain = chain_of(3);
        let mut records = chain.records().to_vec();
        records.swap(0, 1);
        let report = verify_chain(&records);
        assert_eq!(report.first_failure(), Some(0));
        assert!(
            report
                .errors
                .iter()
                .any(|e| e.kind == IntegrityErrorKind::Position)
        );
    }

    #[test]
    fn error_display_names_position() {
        let err = ChainIntegrityError {
            position: 4,
            kind: IntegrityErrorKind::Linkage,
            message: "broken".into(),
        };
        assert_eq!(err.to_string(), "position 4: broken");
    }

    proptest::proptest! {
        #[test]
        fn any_single_tamper_flags_exactly_the_suffix(len in 1_u64..10, pick in 0_u64..10) {
            let k = usize::try_from(pick % len).unwrap();
            let mut records = chain_of(len).records().to_vec();
            records[k].initiated_at = records[k].initiated_at.wrapping_sub(1);
            let report = verify_chain(&records);
            let expected: Vec<usize> = (k..records.len()).collect();
            proptest::prop_assert_eq!(report.failing_positions(), expected);
        }
    }
}
