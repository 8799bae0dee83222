//! Canonical hashing for decision trace records.
//!
//! Every field is fed to SHA-256 behind a one-byte tag and a little-endian
//! length prefix, so two different records can never produce the same byte
//! stream. The stream is independent of serde formatting choices, which keeps
//! `content_hash` stable across JSON library upgrades.

use sha2::{Digest, Sha256};
use std::fmt::{self, Write};

use crate::{
    DecisionTraceRecord, LineageRef, OutputContent, ReasoningStep, RejectionDisposition,
    ValidationResults,
};

/// Domain separator for record content hashes.
const CONTENT_DOMAIN: &[u8] = b"narrative-gate.dtr.content.v1";
/// Domain separator for the running merkle accumulator.
const MERKLE_DOMAIN: &[u8] = b"narrative-gate.dtr.merkle.v1";

/// Lowercase hex encoding of a digest.
pub(crate) fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Hex SHA-256 of arbitrary bytes, used for lineage source hashes.
///
/// ```
/// let h = narrative_evidence::sha256_hex(b"abc");
/// assert_eq!(h.len(), 64);
/// assert!(h.starts_with("ba7816bf"));
/// ```
pub fn sha256_hex(bytes: &[u8]) -> String {
    to_hex(&Sha256::digest(bytes))
}

struct CanonicalHasher {
    inner: Sha256,
}

impl CanonicalHasher {
    fn new(domain: &[u8]) -> Self {
        let mut inner = Sha256::new();
        inner.update(domain);
        Self { inner }
    }

    fn bytes(&mut self, tag: u8, value: &[u8]) {
        self.inner.update([tag]);
        self.inner.update((value.len() as u64).to_le_bytes());
        self.inner.update(value);
    }

    fn str(&mut self, tag: u8, value: &str) {
        self.bytes(tag, value.as_bytes());
    }

    fn u64(&mut self, tag: u8, value: u64) {
        self.bytes(tag, &value.to_le_bytes());
    }

    fn bool(&mut self, tag: u8, value: bool) {
        self.bytes(tag, &[u8::from(value)]);
    }

    fn finish(self) -> String {
        to_hex(&self.inner.finalize())
    }
}

/// Compute the content hash of a record over every field except `hash_chain`.
pub fn content_hash(record: &DecisionTraceRecord) -> String {
    let mut h = CanonicalHasher::new(CONTENT_DOMAIN);
    h.str(1, &record.trace_id.to_string());
    h.str(2, record.case_id.as_str());
    h.str(3, record.trace_type.as_str());
    h.u64(4, record.chain_position);
    h.u64(5, record.initiated_at);
    h.u64(6, record.completed_at);

    h.u64(7, record.input_lineage.len() as u64);
    for LineageRef {
        source_id,
        source_hash,
        source_type,
    } in &record.input_lineage
    {
        h.str(8, source_id);
        h.str(9, source_hash);
        h.str(10, source_type.as_str());
    }

    h.u64(11, record.reasoning_chain.len() as u64);
    for ReasoningStep {
        step_number,
        action,
        detail,
    } in &record.reasoning_chain
    {
        h.u64(12, u64::from(*step_number));
        h.str(13, action);
        h.str(14, detail);
    }

    feed_output(&mut h, &record.output_content);

    let ValidationResults { pass, messages } = &record.validation_results;
    h.bool(30, *pass);
    h.u64(31, messages.len() as u64);
    for m in messages {
        h.str(32, m);
    }

    h.finish()
}

fn feed_output(h: &mut CanonicalHasher, output: &OutputContent) {
    h.str(15, output.trace_type().as_str());
    match output {
        OutputContent::NarrativeDrafted {
            attempt,
            corrective,
            draft_hash,
            call,
        } => {
            h.u64(16, u64::from(*attempt));
            h.bool(17, *corrective);
            h.str(18, draft_hash);
            h.str(19, &call.correlation_id);
            h.u64(20, call.input_tokens);
            h.u64(33, call.output_tokens);
            h.u64(21, call.latency_ms);
            h.u64(22, call.cost_micros);
            h.str(23, &call.provider);
            h.str(34, &call.model);
        }
        OutputContent::DrafterFailed {
            attempt,
            corrective,
            error,
            disposition,
        } => {
            h.u64(16, u64::from(*attempt));
            h.bool(17, *corrective);
            h.str(24, error);
            h.str(29, disposition_name(*disposition));
        }
        OutputContent::GateAccepted {
            attempt,
            accepted_hash,
            numbers_checked,
        } => {
            h.u64(16, u64::from(*attempt));
            h.str(25, accepted_hash);
            h.u64(26, *numbers_checked as u64);
        }
        OutputContent::GateRejected {
            attempt,
            violating_numbers,
            disposition,
        } => {
            h.u64(16, u64::from(*attempt));
            h.u64(27, violating_numbers.len() as u64);
            for n in violating_numbers {
                h.str(28, n);
            }
            h.str(29, disposition_name(*disposition));
        }
    }
}

const fn disposition_name(disposition: RejectionDisposition) -> &'static str {
    match disposition {
        RejectionDisposition::Retry => "retry",
        RejectionDisposition::FallbackOriginal => "fallback_original",
    }
}

/// Running merkle accumulator over the ordered content hashes of a chain.
///
/// The root at position `i` is `SHA-256(domain || h0 || h1 || ... || hi)`.
/// Cloning the hasher state makes each root O(1) to emit.
#[derive(Clone)]
pub struct MerkleAccumulator {
    state: Sha256,
    count: usize,
}

impl MerkleAccumulator {
    /// Start an empty accumulator.
    pub fn new() -> Self {
        let mut state = Sha256::new();
        state.update(MERKLE_DOMAIN);
        Self { state, count: 0 }
    }

    /// Fold the next content hash and return the root covering it.
    pub fn push(&mut self, content_hash: &str) -> String {
        self.state.update(content_hash.as_bytes());
        self.count += 1;
        to_hex(&self.state.clone().finalize())
    }

    /// Number of hashes folded so far.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether nothing has been folded yet.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl Default for MerkleAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MerkleAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerkleAccumulator")
            .field("count", &self.count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_is_lowercase_and_padded() {
        assert_eq!(to_hex(&[0x00, 0x0f, 0xab]), "000fab");
    }

    #[test]
    fn merkle_root_matches_recompute_from_scratch() {
        let hashes = ["aa", "bb", "cc"];
        let mut acc = MerkleAccumulator::new();
        let roots: Vec<String> = hashes.iter().map(|h| acc.push(h)).collect();

        for i in 0..hashes.len() {
            let mut fresh = MerkleAccumulator::new();
            let mut last = String::new();
            for h in &hashes[..=i] {
                last = fresh.push(h);
            }
            assert_eq!(roots[i], last);
        }
        assert_eq!(acc.len(), 3);
    }

    #[test]
    fn merkle_root_depends_on_order() {
        let mut a = MerkleAccumulator::new();
        a.push("aa");
        let ab = a.push("bb");
        let mut b = MerkleAccumulator::new();
        b.push("bb");
        let ba = b.push("aa");
        assert_ne!(ab, ba);
    }
}
