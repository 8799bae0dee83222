//! Decision chain integrity, tamper detection and verified export.

#![allow(missing_docs)]

#[macro_use]
mod common;

use common::{AlwaysFabricates, complaints_unit, det_enhancer};
use narrative_evidence::export::read_jsonl;
use narrative_evidence::graph::EdgeKind;
use narrative_evidence::{DecisionTraceRecord, DraftRecord, IntegrityErrorKind, verify_chain};
use narrative_gate::audit::{chain_graph, export_chain_jsonl, export_verified};
use narrative_gate::{AllowedNumberCorpus, CaseId, ChainVerification, DecisionRecorder, GatePolicy, InMemoryRecorder};

fn fabricated_chain(case: &str) -> (InMemoryRecorder, CaseId) {
    let (enhancer, _clock) = det_enhancer(GatePolicy::default(), 11);
    let unit = complaints_unit(case);
    let recorder = InMemoryRecorder::new();
    let corpus = AllowedNumberCorpus::from_numbers(["42", "0.85"]);
    futures_lite::future::block_on(enhancer.enhance(&unit, &AlwaysFabricates::default(), &corpus, &recorder))
        .expect("enhance");
    (recorder, unit.case_id)
}

/// Read-only recorder over a fixed, possibly tampered, record list.
struct Frozen(Vec<DecisionTraceRecord>);

impl DecisionRecorder for Frozen {
    fn append(&self, _case_id: &CaseId, _draft: DraftRecord) -> DecisionTraceRecord {
        unreachable!("frozen recorder is read-only")
    }

    fn chain(&self, _case_id: &CaseId) -> Vec<DecisionTraceRecord> {
        self.0.clone()
    }
}

#[test]
fn recorded_chain_is_linked() {
    common::init_test_logging();
    test_phase!("Chain linkage");

    let (recorder, case) = fabricated_chain("case-link");
    let chain = recorder.chain(&case);
    assert_eq!(chain.len(), 6);

    assert!(chain[0].hash_chain.previous_hash.is_none());
    for (i, pair) in chain.windows(2).enumerate() {
        assert_eq!(pair[1].chain_position, i as u64 + 1);
        assert_eq!(
            pair[1].hash_chain.previous_hash.as_deref(),
            Some(pair[0].hash_chain.content_hash.as_str())
        );
        assert_ne!(pair[1].hash_chain.merkle_root, pair[0].hash_chain.merkle_root);
    }
    let report = recorder.verify(&case);
    assert_with_log!(report.valid, "valid", true, &report);
    assert_eq!(report.checked, 6);

    test_complete!("recorded_chain_is_linked", records = chain.len());
}

#[test]
fn tampering_flags_the_record_and_every_successor() {
    common::init_test_logging();
    test_phase!("Tamper detection");

    let (recorder, case) = fabricated_chain("case-tamper");
    let pristine = recorder.chain(&case);

    for k in 0..pristine.len() {
        test_section!(format!("tamper record {k}"));
        let mut chain = pristine.clone();
        chain[k].reasoning_chain[0].detail.push_str(" (edited)");

        let report: ChainVerification = verify_chain(&chain);
        assert!(!report.valid);
        assert_eq!(report.first_failure(), Some(k));
        assert_eq!(report.failing_positions(), (k..chain.len()).collect::<Vec<_>>());
        assert!(
            report
                .errors
                .iter()
                .any(|e| e.position == k && e.kind == IntegrityErrorKind::ContentHash)
        );
    }

    test_complete!("tampering_flags_the_record_and_every_successor");
}

#[test]
fn reordering_and_truncation_are_detected() {
    common::init_test_logging();
    let (recorder, case) = fabricated_chain("case-order");
    let mut chain = recorder.chain(&case);

    chain.swap(2, 3);
    assert_eq!(verify_chain(&chain).first_failure(), Some(2));

    let chain = recorder.chain(&case);
    assert!(verify_chain(&chain[..4]).valid, "a prefix is itself a valid chain");
    assert!(!verify_chain(&chain[1..]).valid);
    test_complete!("reordering_and_truncation_are_detected");
}

#[test]
fn verified_export_round_trips_through_jsonl() {
    common::init_test_logging();
    test_phase!("JSONL export");

    let (recorder, case) = fabricated_chain("case-export");
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("case-export.dtr.jsonl");

    let written = export_chain_jsonl(&recorder, &case, &path).expect("export");
    assert_eq!(written, 6);

    let raw = std::fs::read_to_string(&path).expect("read");
    assert!(raw.lines().next().is_some_and(|l| l.contains("\"_schema\"")));
    assert_eq!(raw.lines().count(), 7);

    let replayed = read_jsonl(&path).expect("replay");
    assert_eq!(replayed, recorder.chain(&case));
    assert!(verify_chain(&replayed).valid);

    test_complete!("verified_export_round_trips_through_jsonl", records = written);
}

#[test]
fn export_guard_refuses_tampered_chain() {
    common::init_test_logging();
    test_phase!("Export guard");

    let (recorder, case) = fabricated_chain("case-guard");
    let mut chain = recorder.chain(&case);
    chain[4].completed_at += 1;
    let frozen = Frozen(chain.clone());

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("refused.jsonl");
    let err = export_chain_jsonl(&frozen, &case, &path).expect_err("must refuse");
    assert_with_log!(err.is_integrity_failure(), "integrity failure", true, &err);
    assert!(!path.exists(), "nothing may be written for a refused chain");

    assert!(export_verified(&chain).expect_err("must refuse").is_integrity_failure());
    assert!(chain_graph(&frozen, &case).is_err());

    test_complete!("export_guard_refuses_tampered_chain");
}

#[test]
fn graph_links_lineage_and_predecessors() {
    common::init_test_logging();
    let (recorder, case) = fabricated_chain("case-graph");
    let graph = chain_graph(&recorder, &case).expect("graph");

    let follows = graph.edges.iter().filter(|e| e.kind == EdgeKind::Follows).count();
    let consumed = graph.edges.iter().filter(|e| e.kind == EdgeKind::Consumed).count();
    assert_eq!(follows, 5);
    assert_eq!(consumed, 12);

    let dot = graph.to_dot();
    assert!(dot.starts_with("digraph decision_chain {"));
    assert!(dot.contains("\"dtr:1\" -> \"dtr:0\""));
    test_complete!("graph_links_lineage_and_predecessors");
}
