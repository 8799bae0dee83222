//! Shared harness for integration tests.

#![allow(dead_code, unused_macros)]

use std::sync::{Arc, Once};

use narrative_gate::time::VirtualClock;
use narrative_gate::util::DetEntropy;
use narrative_evidence::CallMetadata;
use narrative_gate::{
    CaseId, DraftRequest, DraftResponse, Drafter, DrafterError, Enhancer, GatePolicy, NarrativeUnit,
    UnitId,
};
use parking_lot::Mutex;

static INIT: Once = Once::new();

/// Install a `tracing` subscriber once per test binary.
///
/// Honors `RUST_LOG`; defaults to `narrative_gate=debug`.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("narrative_gate=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "==== test phase ====");
    };
}

macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "---- section ----");
    };
}

macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test complete");
    };
    ($name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        tracing::info!(test = %$name, $($key = ?$value),+, "test complete");
    };
}

macro_rules! assert_with_log {
    ($cond:expr, $label:expr, $expected:expr, $actual:expr) => {{
        let passed = $cond;
        tracing::debug!(
            check = $label,
            expected = ?$expected,
            actual = ?$actual,
            passed,
            "assertion"
        );
        assert!(
            passed,
            "{}: expected {:?}, got {:?}",
            $label,
            $expected,
            $actual
        );
    }};
}

/// Deterministic enhancer: virtual clock and seeded entropy.
pub fn det_enhancer(policy: GatePolicy, seed: u64) -> (Enhancer, Arc<VirtualClock>) {
    let clock = Arc::new(VirtualClock::starting_at(1_700_000_000_000));
    let enhancer = Enhancer::builder()
        .policy(policy)
        .clock(clock.clone())
        .entropy(Arc::new(DetEntropy::new(seed)))
        .build();
    (enhancer, clock)
}

/// A complaints section with a source narrative that gates clean.
pub fn complaints_unit(case: &str) -> NarrativeUnit {
    NarrativeUnit {
        case_id: CaseId::new(case).expect("case id"),
        unit_id: UnitId::new("section_d_complaints").expect("unit id"),
        title: "Complaints".into(),
        source_text: "During the period 42 complaints were received, a rate of 0.85 per 1,000 units sold."
            .into(),
        guidance: Some("Summarise for a notified body reviewer.".into()),
    }
}

// ---------------------------------------------------------------------------
// Drafters
// ---------------------------------------------------------------------------

fn metadata(request: &DraftRequest) -> CallMetadata {
    CallMetadata {
        correlation_id: format!("{}-{}", request.unit_id, request.attempt),
        input_tokens: request.prompt.len() as u64 / 4,
        output_tokens: 64,
        latency_ms: 250,
        cost_micros: 1_200,
        provider: "fixture".into(),
        model: "fixture-drafter".into(),
    }
}

/// Always restates the source with a rate nobody computed.
#[derive(Default)]
pub struct AlwaysFabricates {
    pub requests: Mutex<Vec<DraftRequest>>,
}

impl Drafter for AlwaysFabricates {
    async fn draft(&self, request: &DraftRequest) -> Result<DraftResponse, DrafterError> {
        self.requests.lock().push(request.clone());
        Ok(DraftResponse {
            text: format!(
                "We received 42 complaints, a rate of {}.37 per 1,000 units.",
                request.attempt + 1
            ),
            metadata: metadata(request),
        })
    }
}

/// Replays a fixed script of replies, then reports empty responses.
pub struct Scripted {
    replies: Mutex<Vec<Result<String, DrafterError>>>,
    pub requests: Mutex<Vec<DraftRequest>>,
}

impl Scripted {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<&'static str, DrafterError>>,
    {
        let mut replies: Vec<_> = replies.into_iter().map(|r| r.map(str::to_owned)).collect();
        replies.reverse();
        Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl Drafter for Scripted {
    async fn draft(&self, request: &DraftRequest) -> Result<DraftResponse, DrafterError> {
        self.requests.lock().push(request.clone());
        let reply = self.replies.lock().pop().unwrap_or(Err(DrafterError::EmptyResponse));
        reply.map(|text| DraftResponse {
            text,
            metadata: metadata(request),
        })
    }
}
