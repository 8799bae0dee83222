//! Gated enhancement with bounded retries.
//!
//! The controller is an explicit state machine:
//!
//! ```text
//! Draft(1) -> Gate(1) -> Accepted
//!                     -> Draft(2) -> Gate(2) -> ... -> Gate(max) -> FallbackOriginal
//! ```
//!
//! A drafter failure counts as a failed attempt and moves straight to the
//! next `Draft`, or to `FallbackOriginal` when attempts are exhausted. Every
//! decision appends exactly one record to the case chain, so the chain
//! always ends with a terminal record and never with a dangling draft.

use std::sync::Arc;

use narrative_evidence::{
    DraftRecord, LineageRef, OutputContent, RejectionDisposition, SourceType, sha256_hex,
};
use narrative_kernel::TraceId;

use super::drafter::{Correction, DraftRequest, DraftResponse, Drafter, DrafterError, NarrativeUnit};
use super::prompt::{base_prompt, corrective_prompt};
use super::recorder::DecisionRecorder;
use crate::config::GatePolicy;
use crate::error::Result;
use crate::gate::{AllowedNumberCorpus, GateVerdict, NumberGate};
use crate::time::{TimeSource, WallClock};
use crate::tracing_compat::{debug, info, warn};
use crate::util::{EntropySource, OsEntropy};

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Terminal outcome of one enhancement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// A draft passed the gate and replaces the original.
    Accepted {
        /// Attempt that passed.
        attempts: u32,
    },
    /// Every attempt failed; the original narrative is kept.
    FallbackOriginal {
        /// Attempts made.
        attempts: u32,
    },
}

impl Disposition {
    /// Whether the drafted text was kept.
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Attempts consumed.
    pub const fn attempts(self) -> u32 {
        match self {
            Self::Accepted { attempts } | Self::FallbackOriginal { attempts } => attempts,
        }
    }
}

/// Controller state.
#[derive(Clone, Debug, PartialEq)]
pub enum EnhanceState {
    /// Call the drafter.
    Draft {
        /// 1-based attempt number.
        attempt: u32,
        /// Feedback from the last rejected draft, if any.
        correction: Option<Correction>,
    },
    /// Gate a drafted text.
    Gate {
        /// Attempt that produced the draft.
        attempt: u32,
        /// Whether the draft came from a corrective prompt.
        corrective: bool,
        /// The draft.
        response: DraftResponse,
    },
    /// Terminal.
    Done(Disposition),
}

impl EnhanceState {
    /// Initial state.
    pub const fn start() -> Self {
        Self::Draft {
            attempt: 1,
            correction: None,
        }
    }

    /// Whether the machine has stopped.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

/// What follows a failed attempt.
pub const fn disposition_after_failure(attempt: u32, max_attempts: u32) -> RejectionDisposition {
    if attempt < max_attempts {
        RejectionDisposition::Retry
    } else {
        RejectionDisposition::FallbackOriginal
    }
}

/// State after a failed attempt.
///
/// `correction` is what the next prompt should correct; a drafter failure
/// passes on the correction it was itself given.
pub fn after_failure(attempt: u32, max_attempts: u32, correction: Option<Correction>) -> EnhanceState {
    match disposition_after_failure(attempt, max_attempts) {
        RejectionDisposition::Retry => EnhanceState::Draft {
            attempt: attempt + 1,
            correction,
        },
        RejectionDisposition::FallbackOriginal => {
            EnhanceState::Done(Disposition::FallbackOriginal { attempts: attempt })
        }
    }
}

// ---------------------------------------------------------------------------
// Enhancer
// ---------------------------------------------------------------------------

/// Result of [`Enhancer::enhance`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnhanceOutcome {
    /// Accepted draft, or the original narrative on fallback.
    pub final_text: String,
    /// Records appended to the case chain by this call.
    pub chain_appended_count: usize,
    /// How the machine terminated.
    pub disposition: Disposition,
}

/// Drives a drafter through the gate for one narrative unit at a time.
#[derive(Clone)]
pub struct Enhancer {
    gate: NumberGate,
    clock: Arc<dyn TimeSource>,
    entropy: Arc<dyn EntropySource>,
}

impl std::fmt::Debug for Enhancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enhancer")
            .field("policy", self.gate.policy())
            .field("entropy", &self.entropy.source_id())
            .finish_non_exhaustive()
    }
}

impl Default for Enhancer {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`Enhancer`].
pub struct EnhancerBuilder {
    policy: GatePolicy,
    clock: Arc<dyn TimeSource>,
    entropy: Arc<dyn EntropySource>,
}

impl EnhancerBuilder {
    /// Gate policy; also sets the attempt limit.
    #[must_use]
    pub fn policy(mut self, policy: GatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Clock for record timestamps and trace ids.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Randomness for trace ids.
    #[must_use]
    pub fn entropy(mut self, entropy: Arc<dyn EntropySource>) -> Self {
        self.entropy = entropy;
        self
    }

    /// Finish.
    pub fn build(self) -> Enhancer {
        Enhancer {
            gate: NumberGate::new(self.policy),
            clock: self.clock,
            entropy: self.entropy,
        }
    }
}

/// Per-call context shared by every step.
struct Run<'a, R: ?Sized> {
    unit: &'a NarrativeUnit,
    corpus: &'a AllowedNumberCorpus,
    corpus_lineage: LineageRef,
    source_lineage: LineageRef,
    recorder: &'a R,
    appended: usize,
}

impl Enhancer {
    /// Start building an enhancer with the wall clock, OS entropy and the
    /// default policy.
    pub fn builder() -> EnhancerBuilder {
        EnhancerBuilder {
            policy: GatePolicy::default(),
            clock: Arc::new(WallClock::new()),
            entropy: Arc::new(OsEntropy),
        }
    }

    /// Policy in force.
    pub fn policy(&self) -> &GatePolicy {
        self.gate.policy()
    }

    /// Enhance `unit`, recording every decision in its case chain.
    ///
    /// Drafter calls are strictly sequential. The returned text is either a
    /// draft that passed the gate or `unit.source_text` unchanged.
    pub async fn enhance<D, R>(
        &self,
        unit: &NarrativeUnit,
        drafter: &D,
        corpus: &AllowedNumberCorpus,
        recorder: &R,
    ) -> Result<EnhanceOutcome>
    where
        D: Drafter + ?Sized,
        R: DecisionRecorder + ?Sized,
    {
        let mut run = Run {
            unit,
            corpus,
            corpus_lineage: LineageRef {
                source_id: format!("corpus/{}", unit.case_id),
                source_hash: corpus.fingerprint(),
                source_type: SourceType::NumberCorpus,
            },
            source_lineage: LineageRef::hashed(
                format!("unit/{}", unit.unit_id),
                SourceType::SourceNarrative,
                unit.source_text.as_bytes(),
            ),
            recorder,
            appended: 0,
        };

        let mut state = EnhanceState::start();
        let mut accepted_text = None;
        let disposition = loop {
            state = match state {
                EnhanceState::Draft { attempt, correction } => {
                    self.draft_step(&mut run, drafter, attempt, correction).await?
                }
                EnhanceState::Gate {
                    attempt,
                    corrective,
                    response,
                } => {
                    let next = self.gate_step(&mut run, attempt, corrective, &response.text)?;
                    if matches!(next, EnhanceState::Done(Disposition::Accepted { .. })) {
                        accepted_text = Some(response.text);
                    }
                    next
                }
                EnhanceState::Done(disposition) => break disposition,
            };
        };

        let final_text = match (disposition, accepted_text) {
            (Disposition::Accepted { attempts }, Some(text)) => {
                info!(
                    case = %unit.case_id,
                    unit = %unit.unit_id,
                    attempts,
                    "enhanced narrative accepted"
                );
                text
            }
            _ => {
                warn!(
                    case = %unit.case_id,
                    unit = %unit.unit_id,
                    attempts = disposition.attempts(),
                    "attempts exhausted, keeping original narrative"
                );
                unit.source_text.clone()
            }
        };

        Ok(EnhanceOutcome {
            final_text,
            chain_appended_count: run.appended,
            disposition,
        })
    }

    /// [`enhance`](Self::enhance) on the current thread, for callers without
    /// an executor.
    pub fn enhance_blocking<D, R>(
        &self,
        unit: &NarrativeUnit,
        drafter: &D,
        corpus: &AllowedNumberCorpus,
        recorder: &R,
    ) -> Result<EnhanceOutcome>
    where
        D: Drafter + ?Sized,
        R: DecisionRecorder + ?Sized,
    {
        futures_lite::future::block_on(self.enhance(unit, drafter, corpus, recorder))
    }

    async fn draft_step<D, R>(
        &self,
        run: &mut Run<'_, R>,
        drafter: &D,
        attempt: u32,
        correction: Option<Correction>,
    ) -> Result<EnhanceState>
    where
        D: Drafter + ?Sized,
        R: DecisionRecorder + ?Sized,
    {
        let unit = run.unit;
        let prompt = correction.as_ref().map_or_else(
            || base_prompt(unit),
            |c| corrective_prompt(unit, c),
        );
        let corrective = correction.is_some();
        let prompt_lineage = LineageRef::hashed(
            format!("prompt/{}/{attempt}", unit.unit_id),
            SourceType::Prompt,
            prompt.as_bytes(),
        );
        let request = DraftRequest {
            unit_id: unit.unit_id.clone(),
            title: unit.title.clone(),
            source_text: unit.source_text.clone(),
            guidance: unit.guidance.clone(),
            correction: correction.clone(),
            attempt,
            prompt,
        };
        let prompt_detail = if corrective {
            format!(
                "corrective prompt naming {} rejected number(s)",
                request.correction.as_ref().map_or(0, |c| c.violating_numbers.len())
            )
        } else {
            format!("base prompt for section \"{}\"", unit.title)
        };

        let initiated_at = self.clock.now_ms();
        let result = drafter.draft(&request).await.and_then(|response| {
            if response.text.trim().is_empty() {
                Err(DrafterError::EmptyResponse)
            } else {
                Ok(response)
            }
        });
        let completed_at = self.clock.now_ms().max(initiated_at);

        let builder = DraftRecord::builder(self.trace_id())
            .timestamps(initiated_at, completed_at)
            .lineage(run.source_lineage.clone())
            .lineage(prompt_lineage)
            .step("prompt", prompt_detail);

        match result {
            Ok(response) => {
                debug!(
                    case = %unit.case_id,
                    attempt,
                    corrective,
                    correlation_id = %response.metadata.correlation_id,
                    "draft received"
                );
                let draft = builder
                    .step(
                        "draft",
                        format!(
                            "received {} chars from {} {}",
                            response.text.chars().count(),
                            response.metadata.provider,
                            response.metadata.model
                        ),
                    )
                    .output(OutputContent::NarrativeDrafted {
                        attempt,
                        corrective,
                        draft_hash: sha256_hex(response.text.as_bytes()),
                        call: response.metadata.clone(),
                    })
                    .validation(true, ["drafter returned text"])
                    .build()?;
                run.append(draft);
                Ok(EnhanceState::Gate {
                    attempt,
                    corrective,
                    response,
                })
            }
            Err(err) => {
                let disposition = disposition_after_failure(attempt, self.policy().max_attempts);
                warn!(
                    case = %unit.case_id,
                    attempt,
                    error = %err,
                    ?disposition,
                    "drafter failed"
                );
                let draft = builder
                    .step("draft", err.to_string())
                    .step("dispose", dispose_detail(disposition))
                    .output(OutputContent::DrafterFailed {
                        attempt,
                        corrective,
                        error: err.to_string(),
                        disposition,
                    })
                    .validation(false, [err.to_string()])
                    .build()?;
                run.append(draft);
                Ok(after_failure(attempt, self.policy().max_attempts, correction))
            }
        }
    }

    fn gate_step<R>(
        &self,
        run: &mut Run<'_, R>,
        attempt: u32,
        corrective: bool,
        text: &str,
    ) -> Result<EnhanceState>
    where
        R: DecisionRecorder + ?Sized,
    {
        let unit = run.unit;
        let initiated_at = self.clock.now_ms();
        let verdict = self.gate.check(text, run.corpus);
        let completed_at = self.clock.now_ms().max(initiated_at);

        let builder = DraftRecord::builder(self.trace_id())
            .timestamps(initiated_at, completed_at)
            .lineage(LineageRef::hashed(
                format!("draft/{}/{attempt}", unit.unit_id),
                SourceType::DraftOutput,
                text.as_bytes(),
            ))
            .lineage(run.corpus_lineage.clone())
            .step(
                "extract",
                format!(
                    "{} numeric token(s) against {} corpus number(s)",
                    verdict.numbers_checked,
                    run.corpus.len()
                ),
            )
            .step("gate", verdict.summary());

        if verdict.passed {
            let draft = builder
                .step("dispose", "accept draft")
                .output(OutputContent::GateAccepted {
                    attempt,
                    accepted_hash: sha256_hex(text.as_bytes()),
                    numbers_checked: verdict.numbers_checked,
                })
                .validation(true, Vec::<String>::new())
                .build()?;
            run.append(draft);
            return Ok(EnhanceState::Done(Disposition::Accepted { attempts: attempt }));
        }

        let disposition = disposition_after_failure(attempt, self.policy().max_attempts);
        warn!(
            case = %unit.case_id,
            attempt,
            corrective,
            violations = ?verdict.violating_numbers,
            ?disposition,
            "gate rejected draft"
        );
        let draft = builder
            .step("dispose", dispose_detail(disposition))
            .output(OutputContent::GateRejected {
                attempt,
                violating_numbers: verdict.violating_numbers.clone(),
                disposition,
            })
            .validation(false, rejection_messages(&verdict))
            .build()?;
        run.append(draft);

        let correction = Correction {
            previous_output: text.to_owned(),
            violating_numbers: verdict.violating_numbers,
        };
        Ok(after_failure(attempt, self.policy().max_attempts, Some(correction)))
    }

    fn trace_id(&self) -> TraceId {
        TraceId::from_parts(self.clock.now_ms(), self.entropy.next_u128())
    }
}

impl<R: DecisionRecorder + ?Sized> Run<'_, R> {
    fn append(&mut self, draft: DraftRecord) {
        self.recorder.append(&self.unit.case_id, draft);
        self.appended += 1;
    }
}

const fn dispose_detail(disposition: RejectionDisposition) -> &'static str {
    match disposition {
        RejectionDisposition::Retry => "redraft with corrective prompt",
        RejectionDisposition::FallbackOriginal => "attempts exhausted, fall back to original narrative",
    }
}

fn rejection_messages(verdict: &GateVerdict) -> Vec<String> {
    let mut messages: Vec<String> = verdict
        .violating_numbers
        .iter()
        .map(|n| format!("unsupported number {n}"))
        .collect();
    messages.extend(verdict.rejection_reason.clone());
    messages
}

/// Enhance `unit` with the wall clock, OS entropy and the default policy.
pub async fn enhance_with_gate<D, R>(
    unit: &NarrativeUnit,
    drafter: &D,
    corpus: &AllowedNumberCorpus,
    recorder: &R,
) -> Result<EnhanceOutcome>
where
    D: Drafter + ?Sized,
    R: DecisionRecorder + ?Sized,
{
    Enhancer::default().enhance(unit, drafter, corpus, recorder).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enhance::InMemoryRecorder;
    use crate::time::VirtualClock;
    use crate::util::DetEntropy;
    use futures_lite::future::block_on;
    use narrative_evidence::{CallMetadata, TraceType};
    use narrative_kernel::{CaseId, UnitId};
    use parking_lot::Mutex;

    struct Scripted {
        replies: Mutex<Vec<std::result::Result<&'static str, DrafterError>>>,
        seen: Mutex<Vec<DraftRequest>>,
    }

    impl Scripted {
        fn new(mut replies: Vec<std::result::Result<&'static str, DrafterError>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Drafter for Scripted {
        async fn draft(&self, request: &DraftRequest) -> std::result::Result<DraftResponse, DrafterError> {
            self.seen.lock().push(request.clone());
            let reply = self.replies.lock().pop().unwrap_or(Err(DrafterError::EmptyResponse));
            reply.map(|text| DraftResponse {
                text: text.to_owned(),
                metadata: CallMetadata {
                    correlation_id: format!("call-{}", request.attempt),
                    provider: "scripted".into(),
                    model: "fixture".into(),
                    ..CallMetadata::default()
                },
            })
        }
    }

    fn unit() -> NarrativeUnit {
        NarrativeUnit {
            case_id: CaseId::new("case-1").unwrap(),
            unit_id: UnitId::new("section_c").unwrap(),
            title: "Complaints".into(),
            source_text: "There were 42 complaints.".into(),
            guidance: None,
        }
    }

    fn enhancer() -> Enhancer {
        Enhancer::builder()
            .clock(Arc::new(VirtualClock::starting_at(1_700_000_000_000)))
            .entropy(Arc::new(DetEntropy::new(7)))
            .build()
    }

    fn corpus() -> AllowedNumberCorpus {
        AllowedNumberCorpus::from_numbers(["42"])
    }

    #[test]
    fn transition_table() {
        assert_eq!(disposition_after_failure(1, 3), RejectionDisposition::Retry);
        assert_eq!(disposition_after_failure(3, 3), RejectionDisposition::FallbackOriginal);
        assert_eq!(
            after_failure(2, 3, None),
            EnhanceState::Draft {
                attempt: 3,
                correction: None
            }
        );
        assert_eq!(
            after_failure(3, 3, None),
            EnhanceState::Done(Disposition::FallbackOriginal { attempts: 3 })
        );
        assert!(!EnhanceState::start().is_terminal());
    }

    #[test]
    fn first_clean_draft_is_accepted() {
        let drafter = Scripted::new(vec![Ok("The period saw 42 complaints.")]);
        let recorder = InMemoryRecorder::new();
        let outcome = block_on(enhancer().enhance(&unit(), &drafter, &corpus(), &recorder)).unwrap();
        assert_eq!(outcome.final_text, "The period saw 42 complaints.");
        assert_eq!(outcome.disposition, Disposition::Accepted { attempts: 1 });
        assert_eq!(outcome.chain_appended_count, 2);
        let chain = recorder.chain(&unit().case_id);
        let kinds: Vec<TraceType> = chain.iter().map(|r| r.trace_type).collect();
        assert_eq!(kinds, vec![TraceType::NarrativeDrafted, TraceType::GateAccepted]);
        assert_eq!(chain[1].input_lineage[1].source_type, SourceType::NumberCorpus);
        assert_eq!(chain[1].input_lineage[1].source_hash, corpus().fingerprint());
    }

    #[test]
    fn corrective_prompt_carries_violations() {
        let drafter = Scripted::new(vec![
            Ok("There were 57 complaints."),
            Ok("There were 42 complaints in total."),
        ]);
        let recorder = InMemoryRecorder::new();
        let outcome = block_on(enhancer().enhance(&unit(), &drafter, &corpus(), &recorder)).unwrap();
        assert_eq!(outcome.disposition, Disposition::Accepted { attempts: 2 });
        assert_eq!(outcome.chain_appended_count, 4);

        let seen = drafter.seen.lock();
        assert!(!seen[0].is_corrective());
        let correction = seen[1].correction.as_ref().unwrap();
        assert_eq!(correction.violating_numbers, vec!["57"]);
        assert_eq!(correction.previous_output, "There were 57 complaints.");
        assert!(seen[1].prompt.contains("source data: 57."));
    }

    #[test]
    fn failures_fall_back_to_original() {
        let drafter = Scripted::new(vec![
            Err(DrafterError::Timeout { after_ms: 30_000 }),
            Ok("   "),
            Ok("There were 99 complaints."),
        ]);
        let recorder = InMemoryRecorder::new();
        let outcome = block_on(enhancer().enhance(&unit(), &drafter, &corpus(), &recorder)).unwrap();
        assert_eq!(outcome.final_text, unit().source_text);
        assert_eq!(outcome.disposition, Disposition::FallbackOriginal { attempts: 3 });

        let chain = recorder.chain(&unit().case_id);
        let kinds: Vec<TraceType> = chain.iter().map(|r| r.trace_type).collect();
        assert_eq!(
            kinds,
            vec![
                TraceType::DrafterFailed,
                TraceType::DrafterFailed,
                TraceType::NarrativeDrafted,
                TraceType::GateRejected,
            ]
        );
        assert_eq!(outcome.chain_appended_count, chain.len());
        assert!(matches!(
            chain[3].output_content,
            OutputContent::GateRejected {
                disposition: RejectionDisposition::FallbackOriginal,
                ..
            }
        ));
        assert!(recorder.verify(&unit().case_id).valid);
    }

    #[test]
    fn attempt_limit_follows_policy() {
        let drafter = Scripted::new(vec![Ok("There were 57 complaints.")]);
        let recorder = InMemoryRecorder::new();
        let single = Enhancer::builder()
            .policy(GatePolicy::default().with_max_attempts(1))
            .entropy(Arc::new(DetEntropy::new(1)))
            .build();
        let outcome = single.enhance_blocking(&unit(), &drafter, &corpus(), &recorder).unwrap();
        assert_eq!(outcome.disposition, Disposition::FallbackOriginal { attempts: 1 });
        assert_eq!(drafter.seen.lock().len(), 1);
    }
}
