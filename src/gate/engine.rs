//! Gate decision engine.
//!
//! Every numeric token of a text walks a fixed ladder of tiers; the first tier
//! that applies decides the token. Metric-context tokens stop at the
//! tolerance tier: no registry entry, exemption or leniency rule can accept a
//! rate or percentage the corpus does not support.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::corpus::AllowedNumberCorpus;
use super::exemption::ContextExemptionSet;
use super::metric::occurrence_is_metric;
use super::registry::is_registered;
use super::token::{NumericToken, extract_tokens};
use crate::config::GatePolicy;
use crate::tracing_compat::{debug, trace};

/// Fixed prefix of every rejection reason.
pub const REJECTION_PREFIX: &str = "Unsupported numeric claims not traceable to source data";

/// Tier that decided one token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Literal text is in the corpus.
    CorpusLiteral,
    /// Canonical value is in the corpus.
    CorpusValue,
    /// Metric context, within tolerance of a corpus value.
    MetricTolerance,
    /// Metric context, no corpus value close enough.
    MetricViolation,
    /// Registered citation number.
    Registry,
    /// Exempted by citation context in this text.
    ContextExemption,
    /// Calendar year.
    Year,
    /// Small integer.
    SmallInteger,
    /// Bare section-style decimal.
    SectionDecimal,
    /// Nothing supports it.
    Unsupported,
}

impl Tier {
    /// Whether the token is accepted.
    pub const fn passes(self) -> bool {
        !matches!(self, Self::MetricViolation | Self::Unsupported)
    }

    /// Stable snake_case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CorpusLiteral => "corpus_literal",
            Self::CorpusValue => "corpus_value",
            Self::MetricTolerance => "metric_tolerance",
            Self::MetricViolation => "metric_violation",
            Self::Registry => "registry",
            Self::ContextExemption => "context_exemption",
            Self::Year => "year",
            Self::SmallInteger => "small_integer",
            Self::SectionDecimal => "section_decimal",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How one token was decided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenEvaluation {
    /// The token.
    pub token: NumericToken,
    /// Deciding tier.
    pub tier: Tier,
}

/// Outcome of gating one text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateVerdict {
    /// `true` iff `violating_numbers` is empty.
    pub passed: bool,
    /// Violations deduplicated by canonical value, in order of first
    /// appearance, as written minus grouping commas.
    pub violating_numbers: Vec<String>,
    /// Fixed prefix plus the violation list; `None` when passed.
    pub rejection_reason: Option<String>,
    /// Tokens evaluated, duplicates included.
    pub numbers_checked: usize,
}

impl GateVerdict {
    fn from_violations(violating_numbers: Vec<String>, numbers_checked: usize) -> Self {
        let passed = violating_numbers.is_empty();
        let rejection_reason =
            (!passed).then(|| format!("{REJECTION_PREFIX}: {}", violating_numbers.join(", ")));
        Self {
            passed,
            violating_numbers,
            rejection_reason,
            numbers_checked,
        }
    }

    /// Short form for log lines and reasoning steps.
    pub fn summary(&self) -> String {
        if self.passed {
            format!("passed ({} numbers checked)", self.numbers_checked)
        } else {
            format!(
                "rejected {} of {} numbers: {}",
                self.violating_numbers.len(),
                self.numbers_checked,
                self.violating_numbers.join(", ")
            )
        }
    }
}

/// The numeric integrity gate.
///
/// Pure and `Send + Sync`; one instance can serve any number of cases.
#[derive(Clone, Debug, Default)]
pub struct NumberGate {
    policy: GatePolicy,
}

impl NumberGate {
    /// Gate applying `policy`.
    pub fn new(policy: GatePolicy) -> Self {
        Self { policy }
    }

    /// Policy in force.
    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    /// Decide every token of `text`, in textual order.
    pub fn evaluate(&self, text: &str, corpus: &AllowedNumberCorpus) -> Vec<TokenEvaluation> {
        let exemptions = ContextExemptionSet::analyze(text);
        let tokens = extract_tokens(text);

        // One strict occurrence makes every occurrence of that value metric.
        let mut metric_values: BTreeMap<String, bool> = BTreeMap::new();
        for token in &tokens {
            let strict = occurrence_is_metric(text, token.span.start, token.span.end);
            *metric_values.entry(token.canonical.clone()).or_default() |= strict;
        }

        tokens
            .into_iter()
            .map(|token| {
                let metric = metric_values.get(&token.canonical).copied().unwrap_or(false);
                let tier = self.decide(&token, metric, corpus, &exemptions);
                trace!(token = %token.raw, tier = %tier, metric, "token decided");
                TokenEvaluation { token, tier }
            })
            .collect()
    }

    fn decide(
        &self,
        token: &NumericToken,
        metric: bool,
        corpus: &AllowedNumberCorpus,
        exemptions: &ContextExemptionSet,
    ) -> Tier {
        if corpus.contains_canonical(&token.literal) {
            return Tier::CorpusLiteral;
        }
        if corpus.contains_canonical(&token.canonical) || corpus.contains_value(token.value()) {
            return Tier::CorpusValue;
        }
        if metric {
            return if corpus
                .within_tolerance(token.value(), self.policy.tolerance)
                .is_some()
            {
                Tier::MetricTolerance
            } else {
                Tier::MetricViolation
            };
        }
        if is_registered(&token.canonical) {
            return Tier::Registry;
        }
        if exemptions.contains(&token.literal) {
            return Tier::ContextExemption;
        }
        if self.is_year(&token.raw) {
            return Tier::Year;
        }
        if self.is_small_integer(&token.literal) {
            return Tier::SmallInteger;
        }
        if self.is_section_decimal(token) {
            return Tier::SectionDecimal;
        }
        Tier::Unsupported
    }

    fn is_year(&self, raw: &str) -> bool {
        raw.len() == 4
            && raw.bytes().all(|b| b.is_ascii_digit())
            && raw
                .parse::<u32>()
                .is_ok_and(|y| self.policy.year_range.contains(y))
    }

    fn is_small_integer(&self, literal: &str) -> bool {
        literal
            .parse::<u32>()
            .is_ok_and(|n| n <= self.policy.small_integer_max && n.to_string() == literal)
    }

    fn is_section_decimal(&self, token: &NumericToken) -> bool {
        let Some((whole, frac)) = token.literal.split_once('.') else {
            return false;
        };
        let short_digits = |s: &str| (1..=2).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit());
        token.raw == token.literal
            && short_digits(whole)
            && short_digits(frac)
            && token.value() <= self.policy.section_decimal_max
    }

    /// Gate `text` against `corpus`.
    pub fn check(&self, text: &str, corpus: &AllowedNumberCorpus) -> GateVerdict {
        let evaluations = self.evaluate(text, corpus);
        let numbers_checked = evaluations.len();
        let mut seen = BTreeSet::new();
        let violating: Vec<String> = evaluations
            .into_iter()
            .filter(|e| !e.tier.passes())
            .filter(|e| seen.insert(e.token.canonical.clone()))
            .map(|e| e.token.literal)
            .collect();

        let verdict = GateVerdict::from_violations(violating, numbers_checked);
        debug!(
            passed = verdict.passed,
            numbers_checked,
            violations = ?verdict.violating_numbers,
            "gate verdict"
        );
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> NumberGate {
        NumberGate::default()
    }

    fn tiers(text: &str, corpus: &AllowedNumberCorpus) -> Vec<(String, Tier)> {
        gate()
            .evaluate(text, corpus)
            .into_iter()
            .map(|e| (e.token.raw, e.tier))
            .collect()
    }

    #[test]
    fn each_tier_is_reachable() {
        let corpus = AllowedNumberCorpus::from_numbers(["42", "86", "0.85"]);
        let text = "We saw 42 events and 86.0 units. The rate was 0.9% overall. \
                    See ISO 14971, Article 92, the 2024 report, 7 sites, clause 4.1 and 377 items.";
        let decided = tiers(text, &corpus);
        let expect = [
            ("42", Tier::CorpusLiteral),
            ("86.0", Tier::CorpusValue),
            ("0.9", Tier::MetricTolerance),
            ("14971", Tier::Registry),
            ("92", Tier::Registry),
            ("2024", Tier::Year),
            ("7", Tier::SmallInteger),
            ("4.1", Tier::SectionDecimal),
            ("377", Tier::Unsupported),
        ];
        assert_eq!(decided.len(), expect.len(), "{decided:?}");
        for ((raw, tier), (want_raw, want_tier)) in decided.iter().zip(expect) {
            assert_eq!(raw, want_raw);
            assert_eq!(*tier, want_tier, "{raw}");
        }
    }

    #[test]
    fn context_exemption_tier() {
        let corpus = AllowedNumberCorpus::default();
        let decided = tiers("following MDCG 2022-21 and Annex XIV", &corpus);
        assert_eq!(decided[0], ("2022".to_string(), Tier::ContextExemption));
        assert_eq!(decided[1], ("21".to_string(), Tier::ContextExemption));
        let decided = tiers("following MDCG 2019-316", &corpus);
        assert_eq!(decided[1], ("316".to_string(), Tier::ContextExemption));
    }

    #[test]
    fn metric_numbers_skip_leniency() {
        let corpus = AllowedNumberCorpus::default();
        let verdict = gate().check("Complaints rose 12.5% and 3% in 2023.", &corpus);
        assert!(!verdict.passed);
        assert_eq!(verdict.violating_numbers, vec!["12.5", "3"]);
    }

    #[test]
    fn violations_deduplicate_by_value() {
        let corpus = AllowedNumberCorpus::default();
        let verdict = gate().check("Found 377 then 377.0 then 512 then 377.", &corpus);
        assert_eq!(verdict.violating_numbers, vec!["377", "512"]);
        assert_eq!(verdict.numbers_checked, 4);
        let reason = verdict.rejection_reason.unwrap();
        assert!(reason.starts_with(REJECTION_PREFIX));
        assert!(reason.ends_with("377, 512"));
    }

    #[test]
    fn tolerance_comes_from_policy() {
        let corpus = AllowedNumberCorpus::from_numbers(["10"]);
        let strict = NumberGate::new(GatePolicy::default().with_tolerance(0.01));
        assert!(!strict.check("a rate of 11%", &corpus).passed);
        assert!(gate().check("a rate of 11%", &corpus).passed);
    }

    #[test]
    fn grouped_numbers_in_metric_context_need_backing() {
        let empty = AllowedNumberCorpus::default();
        for (text, number) in [
            ("Complaints rose by 1,000% this period.", "1000"),
            ("We received 1,000 complaints.", "1000"),
            ("In total 2,017 complaints were logged.", "2017"),
            ("100,000 units sold", "100000"),
        ] {
            let decided = tiers(text, &empty);
            assert_eq!(decided[0].1, Tier::MetricViolation, "{text}");
            assert_eq!(gate().check(text, &empty).violating_numbers, vec![number]);
        }
    }

    #[test]
    fn rate_denominator_still_reaches_registry() {
        let corpus = AllowedNumberCorpus::from_numbers(["0.85"]);
        let decided = tiers("a rate of 0.85 per 1,000 units sold", &corpus);
        assert_eq!(decided[1], ("1,000".to_string(), Tier::Registry));
    }

    #[test]
    fn grouped_year_is_not_lenient() {
        let corpus = AllowedNumberCorpus::default();
        let verdict = gate().check("shipped 2,024 kits", &corpus);
        assert_eq!(verdict.violating_numbers, vec!["2024"]);
    }

    #[test]
    fn empty_text_passes() {
        let verdict = gate().check("", &AllowedNumberCorpus::default());
        assert!(verdict.passed);
        assert_eq!(verdict.rejection_reason, None);
        assert_eq!(verdict.summary(), "passed (0 numbers checked)");
    }

    #[test]
    fn summary_lists_violations() {
        let verdict = gate().check("about 1.20% more", &AllowedNumberCorpus::default());
        assert_eq!(verdict.summary(), "rejected 1 of 1 numbers: 1.20");
    }
}
