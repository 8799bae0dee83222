//! Metric-context classification.
//!
//! A number in metric context (a percentage, a rate, a count of complaints)
//! must be backed by the corpus no matter how innocent it looks. The
//! classifier inspects every occurrence of the token in the text, grouped
//! or not; one strict occurrence is enough. A power-of-ten denominator after
//! `per` or `/` is part of the rate, not a metric value.

use std::sync::LazyLock;

use regex::Regex;

use super::token::{canonical_literal, extract_tokens};

/// Characters after an occurrence searched for a percent sign.
const PERCENT_WINDOW: usize = 15;
/// Characters after an occurrence searched for a per-thousand fraction.
const FRACTION_WINDOW: usize = 20;
/// Characters before an occurrence searched for `per`.
const PER_WINDOW: usize = 8;
/// Characters before an occurrence searched for metric vocabulary.
const LOOKBEHIND_WINDOW: usize = 25;
/// Characters after an occurrence searched for metric vocabulary.
const LOOKAHEAD_WINDOW: usize = 20;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("metric regex is valid")
}

static PERCENT: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)^\s*(?:%|percent)"));
static FRACTION: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)^\s*(?:/|per\s+)\s*(?:\d+\s*k\b|\d{1,3}(?:,\d{3})+\b|10+\b)")
});
static PER_BEFORE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)\bper\s+$"));
static DENOMINATOR_BEFORE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)(?:\bper\s+|/\s*)$"));
static VOCABULARY: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)\b(?:rates?|mean|average|median|standard\s+deviation|std\.?\s*dev\.?|sd|percentages?|complaints?|complaint\s+counts?|units\s+sold|unit\s+counts?|cases|case\s+counts?|incidents?|incident\s+counts?)\b",
    )
});

/// Whether any occurrence of `token` in `text` sits in metric context.
///
/// `token` may be written with or without grouping (`1,000`, `1000`);
/// occurrences are the extracted tokens of `text` with the same canonical
/// form, so `42` never matches inside `142`, `42.5` or `1,042`.
pub fn is_metric(text: &str, token: &str) -> bool {
    let wanted = canonical_literal(&token.replace(',', ""));
    extract_tokens(text)
        .iter()
        .filter(|t| t.canonical == wanted)
        .any(|t| occurrence_is_metric(text, t.span.start, t.span.end))
}

/// Whether the occurrence at `start..end` is a power-of-ten denominator
/// written after `per` or `/` (`per 1,000`, `/ 100000`).
fn is_rate_denominator(text: &str, start: usize, end: usize) -> bool {
    let digits = text[start..end].replace(',', "");
    let power_of_ten = digits.len() >= 2
        && digits.starts_with('1')
        && digits.bytes().skip(1).all(|b| b == b'0');
    power_of_ten && DENOMINATOR_BEFORE.is_match(tail(&text[..start], PER_WINDOW))
}

/// Metric classification of the single occurrence spanning `start..end`.
pub(crate) fn occurrence_is_metric(text: &str, start: usize, end: usize) -> bool {
    if is_rate_denominator(text, start, end) {
        return false;
    }
    let after = &text[end..];
    let before = &text[..start];

    if PERCENT.is_match(head(after, PERCENT_WINDOW)) {
        return true;
    }
    if FRACTION.is_match(head(after, FRACTION_WINDOW)) {
        return true;
    }
    if PER_BEFORE.is_match(tail(before, PER_WINDOW)) {
        return true;
    }

    let behind = after_last_boundary(tail(before, LOOKBEHIND_WINDOW));
    let ahead = before_first_boundary(head(after, LOOKAHEAD_WINDOW));
    let vocab_behind = VOCABULARY
        .find_iter(behind)
        .any(|m| !has_digit(&behind[m.end()..]));
    let vocab_ahead = VOCABULARY
        .find_iter(ahead)
        .any(|m| !has_digit(&ahead[..m.start()]));
    vocab_behind || vocab_ahead
}

/// First `n` chars of `s`.
fn head(s: &str, n: usize) -> &str {
    s.char_indices().nth(n).map_or(s, |(i, _)| &s[..i])
}

/// Last `n` chars of `s`.
fn tail(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    s.char_indices().nth(count - n).map_or(s, |(i, _)| &s[i..])
}

/// Sentence boundaries are `;` and a `.` that is not a decimal point.
fn boundary_positions(s: &str) -> impl Iterator<Item = usize> + '_ {
    let bytes = s.as_bytes();
    s.char_indices().filter_map(move |(i, c)| {
        let decimal = c == '.'
            && i > 0
            && bytes[i - 1].is_ascii_digit()
            && bytes.get(i + 1).is_some_and(u8::is_ascii_digit);
        ((c == ';' || c == '.') && !decimal).then_some(i)
    })
}

fn after_last_boundary(s: &str) -> &str {
    boundary_positions(s).last().map_or(s, |i| &s[i + 1..])
}

fn before_first_boundary(s: &str) -> &str {
    boundary_positions(s).next().map_or(s, |i| &s[..i])
}

fn has_digit(s: &str) -> bool {
    s.bytes().any(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_after_number() {
        assert!(is_metric("a rise of 12.5% year on year", "12.5"));
        assert!(is_metric("about 7 percent of units", "7"));
        assert!(is_metric("about 7  %", "7"));
    }

    #[test]
    fn per_thousand_fraction_after_number() {
        assert!(is_metric("a rate of 1.20 per 1,000 units", "1.20"));
        assert!(is_metric("0.4/1K devices", "0.4"));
        assert!(is_metric("3 / 100,000 implants", "3"));
        assert!(is_metric("2 per 1000", "2"));
    }

    #[test]
    fn per_before_number() {
        assert!(is_metric("one complaint per 250 units", "250"));
        assert!(is_metric("failures per 37 devices", "37"));
    }

    #[test]
    fn rate_denominators_are_not_metric() {
        assert!(!is_metric("0.85 per 1000 units", "1000"));
        assert!(!is_metric("0.85 per 1,000 units sold", "1000"));
        assert!(!is_metric("0.4 / 100,000 implants", "100,000"));
        assert!(is_metric("0.85 per 1,000 units and 1,000 complaints", "1000"));
    }

    #[test]
    fn grouped_occurrences_are_classified() {
        assert!(is_metric("Complaints rose by 1,000% this period.", "1000"));
        assert!(is_metric("We received 1,000 complaints.", "1,000"));
        assert!(is_metric("In total 2,017 complaints were logged.", "2017"));
        assert!(is_metric("100,000 units sold", "100000"));
    }

    #[test]
    fn vocabulary_in_window() {
        assert!(is_metric("the complaint rate was 4 overall", "4"));
        assert!(is_metric("we received 9 complaints", "9"));
        assert!(is_metric("mean of 3.3", "3.3"));
    }

    #[test]
    fn vocabulary_blocked_by_other_digit() {
        assert!(!is_metric("complaint rate 0.85 and Section 3.2", "3.2"));
    }

    #[test]
    fn vocabulary_blocked_by_sentence_boundary() {
        assert!(!is_metric("Complaints were reviewed. See 3 attachments", "3"));
        assert!(!is_metric("see item 4; complaints follow", "4"));
    }

    #[test]
    fn section_number_in_scenario_is_not_metric() {
        let text = "42 complaints, a rate of 0.85 per 1,000 units, in Section 3.2.";
        assert!(!is_metric(text, "3.2"));
        assert!(is_metric(text, "0.85"));
        assert!(is_metric(text, "42"));
    }

    #[test]
    fn occurrences_are_digit_bounded() {
        assert!(!is_metric("142% increase", "42"));
        assert!(!is_metric("42.5% increase", "42"));
        assert!(!is_metric("1,042% odd", "42"));
        assert!(is_metric("42.0% increase", "42"));
        assert!(is_metric("42% increase", "42"));
    }

    #[test]
    fn one_strict_occurrence_is_enough() {
        assert!(is_metric("Article 5 says 5% must be reported", "5"));
    }

    #[test]
    fn plain_citation_is_not_metric() {
        assert!(!is_metric("as required by Article 86 of the MDR", "86"));
        assert!(!is_metric("the 2023 reporting period", "2023"));
    }

    #[test]
    fn absent_token_is_not_metric() {
        assert!(!is_metric("12.5% of units", "99"));
    }
}
