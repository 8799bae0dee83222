//! Numeric token extraction.
//!
//! A token is a word-bounded run of digits with optional comma grouping in
//! threes and at most one decimal point: `42`, `1,000`, `0.85`, `12,345.6`.
//! Signs and units are not part of a token.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use super::corpus::ArtifactValue;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{1,3}(?:,\d{3})+(?:\.\d+)?\b|\b\d+(?:\.\d+)?\b")
        .expect("token regex is valid")
});

/// Decimal places kept when rendering non-integer values.
const DECIMAL_PLACES: usize = 10;

/// One numeric literal found in a text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NumericToken {
    /// Surface text exactly as written (`1,000`).
    pub raw: String,
    /// Surface text with grouping commas removed (`1000`, `1.20`).
    pub literal: String,
    /// Canonical form used for equality (`1000`, `1.2`).
    pub canonical: String,
    /// Byte span of `raw` in the scanned text.
    pub span: Range<usize>,
}

impl NumericToken {
    /// Parsed value of the token.
    pub fn value(&self) -> f64 {
        self.literal.parse().unwrap_or(f64::NAN)
    }

    /// Whether the literal has no decimal point.
    pub fn is_integer(&self) -> bool {
        !self.literal.contains('.')
    }
}

/// Extract every numeric token of `text` in textual order, duplicates kept.
pub fn extract_tokens(text: &str) -> Vec<NumericToken> {
    TOKEN
        .find_iter(text)
        .map(|m| {
            let raw = m.as_str();
            let literal = raw.replace(',', "");
            let canonical = canonical_literal(&literal);
            NumericToken {
                raw: raw.to_string(),
                literal,
                canonical,
                span: m.range(),
            }
        })
        .collect()
}

/// Canonical forms of every number in `text`, in textual order.
pub fn extract_numbers(text: &str) -> Vec<String> {
    extract_tokens(text).into_iter().map(|t| t.canonical).collect()
}

/// Canonical form of a comma-free literal.
///
/// Integers lose leading zeros (`007` becomes `7`); decimals are rendered by
/// [`canonical_f64`] so `86.0` and `86` compare equal.
pub fn canonical_literal(literal: &str) -> String {
    if literal.contains('.') {
        literal
            .parse::<f64>()
            .ok()
            .and_then(canonical_f64)
            .unwrap_or_else(|| literal.to_string())
    } else {
        let trimmed = literal.trim_start_matches('0');
        if trimmed.is_empty() {
            "0".to_string()
        } else {
            trimmed.to_string()
        }
    }
}

/// Canonical rendering of a numeric value.
///
/// Integers print without a fractional part; other values are rounded to ten
/// decimal places with trailing zeros dropped. The sign is dropped because
/// tokens in text never carry one. Non-finite values have no rendering.
pub fn canonical_f64(value: f64) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    let magnitude = value.abs();
    let fixed = format!("{magnitude:.prec$}", prec = DECIMAL_PLACES);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    Some(if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    })
}

/// Canonical forms of every number reachable from `value`, depth first.
///
/// Numeric primitives render through [`canonical_f64`]; strings and record
/// keys are scanned with the text extractor.
pub fn numbers_in_value(value: &ArtifactValue) -> Vec<String> {
    let mut out = Vec::new();
    walk(value, &mut out);
    out
}

fn walk(value: &ArtifactValue, out: &mut Vec<String>) {
    match value {
        ArtifactValue::Null | ArtifactValue::Bool(_) => {}
        ArtifactValue::Integer(i) => out.push(i.unsigned_abs().to_string()),
        ArtifactValue::Float(f) => out.extend(canonical_f64(*f)),
        ArtifactValue::Text(s) => out.extend(extract_numbers(s)),
        ArtifactValue::List(items) => items.iter().for_each(|item| walk(item, out)),
        ArtifactValue::Record(fields) => {
            for (key, item) in fields {
                out.extend(extract_numbers(key));
                walk(item, out);
            }
        }
    }
}
