//! Case artifacts and the allowed-number corpus built from them.
//!
//! The corpus is the set of every number the narrative may legitimately
//! state: values computed by upstream analytics, cells and headers of annex
//! tables, and numbers already present in the original narrative and its
//! factual claims. It is rebuilt per gate invocation and never mutated.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use narrative_evidence::sha256_hex;
use serde::{Deserialize, Serialize};

use super::token::{canonical_f64, canonical_literal, extract_numbers, numbers_in_value};
use crate::tracing_compat::debug;

// ---------------------------------------------------------------------------
// Upstream artifacts
// ---------------------------------------------------------------------------

/// Structured value produced by upstream analytics.
///
/// Deserializes from any JSON document; integers that fit `i64` stay exact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArtifactValue {
    /// Absent value.
    Null,
    /// Flag.
    Bool(bool),
    /// Exact integer.
    Integer(i64),
    /// Any other number.
    Float(f64),
    /// Free text; numeric substrings are scanned.
    Text(String),
    /// Ordered sequence.
    List(Vec<ArtifactValue>),
    /// Keyed fields; keys are scanned too.
    Record(BTreeMap<String, ArtifactValue>),
}

impl From<serde_json::Value> for ArtifactValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or(f64::NAN)), Self::Integer),
            Value::String(s) => Self::Text(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(fields) => {
                Self::Record(fields.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<f64> for ArtifactValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for ArtifactValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for ArtifactValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Analytics category of a periodic safety update report.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AnalyticsCategory {
    /// Units sold, patient exposure.
    SalesExposure,
    /// Complaint counts and rates.
    Complaints,
    /// Serious incident reports.
    SeriousIncidents,
    /// Statistical trend reporting.
    TrendReporting,
    /// Field safety corrective actions.
    FieldSafetyActions,
    /// Literature review findings.
    Literature,
    /// Post-market clinical follow-up.
    ClinicalFollowUp,
    /// Any other upstream category.
    Other(String),
}

impl AnalyticsCategory {
    /// Stable snake_case name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::SalesExposure => "sales_exposure",
            Self::Complaints => "complaints",
            Self::SeriousIncidents => "serious_incidents",
            Self::TrendReporting => "trend_reporting",
            Self::FieldSafetyActions => "fsca",
            Self::Literature => "literature",
            Self::ClinicalFollowUp => "pmcf",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for AnalyticsCategory {
    fn from(name: String) -> Self {
        match name.as_str() {
            "sales_exposure" => Self::SalesExposure,
            "complaints" => Self::Complaints,
            "serious_incidents" => Self::SeriousIncidents,
            "trend_reporting" => Self::TrendReporting,
            "fsca" => Self::FieldSafetyActions,
            "literature" => Self::Literature,
            "pmcf" => Self::ClinicalFollowUp,
            _ => Self::Other(name),
        }
    }
}

impl From<AnalyticsCategory> for String {
    fn from(category: AnalyticsCategory) -> Self {
        match category {
            AnalyticsCategory::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for AnalyticsCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Annex or summary table as rendered upstream: string cells only.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnexTable {
    /// Table identifier, e.g. `annex_ii_complaints`.
    pub table_id: String,
    /// Column headers.
    pub columns: Vec<String>,
    /// Row-major cells.
    pub rows: Vec<Vec<String>>,
}

impl AnnexTable {
    /// Table with the given headers and no rows.
    pub fn new<S: Into<String>>(table_id: impl Into<String>, columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            table_id: table_id.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row.
    #[must_use]
    pub fn row<S: Into<String>>(mut self, cells: impl IntoIterator<Item = S>) -> Self {
        self.rows.push(cells.into_iter().map(Into::into).collect());
        self
    }
}

/// Everything upstream produced for one case.
///
/// Every part is optional: a case without tables or prior narrative simply
/// contributes fewer numbers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseArtifacts {
    /// Computed analytics keyed by category.
    pub analytics: BTreeMap<AnalyticsCategory, ArtifactValue>,
    /// Annex and summary tables.
    pub tables: Vec<AnnexTable>,
    /// Pre-enhancement narrative text.
    pub original_narrative: Option<String>,
    /// Factual claims attached to the original narrative.
    pub factual_claims: Vec<String>,
}

impl CaseArtifacts {
    /// Parse artifacts from their JSON document.
    pub fn from_json_str(source: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Attach one analytics category.
    #[must_use]
    pub fn with_analytics(mut self, category: AnalyticsCategory, value: impl Into<ArtifactValue>) -> Self {
        self.analytics.insert(category, value.into());
        self
    }

    /// Attach a table.
    #[must_use]
    pub fn with_table(mut self, table: AnnexTable) -> Self {
        self.tables.push(table);
        self
    }

    /// Set the original narrative.
    #[must_use]
    pub fn with_original_narrative(mut self, text: impl Into<String>) -> Self {
        self.original_narrative = Some(text.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Corpus
// ---------------------------------------------------------------------------

/// Read-only set of canonical numbers the narrative may state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AllowedNumberCorpus {
    numbers: BTreeSet<String>,
    values: Vec<f64>,
}

impl AllowedNumberCorpus {
    /// Build the corpus for one case. Deterministic and infallible.
    pub fn build(artifacts: &CaseArtifacts) -> Self {
        let mut numbers = BTreeSet::new();

        for value in artifacts.analytics.values() {
            numbers.extend(numbers_in_value(value));
        }
        for table in &artifacts.tables {
            for header in &table.columns {
                numbers.extend(extract_numbers(header));
            }
            for cell in table.rows.iter().flatten() {
                numbers.extend(extract_numbers(cell));
            }
        }
        if let Some(text) = &artifacts.original_narrative {
            numbers.extend(extract_numbers(text));
        }
        for claim in &artifacts.factual_claims {
            numbers.extend(extract_numbers(claim));
        }

        let corpus = Self::from_canonical(numbers);
        debug!(
            numbers = corpus.len(),
            categories = artifacts.analytics.len(),
            tables = artifacts.tables.len(),
            "built allowed-number corpus"
        );
        corpus
    }

    /// Corpus from arbitrary numeric strings (`"1,000"`, `"86.0"`, `"42"`).
    ///
    /// Strings that are not numbers are ignored.
    pub fn from_numbers<I, S>(numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::from_canonical(
            numbers
                .into_iter()
                .filter_map(|n| normalize(n.as_ref()))
                .collect(),
        )
    }

    fn from_canonical(numbers: BTreeSet<String>) -> Self {
        let mut values: Vec<f64> = numbers
            .iter()
            .filter_map(|n| n.parse::<f64>().ok())
            .collect();
        values.sort_by(f64::total_cmp);
        values.dedup();
        Self { numbers, values }
    }

    /// Whether `number` (any surface form) is in the corpus.
    pub fn contains(&self, number: &str) -> bool {
        normalize(number).is_some_and(|n| self.numbers.contains(&n))
    }

    /// Whether a canonical string is present as-is.
    pub fn contains_canonical(&self, canonical: &str) -> bool {
        self.numbers.contains(canonical)
    }

    /// Whether some corpus value renders to the same canonical form as `value`.
    pub fn contains_value(&self, value: f64) -> bool {
        canonical_f64(value).is_some_and(|c| self.numbers.contains(&c))
    }

    /// Closest corpus value `c` with `|value - c| <= tolerance * |c|`.
    ///
    /// A zero corpus value only matches an exact zero.
    pub fn within_tolerance(&self, value: f64, tolerance: f64) -> Option<f64> {
        if !value.is_finite() {
            return None;
        }
        self.values
            .iter()
            .copied()
            .filter(|c| (value - c).abs() <= tolerance * c.abs())
            .min_by(|a, b| (value - a).abs().total_cmp(&(value - b).abs()))
    }

    /// Number of distinct canonical numbers.
    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    /// Whether the corpus holds no numbers.
    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    /// Canonical numbers in lexical order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.numbers.iter().map(String::as_str)
    }

    /// Content hash of the corpus, for decision lineage.
    pub fn fingerprint(&self) -> String {
        let joined: Vec<&str> = self.iter().collect();
        sha256_hex(joined.join("\n").as_bytes())
    }
}

fn normalize(number: &str) -> Option<String> {
    let literal: String = number.trim().chars().filter(|c| *c != ',').collect();
    let well_formed = !literal.is_empty()
        && literal.chars().all(|c| c.is_ascii_digit() || c == '.')
        && literal.matches('.').count() <= 1
        && literal.chars().any(|c| c.is_ascii_digit());
    well_formed.then(|| canonical_literal(&literal))
}
