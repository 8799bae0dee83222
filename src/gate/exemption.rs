//! Regulatory context exemptions.
//!
//! Numbers inside citation-like constructs are vocabulary, not data claims:
//! `Regulation (EU) 2017/745`, `Article 86`, `MDCG 2022-21`, `Section 3.2`,
//! `Annex IV`, `15 March 2024`, `ISO 14971`. The analyzer runs seven
//! independent pattern families over one text and unions what they capture.
//! The resulting set is scoped to that text only.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::token::canonical_literal;

const MONTH: &str = "January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sept|Sep|Oct|Nov|Dec";

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("exemption regex is valid")
}

static REGULATION: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?:\(EU\)|\bEU|\bMDR|\bIVDR)\s*(?:No\.?\s*)?(\d{4})/(\d{1,4})\b")
});
static DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b(\d{2,4})/(\d{1,4})/(?:EEC|EC|EU)\b"));
static ARTICLE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)\b(?:articles?|art\.)\s*(\d+)\b(?:\s*(?:-|to|and)\s*(\d+)\b)?")
});
static GUIDANCE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b[A-Z][A-Z0-9]{1,9}\s+(\d{4})-(\d{1,3})\b"));
static SECTION: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\bsections?\s+(\d+(?:\.\d+)+)"));
static ANNEX: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\bAnnex(?:es)?\s+([IVXLCDM]+)\b(?:\s*(?:,|-|to|and)\s*([IVXLCDM]+)\b)?")
});
static DAY_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(
        r"\b(\d{{1,2}})(?:st|nd|rd|th)?\s+({MONTH})\b\.?(?:,?\s+(\d{{4}})\b)?"
    ))
});
static MONTH_DAY: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(
        r"\b({MONTH})\b\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s+(\d{{4}})\b)?"
    ))
});
static MONTH_YEAR: LazyLock<Regex> =
    LazyLock::new(|| compile(&format!(r"\b({MONTH})\b\.?,?\s+(\d{{4}})\b")));
static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| compile(r"\b(\d{4})-(\d{2})-(\d{2})\b"));
const STANDARDS_BODY: &str = "ISO|IEC|EN|ASTM|AAMI|ANSI|BS|DIN|CLSI|IEEE|UL";
static STANDARD: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(
        r"\b(?:{STANDARDS_BODY})(?:(?:/|\s+)(?:{STANDARDS_BODY}|TR|TS|TIR|PAS))*\s*[-:]?\s*(\d{{4,6}})\b"
    ))
});

/// Numbers exempted by citation context in one text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContextExemptionSet {
    numbers: BTreeSet<String>,
}

impl ContextExemptionSet {
    /// Run every pattern family over `text`.
    pub fn analyze(text: &str) -> Self {
        let mut set = Self::default();
        set.regulations(text);
        set.articles(text);
        set.guidance(text);
        set.sections(text);
        set.annexes(text);
        set.dates(text);
        set.standards(text);
        set
    }

    /// Whether `number` (raw or canonical) is exempt.
    pub fn contains(&self, number: &str) -> bool {
        self.numbers.contains(number) || self.numbers.contains(&canonical_literal(number))
    }

    /// Number of stored forms.
    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    /// Whether nothing was exempted.
    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    /// Exempted forms in lexical order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.numbers.iter().map(String::as_str)
    }

    fn insert(&mut self, number: &str) {
        self.numbers.insert(canonical_literal(number));
        self.numbers.insert(number.to_string());
    }

    fn insert_groups(&mut self, caps: &Captures<'_>) {
        for group in caps.iter().skip(1).flatten() {
            self.insert(group.as_str());
        }
    }

    fn regulations(&mut self, text: &str) {
        for caps in REGULATION.captures_iter(text).chain(DIRECTIVE.captures_iter(text)) {
            self.insert_groups(&caps);
        }
    }

    fn articles(&mut self, text: &str) {
        for caps in ARTICLE.captures_iter(text) {
            self.insert_groups(&caps);
        }
    }

    fn guidance(&mut self, text: &str) {
        for caps in GUIDANCE.captures_iter(text) {
            self.insert_groups(&caps);
        }
    }

    /// `3.2.1` tokenizes as `3.2` then `1`; exempt the same pieces.
    fn sections(&mut self, text: &str) {
        for caps in SECTION.captures_iter(text) {
            let parts: Vec<&str> = caps[1].split('.').collect();
            for pair in parts.chunks(2) {
                self.insert(&pair.join("."));
            }
        }
    }

    fn annexes(&mut self, text: &str) {
        for caps in ANNEX.captures_iter(text) {
            for numeral in caps.iter().skip(1).flatten() {
                if let Some(value) = roman_to_arabic(numeral.as_str()) {
                    self.insert(&value.to_string());
                }
            }
        }
    }

    fn dates(&mut self, text: &str) {
        for caps in DAY_MONTH.captures_iter(text) {
            self.named_date(&caps[2], Some(&caps[1]), caps.get(3).map(|m| m.as_str()));
        }
        for caps in MONTH_DAY.captures_iter(text) {
            self.named_date(&caps[1], Some(&caps[2]), caps.get(3).map(|m| m.as_str()));
        }
        for caps in MONTH_YEAR.captures_iter(text) {
            self.named_date(&caps[1], None, Some(&caps[2]));
        }
        for caps in ISO_DATE.captures_iter(text) {
            let (Ok(month), Ok(day)) = (caps[2].parse::<u32>(), caps[3].parse::<u32>()) else {
                continue;
            };
            if (1..=12).contains(&month) && (1..=31).contains(&day) {
                self.year(&caps[1]);
                self.padded(month);
                self.padded(day);
            }
        }
    }

    fn named_date(&mut self, month_name: &str, day: Option<&str>, year: Option<&str>) {
        let Some(month) = month_number(month_name) else {
            return;
        };
        if let Some(day) = day {
            match day.parse::<u32>() {
                Ok(d) if (1..=31).contains(&d) => {
                    self.padded(d);
                    self.padded(month);
                }
                _ => return,
            }
        }
        if let Some(year) = year {
            self.year(year);
        }
    }

    fn padded(&mut self, value: u32) {
        self.insert(&value.to_string());
        self.insert(&format!("{value:02}"));
    }

    fn year(&mut self, year: &str) {
        if year.parse::<u32>().is_ok_and(|y| (1900..=2100).contains(&y)) {
            self.insert(year);
        }
    }

    fn standards(&mut self, text: &str) {
        for caps in STANDARD.captures_iter(text) {
            self.insert_groups(&caps);
        }
    }
}

/// Exemptions for `text`.
pub fn exemptions(text: &str) -> ContextExemptionSet {
    ContextExemptionSet::analyze(text)
}

fn month_number(name: &str) -> Option<u32> {
    let prefix = name.get(..3)?.to_ascii_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

const ROMAN_DIGITS: [(u32, &str); 13] = [
    (1000, "M"),
    (900, "CM"),
    (500, "D"),
    (400, "CD"),
    (100, "C"),
    (90, "XC"),
    (50, "L"),
    (40, "XL"),
    (10, "X"),
    (9, "IX"),
    (5, "V"),
    (4, "IV"),
    (1, "I"),
];

/// Strict roman numeral parser.
///
/// Only canonical subtractive forms are accepted (`IV`, `IX`, `XL`, ...);
/// `IIII`, `IL` or `VX` yield `None`.
pub fn roman_to_arabic(numeral: &str) -> Option<u32> {
    if numeral.is_empty() {
        return None;
    }
    let mut total = 0;
    let mut rest = numeral;
    for (value, symbol) in ROMAN_DIGITS {
        while let Some(tail) = rest.strip_prefix(symbol) {
            rest = tail;
            total += value;
        }
    }
    // Greedy parsing accepts `IIII`; only the canonical spelling round-trips.
    (rest.is_empty() && to_roman(total) == numeral).then_some(total)
}

fn to_roman(mut value: u32) -> String {
    let mut out = String::new();
    for (unit, symbol) in ROMAN_DIGITS {
        while value >= unit {
            out.push_str(symbol);
            value -= unit;
        }
    }
    out
}
