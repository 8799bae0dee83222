//! Fixed registry of regulatory numbers.
//!
//! Standards, regulations, directives and articles that device narratives
//! cite constantly, plus conventional rate denominators. Consulted only for
//! numbers outside metric context, so a registered value can never launder a
//! fabricated rate or percentage.

/// Canonical forms of always-acceptable citation numbers.
pub const REGISTERED_NUMBERS: &[&str] = &[
    // EU MDR / IVDR
    "2017", "745", "746",
    // MDR articles on vigilance and post-market surveillance
    "61", "83", "84", "85", "86", "87", "88", "89", "92", "120",
    // Legacy directives (93/42/EEC, 90/385/EEC, 98/79/EC)
    "93", "90", "385", "98", "79",
    // Harmonised standards
    "13485", "14971", "14155", "10993", "11135", "11137", "11607", "15223", "20417",
    "62304", "62366", "60601", "24971",
    // Rate denominators
    "100", "1000", "10000", "100000", "1000000",
];

/// Whether `canonical` is a registered citation number.
pub fn is_registered(canonical: &str) -> bool {
    REGISTERED_NUMBERS.contains(&canonical)
}
