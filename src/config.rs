//! Gate policy.
//!
//! Every threshold the gate and the retry controller apply lives in
//! [`GatePolicy`]. Defaults reproduce the reference behaviour; deployments
//! can override any field from a TOML file when the `config-file` feature is
//! enabled.
//!
//! ```toml
//! tolerance = 0.10
//! max_attempts = 2
//!
//! [year_range]
//! min = 1950
//! max = 2100
//! ```

use serde::{Deserialize, Serialize};

/// Errors raised while loading or validating a [`GatePolicy`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The policy file could not be read.
    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),
    /// The TOML document did not parse into a policy.
    #[cfg(feature = "config-file")]
    #[error("invalid policy TOML: {0}")]
    Parse(#[from] toml::de::Error),
    /// A field holds a value outside its allowed range.
    #[error("policy field `{field}` out of range: {reason}")]
    OutOfRange {
        /// Offending field.
        field: &'static str,
        /// What the field must satisfy.
        reason: String,
    },
}

/// Inclusive calendar-year window treated as a date, not a data claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    /// First lenient year.
    pub min: u32,
    /// Last lenient year.
    pub max: u32,
}

impl YearRange {
    /// Whether `year` falls inside the window.
    pub const fn contains(self, year: u32) -> bool {
        year >= self.min && year <= self.max
    }
}

impl Default for YearRange {
    fn default() -> Self {
        Self {
            min: 1900,
            max: 2100,
        }
    }
}

/// Thresholds for the numeric gate and the enhancement controller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatePolicy {
    /// Relative band around a corpus value within which a metric-context
    /// number is accepted (`0.15` = ±15%).
    pub tolerance: f64,
    /// Drafting attempts before falling back to the original narrative.
    pub max_attempts: u32,
    /// Integers `0..=small_integer_max` pass outside metric context.
    pub small_integer_max: u32,
    /// Bare `N.N` decimals up to this value pass outside metric context.
    pub section_decimal_max: f64,
    /// Four-digit tokens in this window pass outside metric context.
    pub year_range: YearRange,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            tolerance: 0.15,
            max_attempts: 3,
            small_integer_max: 20,
            section_decimal_max: 20.0,
            year_range: YearRange::default(),
        }
    }
}

impl GatePolicy {
    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tolerance.is_finite() || !(0.0..1.0).contains(&self.tolerance) {
            return Err(ConfigError::OutOfRange {
                field: "tolerance",
                reason: format!("must be in [0, 1), got {}", self.tolerance),
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if !self.section_decimal_max.is_finite() || self.section_decimal_max < 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "section_decimal_max",
                reason: format!("must be finite and non-negative, got {}", self.section_decimal_max),
            });
        }
        if self.year_range.min > self.year_range.max {
            return Err(ConfigError::OutOfRange {
                field: "year_range",
                reason: format!(
                    "min {} exceeds max {}",
                    self.year_range.min, self.year_range.max
                ),
            });
        }
        Ok(())
    }

    /// Parse and validate a policy from a TOML document.
    ///
    /// Missing fields take their defaults.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let policy: Self = toml::from_str(source)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Read, parse and validate a policy file.
    #[cfg(feature = "config-file")]
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Builder-style tolerance override.
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Builder-style attempt-limit override.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let policy = GatePolicy::default();
        policy.validate().unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert!((policy.tolerance - 0.15).abs() < f64::EPSILON);
        assert!(policy.year_range.contains(2024));
        assert!(!policy.year_range.contains(2101));
    }

    #[test]
    fn zero_attempts_rejected() {
        let err = GatePolicy::default().with_max_attempts(0).validate().unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "max_attempts", .. }));
    }

    #[test]
    fn tolerance_must_be_a_fraction() {
        for bad in [-0.1, 1.0, f64::NAN] {
            let err = GatePolicy::default().with_tolerance(bad).validate().unwrap_err();
            assert!(err.to_string().contains("tolerance"), "{err}");
        }
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn partial_toml_keeps_defaults() {
        let policy = GatePolicy::from_toml_str("tolerance = 0.05\n").unwrap();
        assert!((policy.tolerance - 0.05).abs() < f64::EPSILON);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.year_range, YearRange::default());
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_year_range_validated() {
        let err = GatePolicy::from_toml_str("[year_range]\nmin = 2100\nmax = 1900\n").unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "year_range", .. }));
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = GatePolicy::from_toml_str("tolerance = \"lots\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn policy_file_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.toml");
        std::fs::write(&path, "max_attempts = 5\n").unwrap();
        let policy = GatePolicy::from_toml_file(&path).unwrap();
        assert_eq!(policy.max_attempts, 5);
    }
}
