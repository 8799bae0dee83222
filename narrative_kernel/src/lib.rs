//! Identifier substrate for the narrative gate.
//!
//! Shared by the gate, the decision chain and the audit exporters:
//!
//! - [`TraceId`]: time-ordered 128-bit record identifier, hex on the wire.
//! - [`CaseId`] / [`UnitId`]: non-blank handles assigned by upstream case
//!   management.
//! - [`SchemaVersion`]: version stamped into exported decision records.

#![forbid(unsafe_code)]
#![no_std]

extern crate alloc;

use alloc::fmt;
use alloc::string::String;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// TraceId
// ---------------------------------------------------------------------------

const TIMESTAMP_SHIFT: u32 = 80;
const RANDOM_MASK: u128 = (1 << TIMESTAMP_SHIFT) - 1;
const HEX_WIDTH: usize = 32;

/// Identifier of one decision trace record.
///
/// The top 48 bits hold the unix-millisecond creation time and the low 80
/// bits are random, so ids sort by creation time. On the wire it is always
/// 32 lowercase hex digits.
///
/// ```
/// use narrative_kernel::TraceId;
///
/// let id = TraceId::from_parts(1_700_000_000_000, 42);
/// assert_eq!(id.timestamp_ms(), 1_700_000_000_000);
/// assert_eq!(id.to_string().len(), 32);
/// assert_eq!(id.to_string().parse::<TraceId>().unwrap(), id);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TraceId(u128);

impl TraceId {
    /// Wrap a raw 128-bit value.
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Combine a unix-millisecond timestamp with random bits.
    ///
    /// Only the low 80 bits of `random` are kept.
    pub const fn from_parts(ts_ms: u64, random: u128) -> Self {
        Self(((ts_ms as u128) << TIMESTAMP_SHIFT) | (random & RANDOM_MASK))
    }

    /// Creation time in unix milliseconds.
    pub const fn timestamp_ms(self) -> u64 {
        (self.0 >> TIMESTAMP_SHIFT) as u64
    }

    /// The 80 random bits.
    pub const fn random_bits(self) -> u128 {
        self.0 & RANDOM_MASK
    }

    /// Raw value.
    pub const fn as_u128(self) -> u128 {
        self.0
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TraceId").field(&format_args!("{self}")).finish()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$x}", self.0, width = HEX_WIDTH)
    }
}

impl FromStr for TraceId {
    type Err = ParseIdError;

    /// Accepts exactly 32 hex digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseIdError::new("TraceId", s);
        if s.len() != HEX_WIDTH || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        u128::from_str_radix(s, 16).map(Self).map_err(|_| invalid())
    }
}

impl Serialize for TraceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TraceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// CaseId / UnitId
// ---------------------------------------------------------------------------

/// A report case. Each case owns exactly one decision chain.
///
/// ```
/// use narrative_kernel::CaseId;
///
/// let case = CaseId::new("PSUR-2024-0007").unwrap();
/// assert_eq!(case.as_str(), "PSUR-2024-0007");
/// assert!(CaseId::new("  ").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CaseId(String);

/// A narrative unit (one report section) within a case.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UnitId(String);

macro_rules! string_handle {
    ($ty:ident) => {
        impl $ty {
            /// Blank or whitespace-only input is rejected.
            pub fn new(raw: impl Into<String>) -> Result<Self, ParseIdError> {
                let raw = raw.into();
                if raw.trim().is_empty() {
                    return Err(ParseIdError::new(stringify!($ty), &raw));
                }
                Ok(Self(raw))
            }

            /// Borrow the handle.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $ty {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = ParseIdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.0
            }
        }
    };
}

string_handle!(CaseId);
string_handle!(UnitId);

// ---------------------------------------------------------------------------
// SchemaVersion
// ---------------------------------------------------------------------------

/// `major.minor.patch` version of the exported record layout.
///
/// A reader understands any file with the same major version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Incremented on breaking layout changes.
    pub major: u32,
    /// Incremented on added fields.
    pub minor: u32,
    /// Incremented on fixes.
    pub patch: u32,
}

impl SchemaVersion {
    /// Version from its parts.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Whether a reader at `self` can read records written at `other`.
    pub const fn is_compatible(&self, other: &Self) -> bool {
        self.major == other.major
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SchemaVersion {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseIdError::new("SchemaVersion", s);
        let (major, rest) = s.split_once('.').ok_or_else(invalid)?;
        let (minor, patch) = rest.split_once('.').ok_or_else(invalid)?;
        let part = |p: &str| p.parse::<u32>().map_err(|_| invalid());
        Ok(Self::new(part(major)?, part(minor)?, part(patch)?))
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// An identifier or version string was rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseIdError {
    /// Type being parsed.
    pub kind: &'static str,
    /// Length of the rejected input.
    pub input_len: usize,
}

impl ParseIdError {
    fn new(kind: &'static str, input: &str) -> Self {
        Self {
            kind,
            input_len: input.len(),
        }
    }
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} ({} bytes)", self.kind, self.input_len)
    }
}

impl core::error::Error for ParseIdError {}
