//! Entropy source abstraction for trace-id generation.
//!
//! Production code mints trace ids from [`OsEntropy`]; tests inject a seeded
//! [`DetEntropy`] so record hashes are reproducible.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::tracing_compat::warn;
use crate::util::DetRng;

/// Core trait for entropy providers.
pub trait EntropySource: Send + Sync {
    /// Fill a buffer with entropy bytes.
    fn fill_bytes(&self, dest: &mut [u8]);

    /// Return the next random `u64`.
    fn next_u64(&self) -> u64 {
        let mut buf = [0u8; 8];
        self.fill_bytes(&mut buf);
        u64::from_le_bytes(buf)
    }

    /// Return the next random `u128`.
    fn next_u128(&self) -> u128 {
        let mut buf = [0u8; 16];
        self.fill_bytes(&mut buf);
        u128::from_le_bytes(buf)
    }

    /// Stable identifier for tracing and diagnostics.
    fn source_id(&self) -> &'static str;
}

/// OS-backed entropy source for production use.
///
/// If the OS source is unavailable the bytes come from a process-wide
/// counter-seeded generator instead. Trace ids stay unique within the
/// process; they only lose unpredictability, which nothing here relies on.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

static FALLBACK_COUNTER: AtomicU64 = AtomicU64::new(0x5eed);

impl EntropySource for OsEntropy {
    fn fill_bytes(&self, dest: &mut [u8]) {
        if let Err(err) = getrandom::fill(dest) {
            warn!(error = %err, "OS entropy unavailable; using fallback generator");
            let seed = FALLBACK_COUNTER.fetch_add(1, Ordering::Relaxed);
            DetRng::new(seed).fill_bytes(dest);
        }
    }

    fn source_id(&self) -> &'static str {
        "os"
    }
}

/// Deterministic entropy source for tests and replays.
#[derive(Debug)]
pub struct DetEntropy {
    rng: Mutex<DetRng>,
}

impl DetEntropy {
    /// Create a deterministic entropy source from a seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(DetRng::new(seed)),
        }
    }
}

impl EntropySource for DetEntropy {
    fn fill_bytes(&self, dest: &mut [u8]) {
        self.rng.lock().fill_bytes(dest);
    }

    fn next_u64(&self) -> u64 {
        self.rng.lock().next_u64()
    }

    fn source_id(&self) -> &'static str {
        "deterministic"
    }
}
