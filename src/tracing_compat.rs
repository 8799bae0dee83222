//! Optional tracing integration.
//!
//! With the `tracing-integration` feature (on by default) the macros below
//! are re-exports of the `tracing` crate's event macros. Without it they
//! expand to nothing, so call sites never need their own `cfg` guards.
//!
//! ```ignore
//! use crate::tracing_compat::{debug, warn};
//!
//! debug!(attempt, "gate passed");
//! warn!(violations = ?list, "gate rejected draft");
//! ```

#[cfg(feature = "tracing-integration")]
#[allow(unused_imports)]
pub use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing-integration"))]
mod noop {
    macro_rules! trace {
        ($($arg:tt)*) => {};
    }
    macro_rules! debug {
        ($($arg:tt)*) => {};
    }
    macro_rules! info {
        ($($arg:tt)*) => {};
    }
    macro_rules! warn {
        ($($arg:tt)*) => {};
    }
    macro_rules! error {
        ($($arg:tt)*) => {};
    }

    pub(crate) use {debug, error, info, trace, warn};
}

#[cfg(not(feature = "tracing-integration"))]
#[allow(unused_imports)]
pub(crate) use noop::{debug, error, info, trace, warn};
