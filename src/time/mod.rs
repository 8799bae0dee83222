//! Clocks used to stamp decision records.

mod driver;

pub use driver::{TimeSource, VirtualClock, WallClock};
