//! Internal utilities: entropy for trace ids.

pub mod det_rng;
pub mod entropy;

pub use det_rng::DetRng;
pub use entropy::{DetEntropy, EntropySource, OsEntropy};
