// Spectre V1 covert channel
//
// Leaks bytes that sit past the end of a bounds-checked array by training the
// branch predictor, letting one out-of-bounds read run speculatively, and then
// recovering the byte from which probe partition ended up in the cache.
//
pub mod config;
pub mod orchestrator;
pub mod receiver;
pub mod tally;
pub mod train;

#[cfg(target_arch = "x86_64")]
pub mod arch;
#[cfg(target_arch = "x86_64")]
pub mod harness;

pub use config::{ChannelConfig, ConfigError};
pub use orchestrator::{leak_secret, ByteReport, LeakReport};
pub use receiver::{extract_byte, CovertChannel};
pub use tally::{Candidate, Confidence, ExtractionResult, Tally};

#[cfg(target_arch = "x86_64")]
pub use harness::{Calibration, Harness};

/// Number of distinct byte values, one probe partition each.
pub const N_VALUES: usize = 256;

/// Length of the guarded array, i.e. the number of architecturally legal
/// indices that can be used to train the bounds check.
pub const GUARDED_LEN: usize = 16;
