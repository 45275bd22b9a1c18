// Channel configuration.
//
// Every value here is platform specific. The defaults reproduce the reference
// experiment; anything can be overridden from the environment without
// recompiling, e.g. `SPECTRE_HIT_THRESHOLD=120 cargo run --release`.
//

use std::str::FromStr;
use thiserror::Error;

use crate::train::MAX_TRAINING_RUNS;
use crate::N_VALUES;

/// Partitions are laid out in whole cache lines and must span more than one.
pub const CACHE_LINE_SIZE: usize = 64;

/// Largest partition we accept (1MiB, i.e. a 256MiB partition table).
pub const MAX_PARTITION_SIZE: usize = 1 << 20;

pub const ENV_HIT_THRESHOLD: &str = "SPECTRE_HIT_THRESHOLD";
pub const ENV_PARTITION_SIZE: &str = "SPECTRE_PARTITION_SIZE";
pub const ENV_TRIALS: &str = "SPECTRE_TRIALS";
pub const ENV_TRAINING_RUNS: &str = "SPECTRE_TRAINING_RUNS";
pub const ENV_DELAY: &str = "SPECTRE_DELAY";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: cannot parse `{value}`")]
    Unparseable { key: &'static str, value: String },
    #[error("partition size {0} must be a multiple of the 64-byte cache line, larger than one line and at most 1MiB")]
    BadPartitionSize(usize),
    #[error("at least one trial per byte is required")]
    NoTrials,
    #[error("training runs per probe must be between 1 and 65535, got {0}")]
    BadTrainingRuns(usize),
}

/// Knobs of the covert channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    /// A reload taking at most this many cycles counts as a cache hit.
    pub hit_threshold: u64,

    /// Distance in bytes between two consecutive probe partitions. Should be
    /// at least a page so that every partition lands on its own line and the
    /// prefetcher has no stride to follow.
    pub partition_size: usize,

    /// Flush/train/probe cycles aggregated per leaked byte.
    pub trials: usize,

    /// Legal calls to the victim between two malicious ones.
    pub training_runs: usize,

    /// Busy-loop iterations before each call to the victim.
    pub delay_iterations: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            hit_threshold: 80,
            partition_size: 4096,
            trials: 99,
            training_runs: 5,
            delay_iterations: 100,
        }
    }
}

impl ChannelConfig {
    /// Defaults, overridden by whatever `SPECTRE_*` variables are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults, overridden by whatever `lookup` returns for each key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            hit_threshold: parse_or(&lookup, ENV_HIT_THRESHOLD, defaults.hit_threshold)?,
            partition_size: parse_or(&lookup, ENV_PARTITION_SIZE, defaults.partition_size)?,
            trials: parse_or(&lookup, ENV_TRIALS, defaults.trials)?,
            training_runs: parse_or(&lookup, ENV_TRAINING_RUNS, defaults.training_runs)?,
            delay_iterations: parse_or(&lookup, ENV_DELAY, defaults.delay_iterations)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let table = self.partition_size.checked_mul(N_VALUES);
        if self.partition_size <= CACHE_LINE_SIZE
            || self.partition_size % CACHE_LINE_SIZE != 0
            || self.partition_size > MAX_PARTITION_SIZE
            || table.is_none()
        {
            return Err(ConfigError::BadPartitionSize(self.partition_size));
        }
        if self.trials == 0 {
            return Err(ConfigError::NoTrials);
        }
        if self.training_runs == 0 || self.training_runs > MAX_TRAINING_RUNS {
            return Err(ConfigError::BadTrainingRuns(self.training_runs));
        }
        Ok(())
    }
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Unparseable { key, value: raw }),
    }
}
