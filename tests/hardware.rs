// Runs against the real cache. These depend on the host (x86_64 with
// unmitigated speculation and a calibrated hit threshold) and on a quiet
// machine, so they are ignored by default:
//
//   cargo test --release --test hardware -- --ignored --test-threads=1
//
#![cfg(target_arch = "x86_64")]

use spectre_channel::{extract_byte, ChannelConfig, CovertChannel, Harness, Tally};

fn harness() -> Harness {
    let config = ChannelConfig::from_env().unwrap();
    Harness::new(config).unwrap()
}

#[test]
#[ignore = "needs a calibrated x86_64 host"]
fn calibration_sees_hits_faster_than_misses() {
    let mut harness = harness();
    let cal = harness.calibrate(2000);
    assert!(cal.hit < cal.miss, "{:?}", cal);
}

#[test]
#[ignore = "needs a calibrated x86_64 host"]
fn flushed_partitions_read_as_misses() {
    let mut harness = harness();
    let mut rounds_clean = 0;
    for _ in 0..100 {
        let mut tally = Tally::new();
        harness.flush_all_partitions();
        harness.load_partition(b'Q');
        harness.measure_and_mark(&mut tally);

        assert_eq!(tally.counts()[b'Q' as usize], 1, "loaded partition must read as a hit");
        if tally.total() == 1 {
            rounds_clean += 1;
        }
    }
    assert!(rounds_clean >= 90, "only {} of 100 rounds were clean", rounds_clean);
}

#[test]
#[ignore = "needs a calibrated x86_64 host"]
fn tally_counts_stay_within_trial_count() {
    let mut harness = harness();
    let trials = 50;
    let mut tally = Tally::new();
    for attempt in 0..trials {
        harness.flush_all_partitions();
        harness.train_and_transmit(attempt % 16, 0);
        harness.measure_and_mark(&mut tally);
    }
    assert!(tally.counts().iter().all(|&c| c <= trials as u32));
    assert!(tally.total() <= 256 * trials as u64);
}

#[test]
#[ignore = "needs a calibrated x86_64 host without Spectre V1 mitigations"]
fn repeated_extraction_agrees_on_the_secret() {
    let secret = Box::new(*b"S");
    let mut harness = harness();
    let malicious_x = harness.offset_of(secret.as_ptr());
    let trials = harness.config().trials;

    let runs = 20;
    let agree = (0..runs)
        .filter(|_| extract_byte(&mut harness, malicious_x, trials).best.value == secret[0])
        .count();
    assert!(agree * 10 >= runs * 9, "only {} of {} runs recovered the byte", agree, runs);
}
