// Hit aggregation and top-2 extraction.
//

use std::fmt;

use crate::N_VALUES;

/// Per-partition cache hit counts for one leaked byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tally {
    hits: [u32; N_VALUES],
}

impl Default for Tally {
    fn default() -> Self {
        Self::new()
    }
}

impl Tally {
    pub fn new() -> Self {
        Self { hits: [0; N_VALUES] }
    }

    pub fn from_counts(hits: [u32; N_VALUES]) -> Self {
        Self { hits }
    }

    #[inline(always)]
    pub fn mark(&mut self, value: u8) {
        self.hits[value as usize] += 1;
    }

    pub fn counts(&self) -> &[u32; N_VALUES] {
        &self.hits
    }

    pub fn total(&self) -> u64 {
        self.hits.iter().map(|&h| h as u64).sum()
    }

    /// Best and runner-up partitions in one left-to-right scan.
    ///
    /// A value takes the best slot when its count is `>=` the current best,
    /// pushing the old best down to runner-up, so among equal maxima the one
    /// with the highest index wins. Otherwise it takes the runner-up slot when
    /// its count is `>=` the current runner-up. With an all-zero tally both
    /// scores are zero and the values are simply the last two indices scanned.
    pub fn best_results(&self) -> ExtractionResult {
        let mut best: Option<usize> = None;
        let mut second: Option<usize> = None;
        for (i, &hits) in self.hits.iter().enumerate() {
            match best {
                Some(b) if hits < self.hits[b] => {
                    if second.map_or(true, |s| hits >= self.hits[s]) {
                        second = Some(i);
                    }
                }
                _ => {
                    second = best;
                    best = Some(i);
                }
            }
        }
        // N_VALUES > 1, so the scan fills both slots
        let best = best.unwrap_or(0);
        let second = second.unwrap_or(0);
        ExtractionResult {
            best: Candidate::new(best as u8, self.hits[best]),
            runner_up: Candidate::new(second as u8, self.hits[second]),
        }
    }
}

/// A partition value and how many trials saw it cached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub value: u8,
    pub score: u32,
}

impl Candidate {
    pub fn new(value: u8, score: u32) -> Self {
        Self { value, score }
    }

    /// The value as a printable ASCII character, `?` otherwise.
    pub fn printable(&self) -> char {
        if self.value > 31 && self.value < 127 {
            self.value as char
        } else {
            '?'
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confidence {
    Success,
    Unclear,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Success => f.write_str("Success"),
            Confidence::Unclear => f.write_str("Unclear"),
        }
    }
}

/// Outcome of one byte extraction round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtractionResult {
    pub best: Candidate,
    pub runner_up: Candidate,
}

impl ExtractionResult {
    /// Success when the best score is at least twice the runner-up's.
    pub fn confidence(&self) -> Confidence {
        if self.best.score as u64 >= 2 * self.runner_up.score as u64 {
            Confidence::Success
        } else {
            Confidence::Unclear
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally_of(prefix: &[u32]) -> Tally {
        let mut hits = [0u32; N_VALUES];
        hits[..prefix.len()].copy_from_slice(prefix);
        Tally::from_counts(hits)
    }

    fn result(best: u32, runner_up: u32) -> ExtractionResult {
        ExtractionResult {
            best: Candidate::new(b'x', best),
            runner_up: Candidate::new(b'y', runner_up),
        }
    }

    #[test]
    fn tie_for_first_is_deterministic() {
        let res = tally_of(&[5, 5, 3]).best_results();
        assert_eq!(res.best, Candidate::new(1, 5));
        assert_eq!(res.runner_up, Candidate::new(0, 5));
    }

    #[test]
    fn clear_winner_and_runner_up() {
        let mut hits = [0u32; N_VALUES];
        hits[b'A' as usize] = 90;
        hits[b'Z' as usize] = 12;
        hits[3] = 4;
        let res = Tally::from_counts(hits).best_results();
        assert_eq!(res.best, Candidate::new(b'A', 90));
        assert_eq!(res.runner_up, Candidate::new(b'Z', 12));
        assert_eq!(res.confidence(), Confidence::Success);
    }

    #[test]
    fn all_zero_tally_does_not_fail() {
        let res = Tally::new().best_results();
        assert_eq!(res.best.score, 0);
        assert_eq!(res.runner_up.score, 0);
        // leftovers of the scan, not data
        assert_eq!(res.best.value, 255);
        assert_eq!(res.runner_up.value, 254);
        assert_eq!(res.confidence(), Confidence::Success);
    }

    #[test]
    fn single_hit_leaves_a_zero_runner_up() {
        let mut tally = Tally::new();
        for _ in 0..99 {
            tally.mark(b'B');
        }
        let res = tally.best_results();
        assert_eq!(res.best, Candidate::new(b'B', 99));
        assert_eq!(res.runner_up, Candidate::new(255, 0));
    }

    #[test]
    fn confidence_rule() {
        assert_eq!(result(60, 29).confidence(), Confidence::Success);
        assert_eq!(result(60, 30).confidence(), Confidence::Success);
        assert_eq!(result(60, 31).confidence(), Confidence::Unclear);
        assert_eq!(result(0, 0).confidence(), Confidence::Success);
    }

    #[test]
    fn printable_rendering() {
        assert_eq!(Candidate::new(b'A', 1).printable(), 'A');
        assert_eq!(Candidate::new(b' ', 1).printable(), ' ');
        assert_eq!(Candidate::new(0x1f, 1).printable(), '?');
        assert_eq!(Candidate::new(0x7f, 1).printable(), '?');
        assert_eq!(Candidate::new(0xc3, 1).printable(), '?');
    }

    #[test]
    fn total_sums_every_partition() {
        let tally = tally_of(&[0, 2, 0, 7]);
        assert_eq!(tally.total(), 9);
    }
}
