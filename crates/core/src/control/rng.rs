//! Random source for lookaround draws.
//!
//! All randomness of a rate table goes through [`RowSampler`], so a table
//! built with a seeded generator replays the same exploration sequence for the
//! same feedback.

use rand::{rngs::SmallRng, Rng, RngCore, SeedableRng};

/// Uniform row picker used by lookaround.
pub trait RowSampler {
    /// A row index in `0..row_count`. `row_count` is never zero.
    fn sample_row(&mut self, row_count: usize) -> usize;
}

impl<R: RngCore> RowSampler for R {
    fn sample_row(&mut self, row_count: usize) -> usize {
        self.random_range(0..row_count)
    }
}

/// Seeded generator for a table, mixing a base seed with a station index so
/// per-station sequences stay independent and reproducible.
pub fn station_rng(seed: u64, station: u64) -> SmallRng {
    let derived = seed.wrapping_mul(0x517c_c1b7_2722_0a95).wrapping_add(station);
    SmallRng::seed_from_u64(derived)
}

/// Sampler replaying a fixed script of rows, for tests.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedSampler {
    script: Vec<usize>,
    next: usize,
}

#[cfg(test)]
impl ScriptedSampler {
    pub(crate) fn new(script: impl Into<Vec<usize>>) -> Self {
        Self {
            script: script.into(),
            next: 0,
        }
    }
}

#[cfg(test)]
impl RowSampler for ScriptedSampler {
    fn sample_row(&mut self, row_count: usize) -> usize {
        if self.script.is_empty() {
            return 0;
        }
        let row = self.script[self.next % self.script.len()];
        self.next += 1;
        row % row_count
    }
}
