//! Priority generation and per-frame candidate selection.
//!
//! After every update cycle [`RateTable::generate_priority`] ranks the rows
//! into four roles:
//!
//! | Role | Default | Fallback |
//! |------|---------|----------|
//! | best | highest estimated goodput (with dip recovery) | most robust row |
//! | second | one MCS step below best | runner-up by goodput |
//! | best probability | one MCS step below second | most reliable row |
//! | baseline | one MCS step below best probability | best probability |
//!
//! Per frame, [`RateTable::select_rates`] lays those roles out in chain order
//! and occasionally splices in a lookaround row to keep statistics fresh.

use arrayvec::ArrayVec;

use super::rng::RowSampler;
use super::table::RateTable;
use crate::config::{
    DIP_REFERENCE_PROBABILITY, LOOKAROUND_THROUGHPUT_WINDOW_PCT, MAX_CHAIN_LEN, PERCENT,
    RECOVERY_PROBABILITY, SECONDARY_PLACEMENT_PROBABILITY,
};
use crate::rate::{space, throughput, Rate, RowIndex};

/// The four rows a retry chain is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Priority {
    pub(crate) best: RowIndex,
    pub(crate) second: RowIndex,
    pub(crate) best_probability: RowIndex,
    pub(crate) baseline: RowIndex,
}

impl Priority {
    pub(crate) fn all(row: RowIndex) -> Self {
        Self {
            best: row,
            second: row,
            best_probability: row,
            baseline: row,
        }
    }
}

/// Rows picked for one frame, in chain order, before attempts are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidates {
    slots: ArrayVec<RowIndex, MAX_CHAIN_LEN>,
    best_slot: Option<usize>,
    lookaround_slot: Option<usize>,
    frame_size: usize,
}

impl Candidates {
    fn new(frame_size: usize) -> Self {
        Self {
            slots: ArrayVec::new(),
            best_slot: None,
            lookaround_slot: None,
            frame_size,
        }
    }

    pub fn rows(&self) -> &[RowIndex] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot holding the current best row, unless lookaround displaced it.
    pub fn best_slot(&self) -> Option<usize> {
        self.best_slot
    }

    /// Slot holding the lookaround row, if this frame explores.
    pub fn lookaround_slot(&self) -> Option<usize> {
        self.lookaround_slot
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Append `row` unless it is already present or the chain is full; the
    /// slot now holding it either way.
    fn push(&mut self, row: RowIndex, limit: usize) -> Option<usize> {
        if let Some(slot) = self.slots.iter().position(|r| *r == row) {
            return Some(slot);
        }
        if self.slots.len() >= limit.min(MAX_CHAIN_LEN) {
            return None;
        }
        self.slots.push(row);
        Some(self.slots.len() - 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// Probe first, best second.
    Primary,
    /// Best first, probe second.
    Secondary,
}

impl<S> RateTable<S> {
    /// Recompute the four priority rows from the current statistics.
    pub fn generate_priority(&mut self) {
        let mut best: Option<(RowIndex, u32)> = None;
        let mut runner_up: Option<(RowIndex, u32)> = None;
        let mut most_probable: Option<(RowIndex, u8, u32)> = None;

        for index in 0..self.rows.len() {
            let stats = &self.rows[index];
            if stats.evidence == 0 {
                continue;
            }
            let row = RowIndex::new(index);
            let rate = self.rate(row);
            if !space::validate(&rate) {
                continue;
            }
            let probability = stats.probability;
            let tp = throughput::estimated_bps(&rate, probability);

            if most_probable
                .map_or(true, |(_, p, t)| probability > p || (probability == p && tp > t))
            {
                most_probable = Some((row, probability, tp));
            }

            match best {
                None => best = Some((row, tp)),
                Some((current, current_tp)) => {
                    if tp > current_tp || self.recovers_from_dip(row, tp, current) {
                        runner_up = best;
                        best = Some((row, tp));
                    } else if runner_up.map_or(true, |(_, t)| tp > t) {
                        runner_up = Some((row, tp));
                    }
                }
            }
        }

        let best = best.map_or(self.lowest, |(row, _)| row);
        let second = self
            .step_down_row(best)
            .or(runner_up.map(|(row, _)| row))
            .unwrap_or(best);
        let best_probability = self
            .step_down_row(second)
            .or(most_probable.map(|(row, ..)| row))
            .unwrap_or(second);
        let baseline = self
            .step_down_row(best_probability)
            .unwrap_or(best_probability);

        let priority = Priority {
            best,
            second,
            best_probability,
            baseline,
        };
        if priority.best != self.priority.best {
            tracing::debug!(
                from = %self.rate(self.priority.best),
                to = %self.rate(best),
                probability = self.rows[best.get()].probability,
                "Best rate changed"
            );
        }
        self.priority = priority;
    }

    /// Whether `candidate`, slower than `current` right now, should still take
    /// over as best because `current` only looks better after a dip of the
    /// candidate.
    fn recovers_from_dip(&self, candidate: RowIndex, candidate_tp: u32, current: RowIndex) -> bool {
        let stats = &self.rows[candidate.get()];
        if stats.max_throughput < self.rows[current.get()].max_throughput
            || stats.probability < RECOVERY_PROBABILITY
        {
            return false;
        }
        // most recently seen reliable row that is at least as fast
        let reference = (0..candidate.get()).rev().find(|&index| {
            let other = &self.rows[index];
            if other.evidence == 0 || other.probability < DIP_REFERENCE_PROBABILITY {
                return false;
            }
            let rate = self.rate(RowIndex::new(index));
            space::validate(&rate)
                && throughput::estimated_bps(&rate, other.probability) >= candidate_tp
        });
        reference.map_or(true, |index| stats.probability > self.rows[index].probability)
    }

    fn step_down_row(&self, row: RowIndex) -> Option<RowIndex> {
        space::step_down(&self.caps, &self.rate(row)).map(|rate| rate.row())
    }

    fn theoretical_bps(&self, row: RowIndex) -> u64 {
        u64::from(throughput::theoretical_bps(&self.rate(row).phy()))
    }
}

impl<S: RowSampler> RateTable<S> {
    /// Candidate rows for the next frame of `frame_size` bytes.
    ///
    /// Only lookaround bookkeeping changes; statistics rows are untouched.
    pub fn select_rates(&mut self, frame_size: usize) -> Candidates {
        let mut candidates = Candidates::new(frame_size);
        if let Some(fixed) = self.fixed_rate {
            candidates.best_slot = candidates.push(fixed.row(), 1);
            return candidates;
        }

        let limit = self.caps.max_rates();
        let p = self.priority;
        let mut ordered = ArrayVec::<RowIndex, MAX_CHAIN_LEN>::new();
        match limit {
            1 => ordered.push(p.best),
            2 => ordered.extend([p.best, p.best_probability]),
            3 => ordered.extend([p.best, p.second, p.best_probability]),
            _ => ordered.extend([p.best, p.second, p.best_probability, p.baseline]),
        }

        match self.lookaround_probe() {
            Some((row, Placement::Primary)) => {
                candidates.lookaround_slot = candidates.push(row, limit);
            }
            Some((row, Placement::Secondary)) => {
                candidates.push(p.best, limit);
                candidates.lookaround_slot = candidates.push(row, limit);
            }
            None => {}
        }
        for row in ordered {
            candidates.push(row, limit);
        }
        candidates.best_slot = candidates.slots.iter().position(|r| *r == p.best);

        tracing::trace!(
            rows = ?candidates.rows(),
            lookaround = ?candidates.lookaround_slot,
            frame_size,
            "Selected candidates"
        );
        candidates
    }

    /// Lookaround row for this selection and where it goes, when one is due.
    fn lookaround_probe(&mut self) -> Option<(RowIndex, Placement)> {
        // nothing is explored until the link has delivered at least once
        if !self.initialized {
            return None;
        }
        let period = self.mode.lookaround_period(&self.config);
        if !self.lookaround.tick(period, self.config.lookaround_idle_cycles) {
            return None;
        }

        let best = self.priority.best;
        let row = match self.lookaround.committed(&self.config).filter(|row| *row != best) {
            Some(row) => row,
            None => {
                let Some(row) = self.draw_lookaround(best) else {
                    self.lookaround.idle_cycles = 0;
                    return None;
                };
                self.lookaround.commit(row);
                tracing::debug!(
                    candidate = %self.rate(row),
                    best = %self.rate(best),
                    mode = %self.mode,
                    "Lookaround candidate drawn"
                );
                row
            }
        };

        let forced_probe_period = self.config.forced_probe_period;
        let secondary = self.theoretical_bps(best) > self.theoretical_bps(row)
            && self.rows[best.get()].probability > SECONDARY_PLACEMENT_PROBABILITY
            && self.rows[row.get()].evidence == 0
            && !self.lookaround.forced_probe_due(forced_probe_period);
        if secondary && self.caps.max_rates() < 2 {
            // no slot behind best to carry the probe
            return None;
        }
        self.lookaround.record_use(forced_probe_period);
        let placement = if secondary {
            Placement::Secondary
        } else {
            Placement::Primary
        };
        Some((row, placement))
    }

    /// Draw a valid non-best row, preferring ones close to best.
    fn draw_lookaround(&mut self, best: RowIndex) -> Option<RowIndex> {
        let row_count = self.rows.len();
        if row_count < 2 {
            return None;
        }
        let best_rate = self.rate(best);
        let max_rejections = self.config.lookaround_max_rejections;

        for draw in 0..=max_rejections {
            let row = RowIndex::new(self.sampler.sample_row(row_count));
            if row == best {
                continue;
            }
            let rate = self.rate(row);
            if !space::validate(&rate) {
                continue;
            }
            if draw == max_rejections || self.within_lookaround_window(&best_rate, &rate) {
                return Some(row);
            }
        }

        let start = self.sampler.sample_row(row_count);
        (0..row_count)
            .map(|offset| RowIndex::new((start + offset) % row_count))
            .find(|row| *row != best && space::validate(&self.rate(*row)))
    }

    /// Within 33 % of best's nominal rate and at most one MCS step above it.
    fn within_lookaround_window(&self, best: &Rate, candidate: &Rate) -> bool {
        let best_bps = u64::from(throughput::theoretical_bps(&best.phy()));
        let bps = u64::from(throughput::theoretical_bps(&candidate.phy()));
        let low = best_bps * (u64::from(PERCENT) - LOOKAROUND_THROUGHPUT_WINDOW_PCT);
        let high = best_bps * (u64::from(PERCENT) + LOOKAROUND_THROUGHPUT_WINDOW_PCT);
        let scaled = bps * u64::from(PERCENT);
        (low..=high).contains(&scaled) && candidate.mcs().rank() <= best.mcs().rank() + 1
    }
}
