//! Attempt allocation under an airtime budget.
//!
//! ```text
//! phase 1   every slot: 2 attempts (1 if a single attempt exceeds the window)
//! phase 2   reliable slots: + (remaining / max_rates) / airtime, clamped to [1, max]
//! finish    lookaround slot: exactly 1 (outside Init)
//!           best slot: at least 2
//!           tail trimmed until the chain fits the budget
//!           RTS/CTS on every slot after the first
//! ```

use std::fmt;

use arrayvec::ArrayVec;

use super::selector::Candidates;
use super::state::StabilityMode;
use super::table::RateTable;
use crate::config::{MAX_CHAIN_LEN, PHASE2_MIN_PROBABILITY};
use crate::rate::{throughput, Attempts, Rate};

/// Ordered rates to try for one frame, each with its attempt count and flags.
///
/// Lives entirely inline; building one never allocates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryChain {
    rates: ArrayVec<Rate, MAX_CHAIN_LEN>,
    airtime_us: u32,
    lookaround_slot: Option<usize>,
}

impl RetryChain {
    pub fn rates(&self) -> &[Rate] {
        &self.rates
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rate> {
        self.rates.iter()
    }

    pub fn total_attempts(&self) -> u32 {
        self.rates
            .iter()
            .map(|rate| u32::from(rate.attempts().get()))
            .sum()
    }

    /// Airtime of every attempt in the chain, reference payload, microseconds.
    pub fn airtime_us(&self) -> u32 {
        self.airtime_us
    }

    /// Slot carrying the lookaround rate, if this chain explores.
    pub fn lookaround_slot(&self) -> Option<usize> {
        self.lookaround_slot
    }
}

impl fmt::Display for RetryChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (slot, rate) in self.rates.iter().enumerate() {
            if slot > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{rate}")?;
        }
        Ok(())
    }
}

impl<S> RateTable<S> {
    /// Turn `candidates` into a retry chain that fits the airtime budget.
    pub fn build_chain(&self, candidates: &Candidates) -> RetryChain {
        let config = &self.config;
        let rows = candidates.rows();
        let slots = rows.len();
        if slots == 0 {
            return RetryChain::default();
        }

        let rates: ArrayVec<Rate, MAX_CHAIN_LEN> =
            rows.iter().map(|row| self.rate(*row)).collect();
        let cost: ArrayVec<u32, MAX_CHAIN_LEN> = rates
            .iter()
            .map(|rate| throughput::tx_time_us(&rate.phy()).max(1))
            .collect();
        let mut attempts = [0u32; MAX_CHAIN_LEN];
        let mut remaining = config.airtime_budget_us;

        for slot in 0..slots {
            let wanted = if cost[slot] > config.attempt_window_us { 1 } else { 2 };
            let granted = wanted.min(remaining / cost[slot]);
            attempts[slot] = granted;
            remaining -= granted * cost[slot];
        }

        // A lone rate has no fallback, so it always takes the extra attempts.
        let lone = slots == 1;
        let share = remaining / self.caps.max_rates() as u32;
        let max_extra = u32::from(self.caps.max_attempts_per_rate());
        let primary_excluded =
            self.estimated_bps(rows[0]) <= self.estimated_bps(self.priority.best_probability);
        for slot in 0..slots {
            if cost[slot] > config.attempt_window_us {
                continue;
            }
            if !lone
                && (self.rows[rows[slot].get()].probability < PHASE2_MIN_PROBABILITY
                    || (slot == 0 && primary_excluded))
            {
                continue;
            }
            let extra = (share / cost[slot])
                .clamp(1, max_extra)
                .min(remaining / cost[slot]);
            attempts[slot] += extra;
            remaining -= extra * cost[slot];
        }

        if self.mode != StabilityMode::Init {
            if let Some(slot) = candidates.lookaround_slot() {
                attempts[slot] = 1;
            }
        }
        // no floor when a probe displaced best from a lone slot
        if let Some(slot) = candidates.best_slot() {
            let floor = if cost[slot] > config.attempt_window_us { 1 } else { 2 };
            attempts[slot] = attempts[slot].max(floor);
        }
        let anchor = candidates.best_slot().unwrap_or(0);
        for slot in 0..slots {
            attempts[slot] = attempts[slot].min(u32::from(Attempts::MAX.get()));
        }

        let mut airtime: u32 = (0..slots).map(|slot| attempts[slot] * cost[slot]).sum();
        let mut slot = slots;
        while airtime > config.airtime_budget_us && slot > 0 {
            slot -= 1;
            let keep = u32::from(slot == anchor);
            while attempts[slot] > keep && airtime > config.airtime_budget_us {
                attempts[slot] -= 1;
                airtime -= cost[slot];
            }
        }

        let mut chain = RetryChain::default();
        for (slot, rate) in rates.into_iter().enumerate() {
            if attempts[slot] == 0 {
                continue;
            }
            if candidates.lookaround_slot() == Some(slot) {
                chain.lookaround_slot = Some(chain.rates.len());
            }
            let mut rate = rate.with_attempts(Attempts::saturating(attempts[slot]));
            let protect = if chain.rates.is_empty() {
                config
                    .rts_threshold
                    .is_some_and(|threshold| candidates.frame_size() > threshold)
            } else {
                true
            };
            rate.set_rts(protect);
            chain.rates.push(rate);
        }
        chain.airtime_us = airtime;

        tracing::trace!(chain = %chain, airtime_us = airtime, "Built retry chain");
        chain
    }
}
