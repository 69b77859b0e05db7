//! Transmit-status accounting and the periodic statistics update.

use super::scheduler::RetryChain;
use super::state::StabilityMode;
use super::table::{RateTable, StatsRow};
use crate::config::{
    EVIDENCE_SCALE, EWMA_HISTORY_WEIGHT, MIN_AMPDU_SAMPLES, MIN_SAMPLES, MIN_SAMPLES_INIT, PERCENT,
};
use crate::rate::{space, throughput, Mcs, Rate, RowIndex};

impl<S> RateTable<S> {
    /// Account a single-MPDU transmission of `chain`.
    ///
    /// `attempts` is the total number of attempts the hardware made, spread
    /// over the chain in slot order; `acked` credits the last slot reached.
    pub fn feedback(&mut self, chain: &RetryChain, attempts: u32, acked: bool) {
        let Some(terminal) = self.charge_chain(chain, attempts, 1) else {
            return;
        };
        if acked {
            let stats = self.row_mut(terminal);
            stats.sent_success += 1;
            stats.total_success += 1;
            self.mark_initialized();
        }
    }

    /// Account an A-MPDU transmission of `chain` answered by a block ack
    /// covering `success` delivered and `failure` lost subframes.
    pub fn feedback_agg(&mut self, chain: &RetryChain, attempts: u32, success: u32, failure: u32) {
        let mpdus = success.saturating_add(failure);
        let Some(terminal) = self.charge_chain(chain, attempts, mpdus) else {
            return;
        };
        let stats = self.row_mut(terminal);
        stats.back_mpdu_success = stats.back_mpdu_success.saturating_add(success);
        stats.back_mpdu_failure = stats.back_mpdu_failure.saturating_add(failure);
        stats.has_ampdu_feedback = true;
        stats.sent_success = stats.sent_success.saturating_add(success);
        stats.total_success += u64::from(success);
        if success > 0 {
            self.mark_initialized();
        }
    }

    /// Spread `attempts` over the chain in order, charging `per_attempt`
    /// transmissions for each; returns the last row reached.
    fn charge_chain(
        &mut self,
        chain: &RetryChain,
        attempts: u32,
        per_attempt: u32,
    ) -> Option<RowIndex> {
        let mut remaining = attempts;
        let mut terminal = None;
        for rate in chain.rates() {
            if remaining == 0 {
                break;
            }
            let used = remaining.min(u32::from(rate.attempts().get()));
            remaining -= used;
            let charged = used.saturating_mul(per_attempt);
            let stats = self.row_mut(rate.row());
            stats.sent = stats.sent.saturating_add(charged);
            stats.total_sent += u64::from(charged);
            terminal = Some(rate.row());
        }
        if remaining > 0 {
            tracing::debug!(
                excess = remaining,
                chain = %chain,
                "Status reported more attempts than the chain carried"
            );
        }
        terminal
    }

    fn mark_initialized(&mut self) {
        if !self.initialized {
            self.initialized = true;
            tracing::debug!(best = %self.best(), "First delivery, rate table initialized");
        }
    }

    /// Fold the cycle's counters into the smoothed statistics, then re-rank
    /// rows and advance the stability state. Meant to run every ~100 ms.
    pub fn periodic_update(&mut self) {
        let min_samples = if self.mode == StabilityMode::Init {
            MIN_SAMPLES_INIT
        } else {
            MIN_SAMPLES
        };
        for index in 0..self.rows.len() {
            let rate = space::decode(&self.caps, index);
            update_row(&mut self.rows[index], &rate, min_samples);
        }

        let previous_best = self.priority.best;
        self.generate_priority();
        self.update_stability(previous_best);
        self.lookaround.end_cycle();
        self.update_cycles += 1;
    }

    fn update_stability(&mut self, previous_best: RowIndex) {
        let config = &self.config;
        let best = self.rate(self.priority.best);
        let second_lowest = {
            let mut ranks = self.caps.mcs_by_rank().map(Mcs::rank);
            let lowest = ranks.next().unwrap_or(0);
            ranks.next().unwrap_or(lowest)
        };

        if best.mcs().rank() <= second_lowest {
            self.stability = 0;
        } else if self.priority.best == previous_best {
            self.stability = (self.stability + 1).min(config.stability_ceiling);
        } else {
            self.stability = self.stability.saturating_sub(config.stability_decay);
        }

        let next = match self.mode {
            StabilityMode::Init if self.stability > config.init_exit_threshold => {
                StabilityMode::Normal
            }
            StabilityMode::Normal if self.stability > config.stable_entry_threshold => {
                StabilityMode::Stable
            }
            StabilityMode::Stable if self.stability < config.stable_entry_threshold => {
                self.stability = 0;
                StabilityMode::Normal
            }
            mode => mode,
        };
        if next != self.mode {
            tracing::debug!(
                from = %self.mode,
                to = %next,
                stability = self.stability,
                best = %best,
                "Stability mode changed"
            );
            self.mode = next;
        }

        if self.mode != StabilityMode::Init
            && best.bandwidth() == self.caps.narrowest_bandwidth()
            && best.mcs().rank() <= Mcs::Mcs0.rank()
        {
            tracing::warn!(
                from = %self.mode,
                best = %best,
                "Link collapsed to the most robust rate, resetting to init"
            );
            self.enter_init();
        }
    }

    pub(crate) fn enter_init(&mut self) {
        self.mode = StabilityMode::Init;
        self.stability = 0;
        self.lookaround.reset();
    }
}

/// EWMA update of one row's evidence and probability, then per-cycle reset.
fn update_row(stats: &mut StatsRow, rate: &Rate, min_samples: u32) {
    let percent = u64::from(PERCENT);
    let sent = u64::from(stats.sent);
    let evidence = u64::from(stats.evidence);
    let scaled_sent = sent * u64::from(EVIDENCE_SCALE);

    let denominator = scaled_sent + evidence;
    let scale = if denominator == 0 {
        percent
    } else {
        (2 * evidence * percent / denominator).min(percent)
    };
    let weight = scale * u64::from(EWMA_HISTORY_WEIGHT) / percent;
    let new_evidence = (scaled_sent * (percent - weight) + evidence * weight) / percent;

    let back_total = u64::from(stats.back_mpdu_success) + u64::from(stats.back_mpdu_failure);
    let sample = if stats.has_ampdu_feedback && back_total >= u64::from(MIN_AMPDU_SAMPLES) {
        Some(u64::from(stats.back_mpdu_success) * percent / back_total)
    } else if sent >= u64::from(min_samples) {
        Some(u64::from(stats.sent_success) * percent / sent)
    } else {
        None
    };
    if let Some(sample) = sample {
        let sample = sample.min(percent);
        let probability =
            (sample * (percent - weight) + u64::from(stats.probability) * weight) / percent;
        stats.probability = probability.min(percent) as u8;
    }
    stats.evidence = new_evidence.min(percent) as u8;

    stats.sent = 0;
    stats.sent_success = 0;
    stats.back_mpdu_success = 0;
    stats.back_mpdu_failure = 0;
    stats.has_ampdu_feedback = false;

    stats.throughput = throughput::estimated_bps(rate, stats.probability);
    stats.max_throughput = stats.max_throughput.max(stats.throughput);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate::{Bandwidth, Capabilities, GuardInterval, PhyParams, SpatialStreams};

    fn lowest_rate() -> Rate {
        let caps = Capabilities::builder()
            .mcs_up_to(Mcs::Mcs3)
            .bandwidths([Bandwidth::Mhz1])
            .build()
            .unwrap();
        let phy = PhyParams::new(
            Mcs::Mcs0,
            Bandwidth::Mhz1,
            SpatialStreams::One,
            GuardInterval::Long,
        );
        space::decode(&caps, space::encode_phy(&caps, &phy).unwrap().get())
    }

    #[test]
    fn test_first_sample_replaces_probability() {
        let mut stats = StatsRow {
            sent: 4,
            sent_success: 3,
            ..StatsRow::default()
        };
        update_row(&mut stats, &lowest_rate(), MIN_SAMPLES);
        assert_eq!(stats.probability, 75);
        // no history: weight 0, evidence takes the scaled count
        assert_eq!(stats.evidence, 40);
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.throughput, 3_000 * 75);
        assert_eq!(stats.max_throughput, stats.throughput);
    }

    #[test]
    fn test_evidence_decays_when_idle() {
        let mut stats = StatsRow {
            evidence: 100,
            probability: 90,
            ..StatsRow::default()
        };
        let rate = lowest_rate();
        update_row(&mut stats, &rate, MIN_SAMPLES);
        assert_eq!(stats.evidence, 75);
        assert_eq!(stats.probability, 90);
        for _ in 0..30 {
            update_row(&mut stats, &rate, MIN_SAMPLES);
        }
        assert_eq!(stats.evidence, 0);
        assert_eq!(stats.probability, 90);
    }

    #[test]
    fn test_min_samples_gate() {
        let mut stats = StatsRow {
            sent: 2,
            sent_success: 0,
            evidence: 50,
            probability: 80,
            ..StatsRow::default()
        };
        update_row(&mut stats, &lowest_rate(), MIN_SAMPLES);
        assert_eq!(stats.probability, 80);

        let mut stats = StatsRow {
            sent: 1,
            sent_success: 0,
            probability: 80,
            ..StatsRow::default()
        };
        update_row(&mut stats, &lowest_rate(), MIN_SAMPLES_INIT);
        assert_eq!(stats.probability, 0);
    }

    #[test]
    fn test_block_ack_counts_preferred() {
        let mut stats = StatsRow {
            sent: 40,
            sent_success: 9,
            back_mpdu_success: 9,
            back_mpdu_failure: 1,
            has_ampdu_feedback: true,
            ..StatsRow::default()
        };
        update_row(&mut stats, &lowest_rate(), MIN_SAMPLES);
        assert_eq!(stats.probability, 90);
        assert!(!stats.has_ampdu_feedback);
        assert_eq!(stats.back_mpdu_success, 0);
    }

    #[test]
    fn test_too_few_block_acks_fall_back_to_attempts() {
        let mut stats = StatsRow {
            sent: 6,
            sent_success: 3,
            back_mpdu_success: 3,
            back_mpdu_failure: 0,
            has_ampdu_feedback: true,
            ..StatsRow::default()
        };
        update_row(&mut stats, &lowest_rate(), MIN_SAMPLES);
        assert_eq!(stats.probability, 50);
    }

    #[test]
    fn test_single_failure_cycle_is_smoothed() {
        let mut stats = StatsRow {
            evidence: 100,
            probability: 100,
            ..StatsRow::default()
        };
        stats.sent = 4;
        update_row(&mut stats, &lowest_rate(), MIN_SAMPLES);
        // weight stays at 75 % history
        assert_eq!(stats.probability, 75);
    }
}
