//! Per-station statistics table.

use rand::{rngs::SmallRng, SeedableRng};

use super::rng::RowSampler;
use super::selector::Priority;
use super::state::{Lookaround, StabilityMode};
use crate::config::RateControlConfig;
use crate::error::{RateControlError, Result};
use crate::rate::{space, throughput, Capabilities, PhyParams, Rate, RowIndex};

/// Delivery statistics of one rate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsRow {
    /// Attempts made at this rate in the current cycle.
    pub(crate) sent: u32,
    /// Successful attempts in the current cycle.
    pub(crate) sent_success: u32,
    pub(crate) total_sent: u64,
    pub(crate) total_success: u64,
    /// Block-ack MPDU outcomes reported for this rate in the current cycle.
    pub(crate) back_mpdu_success: u32,
    pub(crate) back_mpdu_failure: u32,
    /// Aggregate feedback arrived for this rate in the current cycle.
    pub(crate) has_ampdu_feedback: bool,
    pub(crate) evidence: u8,
    pub(crate) probability: u8,
    pub(crate) throughput: u32,
    pub(crate) max_throughput: u32,
}

impl StatsRow {
    /// Smoothed recent usage, 0-100.
    pub fn evidence(&self) -> u8 {
        self.evidence
    }

    /// Smoothed delivery probability in percent.
    pub fn probability(&self) -> u8 {
        self.probability
    }

    /// Estimated goodput after the last update, bits/s.
    pub fn throughput(&self) -> u32 {
        self.throughput
    }

    /// Highest estimated goodput ever observed, bits/s.
    pub fn max_throughput(&self) -> u32 {
        self.max_throughput
    }

    pub fn total_sent(&self) -> u64 {
        self.total_sent
    }

    pub fn total_success(&self) -> u64 {
        self.total_success
    }

    /// Attempts accumulated since the last periodic update.
    pub fn cycle_sent(&self) -> u32 {
        self.sent
    }

    pub fn cycle_success(&self) -> u32 {
        self.sent_success
    }
}

/// Rate-control state of one station.
///
/// The transmit path calls [`select_rates`](Self::select_rates) and
/// [`build_chain`](Self::build_chain); the status path calls
/// [`feedback`](Self::feedback) or [`feedback_agg`](Self::feedback_agg); a
/// timer calls [`periodic_update`](Self::periodic_update) roughly every
/// 100 ms. None of these allocate.
pub struct RateTable<S = SmallRng> {
    pub(crate) caps: Capabilities,
    pub(crate) config: RateControlConfig,
    pub(crate) rows: Vec<StatsRow>,
    pub(crate) priority: Priority,
    pub(crate) lowest: RowIndex,
    pub(crate) mode: StabilityMode,
    pub(crate) stability: u16,
    pub(crate) lookaround: Lookaround,
    pub(crate) fixed_rate: Option<Rate>,
    pub(crate) initialized: bool,
    pub(crate) update_cycles: u64,
    pub(crate) sampler: S,
}

impl RateTable<SmallRng> {
    /// Table seeded from the operating system's entropy source.
    pub fn new(caps: Capabilities, config: RateControlConfig) -> Result<Self> {
        Self::with_sampler(caps, config, SmallRng::from_os_rng())
    }

    /// Table with a reproducible lookaround sequence.
    pub fn seeded(caps: Capabilities, config: RateControlConfig, seed: u64) -> Result<Self> {
        Self::with_sampler(caps, config, SmallRng::seed_from_u64(seed))
    }
}

impl<S: RowSampler> RateTable<S> {
    pub fn with_sampler(caps: Capabilities, config: RateControlConfig, sampler: S) -> Result<Self> {
        config.validate()?;
        let lowest = space::lowest_row(&caps).ok_or(RateControlError::NoValidRate)?;
        let row_count = space::row_count(&caps);

        let mut rows = Vec::new();
        rows.try_reserve_exact(row_count)
            .map_err(|source| RateControlError::AllocationFailed {
                rows: row_count,
                source,
            })?;
        rows.resize_with(row_count, StatsRow::default);

        tracing::debug!(
            rows = row_count,
            lowest = %space::decode(&caps, lowest.get()),
            max_rates = caps.max_rates(),
            "Created rate table"
        );

        Ok(Self {
            caps,
            config,
            rows,
            priority: Priority::all(lowest),
            lowest,
            mode: StabilityMode::Init,
            stability: 0,
            lookaround: Lookaround::default(),
            fixed_rate: None,
            initialized: false,
            update_cycles: 0,
            sampler,
        })
    }

    /// Pin every chain to `phy`, or return to adaptive selection with `None`.
    ///
    /// Statistics keep being collected while a fixed rate is set.
    pub fn set_fixed_rate(&mut self, phy: Option<PhyParams>) -> Result<()> {
        let Some(phy) = phy else {
            if self.fixed_rate.take().is_some() {
                tracing::info!("Fixed rate cleared");
            }
            return Ok(());
        };
        if !self.caps.supports(&phy) || !space::validate_phy(&phy) {
            return Err(RateControlError::UnsupportedRate(phy));
        }
        let row = space::encode_phy(&self.caps, &phy)
            .ok_or(RateControlError::UnsupportedRate(phy))?;
        let rate = self.rate(row);
        if !space::validate(&rate) {
            return Err(RateControlError::UnsupportedRate(phy));
        }
        tracing::info!(rate = %rate, "Fixed rate set");
        self.fixed_rate = Some(rate);
        Ok(())
    }
}

impl<S> RateTable<S> {
    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn config(&self) -> &RateControlConfig {
        &self.config
    }

    pub fn mode(&self) -> StabilityMode {
        self.mode
    }

    pub fn stability(&self) -> u16 {
        self.stability
    }

    /// Whether any transmission has been acknowledged yet.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn fixed_rate(&self) -> Option<Rate> {
        self.fixed_rate
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn update_cycles(&self) -> u64 {
        self.update_cycles
    }

    /// Decoded rate of `row`.
    pub fn rate(&self, row: RowIndex) -> Rate {
        space::decode(&self.caps, row.get())
    }

    pub fn stats(&self, row: RowIndex) -> &StatsRow {
        &self.rows[row.get()]
    }

    /// Every row with its statistics, in row order.
    pub fn rows(&self) -> impl Iterator<Item = (Rate, &StatsRow)> + '_ {
        self.rows
            .iter()
            .enumerate()
            .map(|(index, stats)| (space::decode(&self.caps, index), stats))
    }

    pub fn best(&self) -> Rate {
        self.rate(self.priority.best)
    }

    pub fn second(&self) -> Rate {
        self.rate(self.priority.second)
    }

    pub fn best_probability(&self) -> Rate {
        self.rate(self.priority.best_probability)
    }

    pub fn baseline(&self) -> Rate {
        self.rate(self.priority.baseline)
    }

    /// Current estimated goodput of `row`, bits/s.
    pub fn estimated_bps(&self, row: RowIndex) -> u32 {
        throughput::estimated_bps(&self.rate(row), self.rows[row.get()].probability)
    }

    pub(crate) fn row_mut(&mut self, row: RowIndex) -> &mut StatsRow {
        debug_assert!(row.get() < self.rows.len(), "row {row} out of range");
        &mut self.rows[row.get()]
    }
}

impl<S> std::fmt::Debug for RateTable<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateTable")
            .field("rows", &self.rows.len())
            .field("mode", &self.mode)
            .field("stability", &self.stability)
            .field("best", &self.priority.best)
            .field("fixed_rate", &self.fixed_rate)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate::{Bandwidth, GuardInterval, Mcs, SpatialStreams};

    fn caps() -> Capabilities {
        Capabilities::builder()
            .mcs_up_to(Mcs::Mcs7)
            .bandwidths([Bandwidth::Mhz1, Bandwidth::Mhz2, Bandwidth::Mhz4])
            .guards(GuardInterval::ALL)
            .short_guard_at([Bandwidth::Mhz2, Bandwidth::Mhz4])
            .build()
            .unwrap()
    }

    #[test]
    fn test_new_table_is_sized_and_fresh() {
        let table = RateTable::seeded(caps(), RateControlConfig::default(), 1).unwrap();
        assert_eq!(table.row_count(), 8 * 3 * 2);
        assert_eq!(table.mode(), StabilityMode::Init);
        assert!(!table.is_initialized());
        assert!(table.rows().all(|(_, stats)| *stats == StatsRow::default()));
        let best = table.best();
        assert_eq!(best.mcs(), Mcs::Mcs0);
        assert_eq!(best.bandwidth(), Bandwidth::Mhz1);
        assert_eq!(best.guard(), GuardInterval::Long);
        assert_eq!(table.second(), best);
        assert_eq!(table.baseline(), best);
    }

    #[test]
    fn test_no_valid_rate() {
        let caps = Capabilities::builder()
            .mcs([Mcs::Mcs9])
            .bandwidths([Bandwidth::Mhz2])
            .build()
            .unwrap();
        let err = RateTable::seeded(caps, RateControlConfig::default(), 1).unwrap_err();
        assert!(matches!(err, RateControlError::NoValidRate));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RateControlConfig {
            forced_probe_period: 0,
            ..RateControlConfig::default()
        };
        let err = RateTable::seeded(caps(), config, 1).unwrap_err();
        assert!(matches!(err, RateControlError::Config(_)));
    }

    #[test]
    fn test_fixed_rate_validation() {
        let mut table = RateTable::seeded(caps(), RateControlConfig::default(), 1).unwrap();
        let good = PhyParams::new(
            Mcs::Mcs5,
            Bandwidth::Mhz4,
            SpatialStreams::One,
            GuardInterval::Short,
        );
        table.set_fixed_rate(Some(good)).unwrap();
        assert_eq!(table.fixed_rate().map(|r| r.phy()), Some(good));

        let unsupported = PhyParams::new(
            Mcs::Mcs9,
            Bandwidth::Mhz4,
            SpatialStreams::One,
            GuardInterval::Long,
        );
        assert!(matches!(
            table.set_fixed_rate(Some(unsupported)),
            Err(RateControlError::UnsupportedRate(_))
        ));
        let short_at_1mhz = PhyParams::new(
            Mcs::Mcs0,
            Bandwidth::Mhz1,
            SpatialStreams::One,
            GuardInterval::Short,
        );
        assert!(table.set_fixed_rate(Some(short_at_1mhz)).is_err());
        // a rejected request leaves the previous override in place
        assert_eq!(table.fixed_rate().map(|r| r.phy()), Some(good));

        table.set_fixed_rate(None).unwrap();
        assert_eq!(table.fixed_rate(), None);
    }

    #[test]
    fn test_rows_iterates_in_row_order() {
        let table = RateTable::seeded(caps(), RateControlConfig::default(), 1).unwrap();
        for (index, (rate, _)) in table.rows().enumerate() {
            assert_eq!(rate.row().get(), index);
        }
    }
}
