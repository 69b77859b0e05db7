//! Lock-protected handle to one station's rate table.
//!
//! The transmit path and the status/timer paths run on different contexts;
//! every entry point takes the station's lock for the duration of a single
//! bounded, non-allocating operation.

use parking_lot::Mutex;
use rand::rngs::SmallRng;

use super::rng::RowSampler;
use super::scheduler::RetryChain;
use super::state::StabilityMode;
use super::stats::RateTableStats;
use super::table::RateTable;
use crate::config::RateControlConfig;
use crate::error::Result;
use crate::rate::{Capabilities, PhyParams, Rate};

/// Rate control for one associated station.
pub struct Station<S = SmallRng> {
    table: Mutex<RateTable<S>>,
}

impl Station<SmallRng> {
    pub fn new(caps: Capabilities, config: RateControlConfig) -> Result<Self> {
        Ok(Self::from_table(RateTable::new(caps, config)?))
    }

    pub fn seeded(caps: Capabilities, config: RateControlConfig, seed: u64) -> Result<Self> {
        Ok(Self::from_table(RateTable::seeded(caps, config, seed)?))
    }
}

impl<S: RowSampler> Station<S> {
    pub fn from_table(table: RateTable<S>) -> Self {
        Self {
            table: Mutex::new(table),
        }
    }

    /// Retry chain for the next frame of `frame_size` bytes.
    pub fn select(&self, frame_size: usize) -> RetryChain {
        let mut table = self.table.lock();
        let candidates = table.select_rates(frame_size);
        table.build_chain(&candidates)
    }

    /// Transmit status of a single-MPDU frame sent with `chain`.
    pub fn report(&self, chain: &RetryChain, attempts: u32, acked: bool) {
        self.table.lock().feedback(chain, attempts, acked);
    }

    /// Block-ack status of an A-MPDU sent with `chain`.
    pub fn report_aggregate(&self, chain: &RetryChain, attempts: u32, success: u32, failure: u32) {
        self.table
            .lock()
            .feedback_agg(chain, attempts, success, failure);
    }

    /// Periodic statistics update; call roughly every 100 ms.
    pub fn update(&self) {
        self.table.lock().periodic_update();
    }

    pub fn set_fixed_rate(&self, phy: Option<PhyParams>) -> Result<()> {
        self.table.lock().set_fixed_rate(phy)
    }

    pub fn best(&self) -> Rate {
        self.table.lock().best()
    }

    pub fn mode(&self) -> StabilityMode {
        self.table.lock().mode()
    }

    pub fn snapshot(&self) -> RateTableStats {
        self.table.lock().snapshot()
    }

    /// Run `f` against the table under the station lock.
    pub fn with_table<R>(&self, f: impl FnOnce(&RateTable<S>) -> R) -> R {
        f(&self.table.lock())
    }

    pub fn into_table(self) -> RateTable<S> {
        self.table.into_inner()
    }
}

impl<S> std::fmt::Debug for Station<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.table.try_lock() {
            Some(table) => f.debug_struct("Station").field("table", &*table).finish(),
            None => f.debug_struct("Station").finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::rate::{Bandwidth, Mcs};

    fn caps() -> Capabilities {
        Capabilities::builder()
            .mcs_up_to(Mcs::Mcs7)
            .bandwidths([Bandwidth::Mhz1, Bandwidth::Mhz2])
            .build()
            .unwrap()
    }

    #[test]
    fn test_station_round_trip() {
        let station = Station::seeded(caps(), RateControlConfig::default(), 11).unwrap();
        let chain = station.select(256);
        station.report(&chain, 1, true);
        station.update();
        let stats = station.snapshot();
        assert!(stats.initialized);
        assert_eq!(stats.update_cycles, 1);
        assert_eq!(stats.rows.len(), 1);
        assert_eq!(stats.rows[0].total_success, 1);
        assert_eq!(station.with_table(|t| t.row_count()), 8 * 2);
    }

    #[test]
    fn test_concurrent_paths() {
        let station = Arc::new(Station::seeded(caps(), RateControlConfig::default(), 3).unwrap());
        let tx = {
            let station = Arc::clone(&station);
            std::thread::spawn(move || {
                for _ in 0..500 {
                    let chain = station.select(512);
                    station.report(&chain, 1, true);
                }
            })
        };
        let timer = {
            let station = Arc::clone(&station);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    station.update();
                }
            })
        };
        tx.join().unwrap();
        timer.join().unwrap();
        let stats = station.snapshot();
        assert_eq!(stats.update_cycles, 50);
        assert_eq!(stats.rows.iter().map(|r| r.total_success).sum::<u64>(), 500);
    }
}
