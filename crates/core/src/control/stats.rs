//! Rate-table snapshots for diagnostics.
//!
//! A snapshot is taken off the per-frame path and may allocate.

use std::fmt;

use super::state::StabilityMode;
use super::table::RateTable;
use crate::rate::Rate;

/// Statistics of one row that has carried traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowStats {
    pub rate: Rate,
    /// Smoothed recent usage (0-100).
    pub evidence: u8,
    /// Smoothed delivery probability (percent).
    pub probability: u8,
    /// Estimated goodput (bits/sec).
    pub throughput: u32,
    /// Highest estimated goodput seen (bits/sec).
    pub max_throughput: u32,
    pub total_sent: u64,
    pub total_success: u64,
}

/// Snapshot of a station's rate-control state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateTableStats {
    pub mode: StabilityMode,
    pub stability: u16,
    pub initialized: bool,
    pub update_cycles: u64,
    /// Lookarounds handed out over the table's lifetime.
    pub lookarounds: u64,
    pub best: Rate,
    pub second: Rate,
    pub best_probability: Rate,
    pub baseline: Rate,
    pub fixed_rate: Option<Rate>,
    /// Rows with at least one transmission, in row order.
    pub rows: Vec<RowStats>,
}

impl<S> RateTable<S> {
    pub fn snapshot(&self) -> RateTableStats {
        let rows = self
            .rows()
            .filter(|(_, stats)| stats.total_sent() > 0)
            .map(|(rate, stats)| RowStats {
                rate,
                evidence: stats.evidence(),
                probability: stats.probability(),
                throughput: stats.throughput(),
                max_throughput: stats.max_throughput(),
                total_sent: stats.total_sent(),
                total_success: stats.total_success(),
            })
            .collect();

        RateTableStats {
            mode: self.mode,
            stability: self.stability,
            initialized: self.initialized,
            update_cycles: self.update_cycles,
            lookarounds: self.lookaround.total,
            best: self.best(),
            second: self.second(),
            best_probability: self.best_probability(),
            baseline: self.baseline(),
            fixed_rate: self.fixed_rate,
            rows,
        }
    }
}

impl fmt::Display for RateTableStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "RC[{}] stability={} cycles={} lookarounds={} initialized={}",
            self.mode, self.stability, self.update_cycles, self.lookarounds, self.initialized
        )?;
        if let Some(fixed) = self.fixed_rate {
            writeln!(f, "fixed: {fixed}")?;
        }
        writeln!(
            f,
            "best: {}  second: {}  best-prob: {}  baseline: {}",
            self.best, self.second, self.best_probability, self.baseline
        )?;
        writeln!(
            f,
            "{:>5} {:<20} {:>4} {:>5} {:>10} {:>10} {:>10} {:>10}",
            "row", "rate", "ev", "prob", "tp", "max tp", "sent", "success"
        )?;
        for row in &self.rows {
            let marker = if row.rate.row() == self.best.row() { "*" } else { " " };
            writeln!(
                f,
                "{marker}{:>4} {:<20} {:>4} {:>4}% {:>10} {:>10} {:>10} {:>10}",
                row.rate.row().get(),
                row.rate.phy().to_string(),
                row.evidence,
                row.probability,
                format_bps(row.throughput),
                format_bps(row.max_throughput),
                row.total_sent,
                row.total_success,
            )?;
        }
        Ok(())
    }
}

/// Format bits/sec in human-readable form.
fn format_bps(bps: u32) -> String {
    if bps >= 1_000_000 {
        format!("{:.1}Mb/s", f64::from(bps) / 1_000_000.0)
    } else if bps >= 1_000 {
        format!("{:.1}kb/s", f64::from(bps) / 1_000.0)
    } else {
        format!("{bps}b/s")
    }
}
