//! Stability modes and lookaround bookkeeping.

use std::fmt;

use crate::config::RateControlConfig;
use crate::rate::RowIndex;

/// How settled a station's best rate is.
///
/// ## Transitions
///
/// ```text
/// ┌────────────────┐
/// │      Init      │  lookaround every 5 selections
/// └───────┬────────┘
///         │ (stability > 20)
///         ▼
/// ┌────────────────┐
/// │     Normal     │  lookaround every 50 selections
/// └───────┬────────┘
///         │ (stability > 50)         ▲
///         ▼                          │ (stability < 50, counter reset)
/// ┌────────────────┐                 │
/// │     Stable     │ ────────────────┘
/// └────────────────┘  lookaround every 100 selections
///
/// best at the narrowest bandwidth and MCS0 or below, from any mode → Init
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum StabilityMode {
    /// Fresh or recovering station; explores aggressively and accepts single samples.
    #[default]
    Init = 0,
    /// Best rate has held for a while.
    Normal = 1,
    /// Best rate has held long enough that exploration is rare.
    Stable = 2,
}

impl StabilityMode {
    /// Selections between two lookarounds in this mode.
    pub(crate) fn lookaround_period(self, config: &RateControlConfig) -> u32 {
        match self {
            Self::Init => config.lookaround_period_init,
            Self::Normal => config.lookaround_period_normal,
            Self::Stable => config.lookaround_period_stable,
        }
    }
}

impl fmt::Display for StabilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Normal => "normal",
            Self::Stable => "stable",
        };
        f.write_str(name)
    }
}

/// Exploration state carried between selections.
///
/// None of these counters feed back into [`StatsRow`](super::StatsRow)s.
#[derive(Debug, Clone, Default)]
pub(crate) struct Lookaround {
    /// Selections since the last periodic lookaround.
    pub(crate) selections: u32,
    /// Update cycles since the last lookaround of any kind.
    pub(crate) idle_cycles: u32,
    /// Lookarounds since the forced-probe counter last fired.
    pub(crate) since_forced_probe: u32,
    /// Candidate being sampled, if any.
    pub(crate) candidate: Option<RowIndex>,
    /// Times the current candidate has been handed out.
    pub(crate) candidate_uses: u8,
    /// Update cycles since the current candidate was drawn.
    pub(crate) candidate_cycles: u8,
    /// Lifetime number of lookarounds, for diagnostics.
    pub(crate) total: u64,
}

impl Lookaround {
    pub(crate) fn reset(&mut self) {
        let total = self.total;
        *self = Self {
            total,
            ..Self::default()
        };
    }

    /// Advance the per-selection counter; true when a periodic or overdue
    /// lookaround is due.
    pub(crate) fn tick(&mut self, period: u32, idle_limit: u32) -> bool {
        self.selections += 1;
        if self.selections >= period {
            self.selections = 0;
            return true;
        }
        self.idle_cycles >= idle_limit
    }

    /// The committed candidate while it still has uses left this window.
    pub(crate) fn committed(&self, config: &RateControlConfig) -> Option<RowIndex> {
        self.candidate.filter(|_| {
            self.candidate_uses < config.lookaround_commit_uses
                && self.candidate_cycles < config.lookaround_commit_cycles
        })
    }

    pub(crate) fn commit(&mut self, row: RowIndex) {
        self.candidate = Some(row);
        self.candidate_uses = 0;
        self.candidate_cycles = 0;
    }

    /// Whether the next recorded lookaround fires the forced-probe counter.
    pub(crate) fn forced_probe_due(&self, forced_probe_period: u32) -> bool {
        self.since_forced_probe + 1 >= forced_probe_period
    }

    /// Record one lookaround; true when the forced-probe counter fires.
    pub(crate) fn record_use(&mut self, forced_probe_period: u32) -> bool {
        self.candidate_uses = self.candidate_uses.saturating_add(1);
        self.idle_cycles = 0;
        self.total += 1;
        self.since_forced_probe += 1;
        if self.since_forced_probe >= forced_probe_period {
            self.since_forced_probe = 0;
            return true;
        }
        false
    }

    pub(crate) fn end_cycle(&mut self) {
        self.idle_cycles = self.idle_cycles.saturating_add(1);
        self.candidate_cycles = self.candidate_cycles.saturating_add(1);
    }
}
