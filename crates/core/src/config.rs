//! Rate-control tunables and constants.
//!
//! Fixed-point constants that define the statistics model live here as
//! `pub(crate)` items. Knobs that deployments legitimately retune (airtime
//! budget, lookaround cadence, stability thresholds) are fields of
//! [`RateControlConfig`], which can be loaded from TOML.

use serde::{Deserialize, Serialize};

use crate::error::{RateControlError, Result};

// =============================================================================
// Statistics model
// =============================================================================

/// Scale applied to a cycle's attempt count when folding it into evidence.
pub(crate) const EVIDENCE_SCALE: u32 = 10;

/// Upper bound of the evidence and probability scales.
pub(crate) const PERCENT: u32 = 100;

/// Share of the previous value kept by the evidence/probability EWMA, in percent.
pub(crate) const EWMA_HISTORY_WEIGHT: u32 = 75;

/// Below this probability a row's estimated throughput is reported as zero.
pub(crate) const PROBABILITY_FLOOR: u8 = 10;

/// Attempts per cycle a row needs before its probability is recomputed.
pub(crate) const MIN_SAMPLES: u32 = 3;

/// Same as [`MIN_SAMPLES`] while the station is still in `Init`.
pub(crate) const MIN_SAMPLES_INIT: u32 = 1;

/// Block-ack MPDU reports per cycle needed to prefer them over raw attempts.
pub(crate) const MIN_AMPDU_SAMPLES: u32 = 4;

// =============================================================================
// Selection thresholds
// =============================================================================

/// A slower row may reclaim "best" only once it is at least this reliable.
pub(crate) const RECOVERY_PROBABILITY: u8 = 40;

/// Rows at or above this probability count as reference points for dip recovery.
pub(crate) const DIP_REFERENCE_PROBABILITY: u8 = 20;

/// Rows below this probability get no phase-2 attempts.
pub(crate) const PHASE2_MIN_PROBABILITY: u8 = 20;

/// Best must be above this probability for a probe to go in the secondary slot.
pub(crate) const SECONDARY_PLACEMENT_PROBABILITY: u8 = 96;

/// Lookaround candidates must be within this percentage of best's theoretical rate.
pub(crate) const LOOKAROUND_THROUGHPUT_WINDOW_PCT: u64 = 33;

/// Default attempts granted per rate during phase 2.
pub(crate) const DEFAULT_MAX_ATTEMPTS_PER_RATE: u8 = 2;

/// Longest retry chain the hardware descriptor can carry.
pub const MAX_CHAIN_LEN: usize = 4;

// =============================================================================
// Defaults for RateControlConfig
// =============================================================================

const DEFAULT_AIRTIME_BUDGET_US: u32 = 24_000;
const DEFAULT_ATTEMPT_WINDOW_US: u32 = 4_000;
const DEFAULT_LOOKAROUND_PERIOD_INIT: u32 = 5;
const DEFAULT_LOOKAROUND_PERIOD_NORMAL: u32 = 50;
const DEFAULT_LOOKAROUND_PERIOD_STABLE: u32 = 100;
const DEFAULT_LOOKAROUND_IDLE_CYCLES: u32 = 5;
const DEFAULT_LOOKAROUND_MAX_REJECTIONS: u32 = 10;
const DEFAULT_LOOKAROUND_COMMIT_USES: u8 = 4;
const DEFAULT_LOOKAROUND_COMMIT_CYCLES: u8 = 2;
const DEFAULT_FORCED_PROBE_PERIOD: u32 = 50;
const DEFAULT_INIT_EXIT_THRESHOLD: u16 = 20;
const DEFAULT_STABLE_ENTRY_THRESHOLD: u16 = 50;
const DEFAULT_STABILITY_CEILING: u16 = 100;
const DEFAULT_STABILITY_DECAY: u16 = 10;

/// Per-station rate-control tunables.
///
/// Every field has a default, so a TOML document only needs the keys it
/// overrides:
///
/// ```toml
/// airtime-budget-us = 20000
/// lookaround-period-stable = 200
/// rts-threshold = 1500
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RateControlConfig {
    /// Total airtime a retry chain may consume, in microseconds.
    #[serde(default = "default_airtime_budget_us")]
    pub airtime_budget_us: u32,

    /// A rate whose single attempt exceeds this window gets only one attempt.
    #[serde(default = "default_attempt_window_us")]
    pub attempt_window_us: u32,

    /// Selections between lookarounds while in `Init`.
    #[serde(default = "default_lookaround_period_init")]
    pub lookaround_period_init: u32,

    /// Selections between lookarounds while in `Normal`.
    #[serde(default = "default_lookaround_period_normal")]
    pub lookaround_period_normal: u32,

    /// Selections between lookarounds while in `Stable`.
    #[serde(default = "default_lookaround_period_stable")]
    pub lookaround_period_stable: u32,

    /// Update cycles without a lookaround after which one is forced.
    #[serde(default = "default_lookaround_idle_cycles")]
    pub lookaround_idle_cycles: u32,

    /// Draws rejected by the throughput window before any valid row is accepted.
    #[serde(default = "default_lookaround_max_rejections")]
    pub lookaround_max_rejections: u32,

    /// Lookarounds that reuse one candidate before a new draw.
    #[serde(default = "default_lookaround_commit_uses")]
    pub lookaround_commit_uses: u8,

    /// Update cycles a committed candidate survives.
    #[serde(default = "default_lookaround_commit_cycles")]
    pub lookaround_commit_cycles: u8,

    /// Every this many lookarounds the probe is forced into the primary slot.
    #[serde(default = "default_forced_probe_period")]
    pub forced_probe_period: u32,

    /// Stability count above which `Init` gives way to `Normal`.
    #[serde(default = "default_init_exit_threshold")]
    pub init_exit_threshold: u16,

    /// Stability count above which `Normal` becomes `Stable`; dropping below
    /// it while `Stable` falls back to `Normal`.
    #[serde(default = "default_stable_entry_threshold")]
    pub stable_entry_threshold: u16,

    /// Saturation point of the stability counter.
    #[serde(default = "default_stability_ceiling")]
    pub stability_ceiling: u16,

    /// Amount the stability counter loses when best changes.
    #[serde(default = "default_stability_decay")]
    pub stability_decay: u16,

    /// Frames longer than this many bytes also protect the primary slot with
    /// RTS/CTS. `None` never protects the primary slot.
    #[serde(default)]
    pub rts_threshold: Option<usize>,
}

fn default_airtime_budget_us() -> u32 {
    DEFAULT_AIRTIME_BUDGET_US
}

fn default_attempt_window_us() -> u32 {
    DEFAULT_ATTEMPT_WINDOW_US
}

fn default_lookaround_period_init() -> u32 {
    DEFAULT_LOOKAROUND_PERIOD_INIT
}

fn default_lookaround_period_normal() -> u32 {
    DEFAULT_LOOKAROUND_PERIOD_NORMAL
}

fn default_lookaround_period_stable() -> u32 {
    DEFAULT_LOOKAROUND_PERIOD_STABLE
}

fn default_lookaround_idle_cycles() -> u32 {
    DEFAULT_LOOKAROUND_IDLE_CYCLES
}

fn default_lookaround_max_rejections() -> u32 {
    DEFAULT_LOOKAROUND_MAX_REJECTIONS
}

fn default_lookaround_commit_uses() -> u8 {
    DEFAULT_LOOKAROUND_COMMIT_USES
}

fn default_lookaround_commit_cycles() -> u8 {
    DEFAULT_LOOKAROUND_COMMIT_CYCLES
}

fn default_forced_probe_period() -> u32 {
    DEFAULT_FORCED_PROBE_PERIOD
}

fn default_init_exit_threshold() -> u16 {
    DEFAULT_INIT_EXIT_THRESHOLD
}

fn default_stable_entry_threshold() -> u16 {
    DEFAULT_STABLE_ENTRY_THRESHOLD
}

fn default_stability_ceiling() -> u16 {
    DEFAULT_STABILITY_CEILING
}

fn default_stability_decay() -> u16 {
    DEFAULT_STABILITY_DECAY
}

impl Default for RateControlConfig {
    fn default() -> Self {
        Self {
            airtime_budget_us: DEFAULT_AIRTIME_BUDGET_US,
            attempt_window_us: DEFAULT_ATTEMPT_WINDOW_US,
            lookaround_period_init: DEFAULT_LOOKAROUND_PERIOD_INIT,
            lookaround_period_normal: DEFAULT_LOOKAROUND_PERIOD_NORMAL,
            lookaround_period_stable: DEFAULT_LOOKAROUND_PERIOD_STABLE,
            lookaround_idle_cycles: DEFAULT_LOOKAROUND_IDLE_CYCLES,
            lookaround_max_rejections: DEFAULT_LOOKAROUND_MAX_REJECTIONS,
            lookaround_commit_uses: DEFAULT_LOOKAROUND_COMMIT_USES,
            lookaround_commit_cycles: DEFAULT_LOOKAROUND_COMMIT_CYCLES,
            forced_probe_period: DEFAULT_FORCED_PROBE_PERIOD,
            init_exit_threshold: DEFAULT_INIT_EXIT_THRESHOLD,
            stable_entry_threshold: DEFAULT_STABLE_ENTRY_THRESHOLD,
            stability_ceiling: DEFAULT_STABILITY_CEILING,
            stability_decay: DEFAULT_STABILITY_DECAY,
            rts_threshold: None,
        }
    }
}

impl RateControlConfig {
    /// Parse a TOML document and validate the result.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(input).map_err(|e| RateControlError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(RateControlError::Config(msg.to_owned()));
        if self.airtime_budget_us == 0 {
            return fail("airtime-budget-us must be positive");
        }
        if self.attempt_window_us == 0 || self.attempt_window_us > self.airtime_budget_us {
            return fail("attempt-window-us must be positive and within the airtime budget");
        }
        if self.lookaround_period_init == 0
            || self.lookaround_period_normal == 0
            || self.lookaround_period_stable == 0
        {
            return fail("lookaround periods must be positive");
        }
        if self.lookaround_commit_uses == 0 || self.lookaround_commit_cycles == 0 {
            return fail("lookaround commit limits must be positive");
        }
        if self.forced_probe_period == 0 {
            return fail("forced-probe-period must be positive");
        }
        if self.init_exit_threshold >= self.stability_ceiling
            || self.stable_entry_threshold >= self.stability_ceiling
        {
            return fail("stability thresholds must sit below stability-ceiling");
        }
        Ok(())
    }
}

/// Install the global tracing subscriber once per process.
///
/// Later calls are no-ops, so tests and embedding binaries may call it freely.
pub fn set_logger(level: Option<tracing::level_filters::LevelFilter>) {
    #[cfg(feature = "trace")]
    {
        use std::sync::atomic::{AtomicBool, Ordering};

        static LOGGER_SET: AtomicBool = AtomicBool::new(false);
        if LOGGER_SET
            .compare_exchange(false, true, Ordering::Release, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        if let Err(error) = crate::logging::init_tracer(level) {
            eprintln!("failed tracing initialization: {error}");
        }
    }
    #[cfg(not(feature = "trace"))]
    let _ = level;
}
