//! Feedback-driven link-rate control for 802.11ah (S1G) stations.
//!
//! For every outgoing frame the controller picks the PHY parameters (MCS,
//! bandwidth, spatial streams, guard interval) and how many attempts to make at
//! each, using nothing but the station's own delivery history.
//!
//! ```text
//! transmit path  ──► RateTable::select_rates ──► build_chain ──► RetryChain
//! status path    ──► RateTable::feedback / feedback_agg ──► StatsRow counters
//! ~100 ms timer  ──► RateTable::periodic_update ──► priority rows + stability mode
//! ```

/// Rate-control configuration and logging setup.
pub mod config;

/// Rate-control decision core: statistics, selection, scheduling and feedback.
pub mod control;

mod error;

/// Logging infrastructure.
#[cfg(feature = "trace")]
mod logging;

/// PHY rate descriptors, the dense row enumeration and the airtime model.
pub mod rate;

pub use config::RateControlConfig;
pub use control::{
    station_rng, Candidates, RateTable, RateTableStats, RetryChain, RowSampler, RowStats,
    StabilityMode, Station, StatsRow,
};
pub use error::RateControlError;
pub use rate::{
    Attempts, Bandwidth, Capabilities, CapabilitiesBuilder, GuardInterval, Mcs, PhyParams, Rate,
    RateFlags, RowIndex, SpatialStreams,
};
