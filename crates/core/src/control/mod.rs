//! Per-station rate control.
//!
//! ## Data flow
//!
//! | Path | Entry point | Touches |
//! |------|-------------|---------|
//! | transmit | [`RateTable::select_rates`] + [`RateTable::build_chain`] | lookaround bookkeeping |
//! | tx status | [`RateTable::feedback`], [`RateTable::feedback_agg`] | per-cycle row counters |
//! | timer (~100 ms) | [`RateTable::periodic_update`] | smoothed stats, priority, mode |
//!
//! ## Statistics
//!
//! Each row keeps two smoothed values updated once per cycle with the same
//! weight:
//!
//! - **evidence** (0-100): how much the row has been used lately. Rows with no
//!   evidence are ignored when ranking.
//! - **probability** (0-100): delivery rate, only refreshed once the cycle
//!   holds enough samples.
//!
//! The history weight is 75 % while recent usage is small next to the
//! evidence already held, and shrinks as a cycle's attempt count dominates, so
//! busy rows adapt fast and idle ones keep their history.
//!
//! ## Exploration
//!
//! Every 5/50/100 selections (by stability mode), or after 5 cycles without
//! one, a lookaround row is spliced into the chain. Candidates near best's
//! nominal rate are preferred and one is reused for a few frames so that its
//! statistics become meaningful.

mod feedback;
mod rng;
mod scheduler;
mod selector;
mod state;
mod station;
mod stats;
mod table;


pub use rng::{station_rng, RowSampler};
pub use scheduler::RetryChain;
pub use selector::Candidates;
pub use state::StabilityMode;
pub use station::Station;
pub use stats::{RateTableStats, RowStats};
pub use table::{RateTable, StatsRow};
