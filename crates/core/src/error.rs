use std::collections::TryReserveError;

use crate::rate::PhyParams;

/// Errors surfaced while setting up or reconfiguring a station's rate table.
///
/// None of these are produced on the per-frame path: selection, scheduling and
/// feedback are infallible once a [`RateTable`](crate::RateTable) exists.
#[derive(Debug, thiserror::Error)]
pub enum RateControlError {
    #[error("failed to allocate statistics for {rows} rate rows")]
    AllocationFailed {
        rows: usize,
        #[source]
        source: TryReserveError,
    },
    #[error("capability set yields no valid rate")]
    NoValidRate,
    #[error("invalid capabilities: {0}")]
    InvalidCapabilities(&'static str),
    #[error("attempt count {0} does not fit the 3-bit descriptor field")]
    AttemptsOutOfRange(u8),
    #[error("rate {0} is not usable with this station's capabilities")]
    UnsupportedRate(PhyParams),
    #[error("invalid rate control configuration: {0}")]
    Config(String),
}

pub(crate) type Result<T, E = RateControlError> = std::result::Result<T, E>;
