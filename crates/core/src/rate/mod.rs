//! S1G rate descriptors.
//!
//! A [`Rate`] names one point of the PHY parameter space together with the
//! attempt count and flags it carries inside a retry chain. Rates are never
//! built field by field: they come out of [`space::decode`], which also stamps
//! them with their dense [`RowIndex`] in the station's statistics table.
//!
//! | Dimension | Values | Notes |
//! |-----------|--------|-------|
//! | MCS | 0-10 | MCS10 is the 1 MHz single-stream duplicate mode |
//! | Bandwidth | 1, 2, 4, 8, 16 MHz | |
//! | Spatial streams | 1-4 | |
//! | Guard interval | long, short | long is legal at every bandwidth |

mod caps;
pub mod space;
pub mod throughput;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RateControlError, Result};

pub use caps::{Capabilities, CapabilitiesBuilder};

/// Modulation and coding scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Mcs {
    Mcs0 = 0,
    Mcs1 = 1,
    Mcs2 = 2,
    Mcs3 = 3,
    Mcs4 = 4,
    Mcs5 = 5,
    Mcs6 = 6,
    Mcs7 = 7,
    Mcs8 = 8,
    Mcs9 = 9,
    /// BPSK 1/2 with 2x repetition; only defined at 1 MHz with one stream.
    Mcs10 = 10,
}

impl Mcs {
    pub const ALL: [Mcs; 11] = [
        Mcs::Mcs0,
        Mcs::Mcs1,
        Mcs::Mcs2,
        Mcs::Mcs3,
        Mcs::Mcs4,
        Mcs::Mcs5,
        Mcs::Mcs6,
        Mcs::Mcs7,
        Mcs::Mcs8,
        Mcs::Mcs9,
        Mcs::Mcs10,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Position in ascending data-rate order; MCS10 sits below MCS0.
    pub fn rank(self) -> u8 {
        match self {
            Mcs::Mcs10 => 0,
            other => other as u8 + 1,
        }
    }

    /// Inverse of [`Mcs::rank`].
    pub fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            0 => Some(Mcs::Mcs10),
            r => Self::from_index(usize::from(r) - 1).filter(|m| *m != Mcs::Mcs10),
        }
    }
}

/// S1G channel width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Bandwidth {
    Mhz1 = 0,
    Mhz2 = 1,
    Mhz4 = 2,
    Mhz8 = 3,
    Mhz16 = 4,
}

impl Bandwidth {
    pub const ALL: [Bandwidth; 5] = [
        Bandwidth::Mhz1,
        Bandwidth::Mhz2,
        Bandwidth::Mhz4,
        Bandwidth::Mhz8,
        Bandwidth::Mhz16,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn mhz(self) -> u32 {
        1 << self.index()
    }
}

/// Number of spatial streams, stored zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum SpatialStreams {
    One = 0,
    Two = 1,
    Three = 2,
    Four = 3,
}

impl SpatialStreams {
    pub const ALL: [SpatialStreams; 4] = [
        SpatialStreams::One,
        SpatialStreams::Two,
        SpatialStreams::Three,
        SpatialStreams::Four,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn count(self) -> u32 {
        self as u32 + 1
    }
}

/// OFDM guard interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum GuardInterval {
    Long = 0,
    Short = 1,
}

impl GuardInterval {
    pub const ALL: [GuardInterval; 2] = [GuardInterval::Long, GuardInterval::Short];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// Attempt count of one retry-chain slot.
///
/// The on-air descriptor carries it in three bits, so values above 7 are
/// rejected at construction instead of being truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Attempts(u8);

impl Attempts {
    pub const ZERO: Attempts = Attempts(0);
    pub const ONE: Attempts = Attempts(1);
    pub const TWO: Attempts = Attempts(2);
    pub const MAX: Attempts = Attempts(7);

    pub fn new(value: u8) -> Result<Self> {
        if value > Self::MAX.0 {
            return Err(RateControlError::AttemptsOutOfRange(value));
        }
        Ok(Self(value))
    }

    /// Clamp an arbitrary count into the representable range.
    pub(crate) fn saturating(value: u32) -> Self {
        Self(value.min(u32::from(Self::MAX.0)) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Attempts {
    type Error = RateControlError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

bitflags::bitflags! {
    /// Per-slot flags of a retry chain.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RateFlags: u8 {
        /// Protect the attempt with an RTS/CTS exchange.
        const RTS = 1 << 0;
        /// The row decoded to a short guard at a bandwidth that forbids it and
        /// was coerced to the long guard; the row aliases another one.
        const GUARD_COERCED = 1 << 1;
    }
}

/// Dense index of a rate inside a station's statistics table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RowIndex(u16);

impl RowIndex {
    pub(crate) fn new(index: usize) -> Self {
        debug_assert!(index <= usize::from(u16::MAX), "row {index} out of range");
        Self(index as u16)
    }

    pub fn get(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for RowIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The PHY-level part of a rate: what the radio actually modulates.
///
/// Unlike [`Rate`] this can describe combinations that no station supports,
/// which is what [`space::validate_phy`] and fixed-rate requests need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhyParams {
    pub mcs: Mcs,
    pub bandwidth: Bandwidth,
    pub streams: SpatialStreams,
    pub guard: GuardInterval,
}

impl PhyParams {
    pub fn new(
        mcs: Mcs,
        bandwidth: Bandwidth,
        streams: SpatialStreams,
        guard: GuardInterval,
    ) -> Self {
        Self {
            mcs,
            bandwidth,
            streams,
            guard,
        }
    }
}

impl fmt::Display for PhyParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = match self.guard {
            GuardInterval::Long => "LGI",
            GuardInterval::Short => "SGI",
        };
        write!(
            f,
            "MCS{}/{}MHz/{}SS/{}",
            self.mcs.index(),
            self.bandwidth.mhz(),
            self.streams.count(),
            guard
        )
    }
}

/// One slot of a retry chain, bound to its statistics row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rate {
    phy: PhyParams,
    attempts: Attempts,
    flags: RateFlags,
    row: RowIndex,
}

impl Rate {
    pub(crate) fn from_row(phy: PhyParams, flags: RateFlags, row: RowIndex) -> Self {
        Self {
            phy,
            attempts: Attempts::ZERO,
            flags,
            row,
        }
    }

    pub fn phy(&self) -> PhyParams {
        self.phy
    }

    pub fn mcs(&self) -> Mcs {
        self.phy.mcs
    }

    pub fn bandwidth(&self) -> Bandwidth {
        self.phy.bandwidth
    }

    pub fn streams(&self) -> SpatialStreams {
        self.phy.streams
    }

    pub fn guard(&self) -> GuardInterval {
        self.phy.guard
    }

    pub fn attempts(&self) -> Attempts {
        self.attempts
    }

    pub fn flags(&self) -> RateFlags {
        self.flags
    }

    pub fn row(&self) -> RowIndex {
        self.row
    }

    pub fn uses_rts(&self) -> bool {
        self.flags.contains(RateFlags::RTS)
    }

    pub fn is_guard_coerced(&self) -> bool {
        self.flags.contains(RateFlags::GUARD_COERCED)
    }

    pub(crate) fn with_attempts(mut self, attempts: Attempts) -> Self {
        self.attempts = attempts;
        self
    }

    pub(crate) fn set_rts(&mut self, rts: bool) {
        self.flags.set(RateFlags::RTS, rts);
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.phy)?;
        if self.attempts != Attempts::ZERO {
            write!(f, " x{}", self.attempts.get())?;
        }
        if self.uses_rts() {
            write!(f, " rts")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempts_range() {
        assert_eq!(Attempts::new(0).unwrap(), Attempts::ZERO);
        assert_eq!(Attempts::new(7).unwrap(), Attempts::MAX);
        assert!(matches!(
            Attempts::new(8),
            Err(RateControlError::AttemptsOutOfRange(8))
        ));
        assert_eq!(Attempts::saturating(12), Attempts::MAX);
        assert_eq!(Attempts::saturating(3).get(), 3);
    }

    #[test]
    fn test_mcs_rank_order() {
        assert_eq!(Mcs::Mcs10.rank(), 0);
        assert_eq!(Mcs::Mcs0.rank(), 1);
        assert_eq!(Mcs::Mcs9.rank(), 10);
        for mcs in Mcs::ALL {
            assert_eq!(Mcs::from_rank(mcs.rank()), Some(mcs));
        }
        assert_eq!(Mcs::from_rank(11), None);
    }

    #[test]
    fn test_flags() {
        let mut flags = RateFlags::default();
        assert!(flags.is_empty());
        flags.insert(RateFlags::RTS | RateFlags::GUARD_COERCED);
        assert_eq!(flags.bits(), 0b11);
        flags.set(RateFlags::RTS, false);
        assert!(!flags.contains(RateFlags::RTS));
        assert!(flags.contains(RateFlags::GUARD_COERCED));
    }

    #[test]
    fn test_phy_display() {
        let phy = PhyParams::new(
            Mcs::Mcs7,
            Bandwidth::Mhz4,
            SpatialStreams::Two,
            GuardInterval::Short,
        );
        assert_eq!(phy.to_string(), "MCS7/4MHz/2SS/SGI");
    }
}
