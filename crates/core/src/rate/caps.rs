use crate::config::{DEFAULT_MAX_ATTEMPTS_PER_RATE, MAX_CHAIN_LEN};
use crate::error::{RateControlError, Result};

use super::{Bandwidth, GuardInterval, Mcs, PhyParams, SpatialStreams};

/// Bits of the MCS mask that take part in the regular row product.
pub(crate) const REGULAR_MCS_MASK: u16 = (1 << 10) - 1;

/// What a peer station can receive, fixed for the lifetime of its rate table.
///
/// Each dimension is a bitmask indexed by the enum's `index()`. Short guard is
/// additionally gated per bandwidth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capabilities {
    mcs: u16,
    bandwidths: u8,
    streams: u8,
    guards: u8,
    short_guard_bandwidths: u8,
    max_rates: u8,
    max_attempts_per_rate: u8,
}

impl Capabilities {
    pub fn builder() -> CapabilitiesBuilder {
        CapabilitiesBuilder::default()
    }

    pub fn supports_mcs(&self, mcs: Mcs) -> bool {
        self.mcs & (1 << mcs.index()) != 0
    }

    pub fn supports_bandwidth(&self, bandwidth: Bandwidth) -> bool {
        self.bandwidths & (1 << bandwidth.index()) != 0
    }

    pub fn supports_streams(&self, streams: SpatialStreams) -> bool {
        self.streams & (1 << streams.index()) != 0
    }

    pub fn supports_guard(&self, guard: GuardInterval) -> bool {
        self.guards & (1 << guard.index()) != 0
    }

    /// Whether `guard` may be used at `bandwidth`. Long guard always may.
    pub fn guard_allowed(&self, bandwidth: Bandwidth, guard: GuardInterval) -> bool {
        match guard {
            GuardInterval::Long => true,
            GuardInterval::Short => self.short_guard_bandwidths & (1 << bandwidth.index()) != 0,
        }
    }

    /// Whether every parameter of `phy` is within this capability set.
    pub fn supports(&self, phy: &PhyParams) -> bool {
        self.supports_mcs(phy.mcs)
            && self.supports_bandwidth(phy.bandwidth)
            && self.supports_streams(phy.streams)
            && self.supports_guard(phy.guard)
            && self.guard_allowed(phy.bandwidth, phy.guard)
    }

    /// Longest retry chain this station accepts (1..=4).
    pub fn max_rates(&self) -> usize {
        usize::from(self.max_rates)
    }

    pub fn max_attempts_per_rate(&self) -> u8 {
        self.max_attempts_per_rate
    }

    pub fn narrowest_bandwidth(&self) -> Bandwidth {
        Bandwidth::ALL
            .into_iter()
            .find(|bw| self.supports_bandwidth(*bw))
            .unwrap_or(Bandwidth::Mhz1)
    }

    /// Whether the MCS10 rows exist for this station.
    pub fn has_narrowband_rows(&self) -> bool {
        self.supports_mcs(Mcs::Mcs10)
            && self.supports_bandwidth(Bandwidth::Mhz1)
            && self.supports_streams(SpatialStreams::One)
    }

    /// Supported MCS values in ascending data-rate order.
    pub fn mcs_by_rank(&self) -> impl Iterator<Item = Mcs> + '_ {
        (0..=10u8)
            .filter_map(Mcs::from_rank)
            .filter(move |mcs| self.supports_mcs(*mcs))
    }

    pub(crate) fn mcs_mask(&self) -> u16 {
        self.mcs
    }

    pub(crate) fn bandwidth_mask(&self) -> u8 {
        self.bandwidths
    }

    pub(crate) fn stream_mask(&self) -> u8 {
        self.streams
    }

    pub(crate) fn guard_mask(&self) -> u8 {
        self.guards
    }
}

/// Validating builder for [`Capabilities`].
#[derive(Debug, Clone)]
pub struct CapabilitiesBuilder {
    mcs: u16,
    bandwidths: u8,
    streams: u8,
    guards: u8,
    short_guard_bandwidths: Option<u8>,
    max_rates: usize,
    max_attempts_per_rate: u8,
}

impl Default for CapabilitiesBuilder {
    fn default() -> Self {
        Self {
            mcs: 0,
            bandwidths: 0,
            streams: 1 << SpatialStreams::One.index(),
            guards: 1 << GuardInterval::Long.index(),
            short_guard_bandwidths: None,
            max_rates: MAX_CHAIN_LEN,
            max_attempts_per_rate: DEFAULT_MAX_ATTEMPTS_PER_RATE,
        }
    }
}

impl CapabilitiesBuilder {
    pub fn mcs(mut self, mcs: impl IntoIterator<Item = Mcs>) -> Self {
        self.mcs = mcs.into_iter().fold(0, |mask, m| mask | 1 << m.index());
        self
    }

    /// MCS0 up to and including `highest`, without MCS10.
    pub fn mcs_up_to(self, highest: Mcs) -> Self {
        let top = highest.index().min(Mcs::Mcs9.index());
        self.mcs((0..=top).filter_map(Mcs::from_index))
    }

    pub fn bandwidths(mut self, bandwidths: impl IntoIterator<Item = Bandwidth>) -> Self {
        self.bandwidths = bandwidths
            .into_iter()
            .fold(0, |mask, bw| mask | 1 << bw.index());
        self
    }

    pub fn streams(mut self, streams: impl IntoIterator<Item = SpatialStreams>) -> Self {
        self.streams = streams
            .into_iter()
            .fold(0, |mask, ss| mask | 1 << ss.index());
        self
    }

    pub fn guards(mut self, guards: impl IntoIterator<Item = GuardInterval>) -> Self {
        self.guards = guards
            .into_iter()
            .fold(0, |mask, gi| mask | 1 << gi.index());
        self
    }

    /// Bandwidths at which short guard is permitted. Defaults to all of them.
    pub fn short_guard_at(mut self, bandwidths: impl IntoIterator<Item = Bandwidth>) -> Self {
        self.short_guard_bandwidths = Some(
            bandwidths
                .into_iter()
                .fold(0, |mask, bw| mask | 1 << bw.index()),
        );
        self
    }

    pub fn max_rates(mut self, max_rates: usize) -> Self {
        self.max_rates = max_rates;
        self
    }

    pub fn max_attempts_per_rate(mut self, attempts: u8) -> Self {
        self.max_attempts_per_rate = attempts;
        self
    }

    pub fn build(self) -> Result<Capabilities> {
        if self.mcs == 0 {
            return Err(RateControlError::InvalidCapabilities("no MCS supported"));
        }
        if self.bandwidths == 0 {
            return Err(RateControlError::InvalidCapabilities(
                "no bandwidth supported",
            ));
        }
        if self.streams == 0 {
            return Err(RateControlError::InvalidCapabilities(
                "no spatial stream count supported",
            ));
        }
        if self.guards & (1 << GuardInterval::Long.index()) == 0 {
            return Err(RateControlError::InvalidCapabilities(
                "long guard interval is mandatory",
            ));
        }
        if !(1..=MAX_CHAIN_LEN).contains(&self.max_rates) {
            return Err(RateControlError::InvalidCapabilities(
                "max_rates must be between 1 and 4",
            ));
        }
        if self.max_attempts_per_rate == 0 {
            return Err(RateControlError::InvalidCapabilities(
                "max_attempts_per_rate must be positive",
            ));
        }
        Ok(Capabilities {
            mcs: self.mcs,
            bandwidths: self.bandwidths,
            streams: self.streams,
            guards: self.guards,
            short_guard_bandwidths: self.short_guard_bandwidths.unwrap_or(0x1f),
            max_rates: self.max_rates as u8,
            max_attempts_per_rate: self.max_attempts_per_rate,
        })
    }
}
