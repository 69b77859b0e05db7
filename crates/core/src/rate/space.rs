//! Bijection between PHY parameters and dense statistics rows.
//!
//! Rows enumerate the supported MCS0-MCS9 × streams × bandwidths × guards
//! product as a mixed-radix number, guard being the least significant digit
//! and MCS the most significant one. Each digit is the position of the value
//! among the set bits of that capability mask. MCS10 rows follow the product,
//! one per supported guard interval.
//!
//! A short-guard digit at a bandwidth where short guard is not allowed still
//! gets a row, so the arithmetic stays a plain product; [`decode`] coerces it
//! to the long guard and flags it, and [`validate`] keeps such alias rows out
//! of every selection.

use super::caps::REGULAR_MCS_MASK;
use super::{
    Bandwidth, Capabilities, GuardInterval, Mcs, PhyParams, Rate, RateFlags, RowIndex,
    SpatialStreams,
};

/// Bit position of the `n`th (zero-based) set bit of `mask`.
fn nth_set_bit(mask: u16, n: usize) -> usize {
    let mut remaining = mask;
    for _ in 0..n {
        remaining &= remaining.wrapping_sub(1);
    }
    debug_assert!(remaining != 0, "digit {n} out of range for mask {mask:#b}");
    remaining.trailing_zeros() as usize
}

/// Number of set bits of `mask` below `bit`.
fn set_bits_below(mask: u16, bit: usize) -> usize {
    (mask & ((1u16 << bit) - 1)).count_ones() as usize
}

struct Radix {
    mcs: usize,
    streams: usize,
    bandwidths: usize,
    guards: usize,
}

impl Radix {
    fn of(caps: &Capabilities) -> Self {
        Self {
            mcs: (caps.mcs_mask() & REGULAR_MCS_MASK).count_ones() as usize,
            streams: caps.stream_mask().count_ones() as usize,
            bandwidths: caps.bandwidth_mask().count_ones() as usize,
            guards: caps.guard_mask().count_ones() as usize,
        }
    }

    fn product(&self) -> usize {
        self.mcs * self.streams * self.bandwidths * self.guards
    }
}

/// Number of statistics rows a station with `caps` needs.
pub fn row_count(caps: &Capabilities) -> usize {
    let radix = Radix::of(caps);
    let bonus = if caps.has_narrowband_rows() {
        radix.guards
    } else {
        0
    };
    radix.product() + bonus
}

/// Decode `row` into its rate. `row` must be below [`row_count`].
pub fn decode(caps: &Capabilities, row: usize) -> Rate {
    debug_assert!(
        row < row_count(caps),
        "row {row} out of range ({} rows)",
        row_count(caps)
    );
    let radix = Radix::of(caps);
    let product = radix.product();
    let guards = u16::from(caps.guard_mask());

    let mut phy = if row >= product {
        let guard = nth_set_bit(guards, row - product);
        PhyParams::new(
            Mcs::Mcs10,
            Bandwidth::Mhz1,
            SpatialStreams::One,
            GuardInterval::from_index(guard).unwrap_or(GuardInterval::Long),
        )
    } else {
        let mut rest = row;
        let guard = rest % radix.guards;
        rest /= radix.guards;
        let bandwidth = rest % radix.bandwidths;
        rest /= radix.bandwidths;
        let streams = rest % radix.streams;
        let mcs = rest / radix.streams;

        PhyParams::new(
            Mcs::from_index(nth_set_bit(caps.mcs_mask() & REGULAR_MCS_MASK, mcs))
                .unwrap_or(Mcs::Mcs0),
            Bandwidth::from_index(nth_set_bit(u16::from(caps.bandwidth_mask()), bandwidth))
                .unwrap_or(Bandwidth::Mhz1),
            SpatialStreams::from_index(nth_set_bit(u16::from(caps.stream_mask()), streams))
                .unwrap_or(SpatialStreams::One),
            GuardInterval::from_index(nth_set_bit(guards, guard)).unwrap_or(GuardInterval::Long),
        )
    };

    let mut flags = RateFlags::empty();
    if !caps.guard_allowed(phy.bandwidth, phy.guard) {
        phy.guard = GuardInterval::Long;
        flags.insert(RateFlags::GUARD_COERCED);
    }
    Rate::from_row(phy, flags, RowIndex::new(row))
}

/// Row of the PHY combination `phy`, if the capability set enumerates it.
///
/// A short guard at a bandwidth that forbids it maps to its alias row; such
/// rows decode as guard-coerced and never pass [`validate`].
pub fn encode_phy(caps: &Capabilities, phy: &PhyParams) -> Option<RowIndex> {
    if !(caps.supports_mcs(phy.mcs)
        && caps.supports_bandwidth(phy.bandwidth)
        && caps.supports_streams(phy.streams)
        && caps.supports_guard(phy.guard))
    {
        return None;
    }
    let radix = Radix::of(caps);
    let guard = set_bits_below(u16::from(caps.guard_mask()), phy.guard.index());

    if phy.mcs == Mcs::Mcs10 {
        if !caps.has_narrowband_rows()
            || phy.bandwidth != Bandwidth::Mhz1
            || phy.streams != SpatialStreams::One
        {
            return None;
        }
        return Some(RowIndex::new(radix.product() + guard));
    }

    let mcs = set_bits_below(caps.mcs_mask() & REGULAR_MCS_MASK, phy.mcs.index());
    let streams = set_bits_below(u16::from(caps.stream_mask()), phy.streams.index());
    let bandwidth = set_bits_below(u16::from(caps.bandwidth_mask()), phy.bandwidth.index());
    let row =
        ((mcs * radix.streams + streams) * radix.bandwidths + bandwidth) * radix.guards + guard;
    Some(RowIndex::new(row))
}

/// Row of `rate`. Exact inverse of [`decode`] for every decoded rate,
/// guard-coerced aliases included.
pub fn encode(caps: &Capabilities, rate: &Rate) -> Option<RowIndex> {
    let mut phy = rate.phy();
    if rate.is_guard_coerced() {
        phy.guard = GuardInterval::Short;
    }
    let row = encode_phy(caps, &phy);
    debug_assert!(
        row.is_none() || row == Some(rate.row()),
        "rate {rate} carries row {} but encodes to {row:?}",
        rate.row()
    );
    row
}

/// Whether the PHY defines this combination at all.
pub fn validate_phy(phy: &PhyParams) -> bool {
    !matches!(
        (phy.mcs, phy.bandwidth, phy.streams),
        (Mcs::Mcs10, Bandwidth::Mhz2 | Bandwidth::Mhz4 | Bandwidth::Mhz8 | Bandwidth::Mhz16, _)
            | (Mcs::Mcs10, _, SpatialStreams::Two | SpatialStreams::Three | SpatialStreams::Four)
            | (
                Mcs::Mcs9,
                Bandwidth::Mhz2,
                SpatialStreams::One | SpatialStreams::Two | SpatialStreams::Four
            )
            | (Mcs::Mcs6, Bandwidth::Mhz8, SpatialStreams::Three)
            | (Mcs::Mcs9, Bandwidth::Mhz16, SpatialStreams::Three)
    )
}

/// Whether `rate` may ever be selected or scheduled.
pub fn validate(rate: &Rate) -> bool {
    !rate.is_guard_coerced() && validate_phy(&rate.phy())
}

/// Every row of the capability set, decoded, in row order.
pub fn rows(caps: &Capabilities) -> impl Iterator<Item = Rate> + '_ {
    (0..row_count(caps)).map(move |row| decode(caps, row))
}

/// The next valid rate below `rate` at the same bandwidth, streams and guard.
///
/// MCS10 counts as the step below MCS0.
pub fn step_down(caps: &Capabilities, rate: &Rate) -> Option<Rate> {
    let phy = rate.phy();
    (0..phy.mcs.rank())
        .rev()
        .filter_map(Mcs::from_rank)
        .filter(|mcs| caps.supports_mcs(*mcs))
        .filter_map(|mcs| encode_phy(caps, &PhyParams { mcs, ..phy }))
        .map(|row| decode(caps, row.get()))
        .find(validate)
}

/// The most robust valid row: narrowest bandwidth, fewest streams, lowest
/// regular MCS, long guard. MCS10 is only chosen when nothing else is valid.
pub fn lowest_row(caps: &Capabilities) -> Option<RowIndex> {
    rows(caps)
        .filter(validate)
        .min_by_key(|rate| {
            (
                rate.mcs() == Mcs::Mcs10,
                rate.bandwidth(),
                rate.streams(),
                rate.mcs().rank(),
                rate.guard(),
            )
        })
        .map(|rate| rate.row())
}
