//! Fixed-point airtime and data-rate model.
//!
//! Airtime is what the scheduler budgets with, so it is computed for a fixed
//! reference payload rather than the real frame: attempt allocation is a
//! property of the rate, not of the frame being sent.

use super::{GuardInterval, Mcs, PhyParams, Rate};
use crate::config::{PERCENT, PROBABILITY_FLOOR};

/// Payload, in bytes, that every airtime figure refers to.
pub const REFERENCE_PAYLOAD_BYTES: u32 = 64;

const REFERENCE_PAYLOAD_BITS: u32 = REFERENCE_PAYLOAD_BYTES * 8;

/// Data bits per OFDM symbol at 1 MHz with one stream, indexed by MCS.
/// MCS10 reuses the MCS0 coding.
const SYMBOL_BITS_1MHZ: [u32; 11] = [12, 24, 36, 48, 72, 96, 108, 120, 144, 160, 12];

/// Data subcarriers per bandwidth; divided by the 1 MHz count this is the
/// fixed-point bandwidth multiplier.
const DATA_SUBCARRIERS: [u32; 5] = [24, 52, 108, 234, 468];

const DATA_SUBCARRIERS_1MHZ: u32 = DATA_SUBCARRIERS[0];

/// MCS10 repetition slowdown in Q8 (2.0).
const NARROWBAND_SLOWDOWN_Q8: u32 = 512;

const SYMBOL_US_LONG_GUARD: u32 = 40;
const SYMBOL_US_SHORT_GUARD: u32 = 36;

/// Single-stream data rates in bits/s with the long guard, `[bandwidth][mcs]`.
const RATES_LONG_GUARD: [[u32; 11]; 5] = [
    [
        300_000, 600_000, 900_000, 1_200_000, 1_800_000, 2_400_000, 2_700_000, 3_000_000,
        3_600_000, 4_000_000, 150_000,
    ],
    [
        650_000, 1_300_000, 1_950_000, 2_600_000, 3_900_000, 5_200_000, 5_850_000, 6_500_000,
        7_800_000, 8_666_667, 0,
    ],
    [
        1_350_000, 2_700_000, 4_050_000, 5_400_000, 8_100_000, 10_800_000, 12_150_000,
        13_500_000, 16_200_000, 18_000_000, 0,
    ],
    [
        2_925_000, 5_850_000, 8_775_000, 11_700_000, 17_550_000, 23_400_000, 26_325_000,
        29_250_000, 35_100_000, 39_000_000, 0,
    ],
    [
        5_850_000, 11_700_000, 17_550_000, 23_400_000, 35_100_000, 46_800_000, 52_650_000,
        58_500_000, 70_200_000, 78_000_000, 0,
    ],
];

/// Single-stream data rates in bits/s with the short guard, `[bandwidth][mcs]`.
const RATES_SHORT_GUARD: [[u32; 11]; 5] = [
    [
        333_333, 666_667, 1_000_000, 1_333_333, 2_000_000, 2_666_667, 3_000_000, 3_333_333,
        4_000_000, 4_444_444, 166_667,
    ],
    [
        722_222, 1_444_444, 2_166_667, 2_888_889, 4_333_333, 5_777_778, 6_500_000, 7_222_222,
        8_666_667, 9_629_630, 0,
    ],
    [
        1_500_000, 3_000_000, 4_500_000, 6_000_000, 9_000_000, 12_000_000, 13_500_000,
        15_000_000, 18_000_000, 20_000_000, 0,
    ],
    [
        3_250_000, 6_500_000, 9_750_000, 13_000_000, 19_500_000, 26_000_000, 29_250_000,
        32_500_000, 39_000_000, 43_333_333, 0,
    ],
    [
        6_500_000, 13_000_000, 19_500_000, 26_000_000, 39_000_000, 52_000_000, 58_500_000,
        65_000_000, 78_000_000, 86_666_667, 0,
    ],
];

impl GuardInterval {
    pub fn symbol_us(self) -> u32 {
        match self {
            GuardInterval::Long => SYMBOL_US_LONG_GUARD,
            GuardInterval::Short => SYMBOL_US_SHORT_GUARD,
        }
    }
}

/// Airtime in microseconds of one attempt carrying the reference payload.
pub fn tx_time_us(phy: &PhyParams) -> u32 {
    let bits_per_symbol_x24 = SYMBOL_BITS_1MHZ[phy.mcs.index()]
        * DATA_SUBCARRIERS[phy.bandwidth.index()]
        * phy.streams.count();
    let mut symbols =
        (REFERENCE_PAYLOAD_BITS * DATA_SUBCARRIERS_1MHZ).div_ceil(bits_per_symbol_x24);
    if phy.mcs == Mcs::Mcs10 {
        symbols = (symbols * NARROWBAND_SLOWDOWN_Q8).div_ceil(256);
    }
    symbols * phy.guard.symbol_us()
}

/// Nominal PHY data rate in bits/s.
pub fn theoretical_bps(phy: &PhyParams) -> u32 {
    let table = match phy.guard {
        GuardInterval::Long => &RATES_LONG_GUARD,
        GuardInterval::Short => &RATES_SHORT_GUARD,
    };
    table[phy.bandwidth.index()][phy.mcs.index()].saturating_mul(phy.streams.count())
}

/// Expected goodput of `rate` at `probability` percent delivery.
///
/// Rates with less than 10 % observed delivery are treated as unproven.
pub fn estimated_bps(rate: &Rate, probability: u8) -> u32 {
    if probability < PROBABILITY_FLOOR {
        return 0;
    }
    theoretical_bps(&rate.phy()) / PERCENT * u32::from(probability)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::rate::{Bandwidth, SpatialStreams};

    fn phy(mcs: Mcs, bandwidth: Bandwidth, guard: GuardInterval) -> PhyParams {
        PhyParams::new(mcs, bandwidth, SpatialStreams::One, guard)
    }

    #[rstest]
    #[case(Mcs::Mcs0, Bandwidth::Mhz1, GuardInterval::Long, 1_720)]
    #[case(Mcs::Mcs0, Bandwidth::Mhz1, GuardInterval::Short, 1_548)]
    #[case(Mcs::Mcs10, Bandwidth::Mhz1, GuardInterval::Long, 3_440)]
    #[case(Mcs::Mcs7, Bandwidth::Mhz1, GuardInterval::Long, 200)]
    #[case(Mcs::Mcs0, Bandwidth::Mhz2, GuardInterval::Long, 800)]
    #[case(Mcs::Mcs9, Bandwidth::Mhz16, GuardInterval::Long, 40)]
    fn test_tx_time(
        #[case] mcs: Mcs,
        #[case] bandwidth: Bandwidth,
        #[case] guard: GuardInterval,
        #[case] expected_us: u32,
    ) {
        assert_eq!(tx_time_us(&phy(mcs, bandwidth, guard)), expected_us);
    }

    #[test]
    fn test_tx_time_shrinks_with_streams() {
        let one = PhyParams::new(
            Mcs::Mcs3,
            Bandwidth::Mhz4,
            SpatialStreams::One,
            GuardInterval::Long,
        );
        let four = PhyParams { streams: SpatialStreams::Four, ..one };
        assert!(tx_time_us(&four) < tx_time_us(&one));
    }

    #[test]
    fn test_theoretical_rates() {
        assert_eq!(theoretical_bps(&phy(Mcs::Mcs0, Bandwidth::Mhz1, GuardInterval::Long)), 300_000);
        assert_eq!(
            theoretical_bps(&phy(Mcs::Mcs10, Bandwidth::Mhz1, GuardInterval::Long)),
            150_000
        );
        assert_eq!(
            theoretical_bps(&phy(Mcs::Mcs7, Bandwidth::Mhz8, GuardInterval::Short)),
            32_500_000
        );
        let three = PhyParams::new(
            Mcs::Mcs9,
            Bandwidth::Mhz2,
            SpatialStreams::Three,
            GuardInterval::Long,
        );
        assert_eq!(theoretical_bps(&three), 26_000_001);
    }

    #[test]
    fn test_short_guard_is_faster_everywhere() {
        for bandwidth in Bandwidth::ALL {
            for mcs in Mcs::ALL {
                let long = theoretical_bps(&phy(mcs, bandwidth, GuardInterval::Long));
                let short = theoretical_bps(&phy(mcs, bandwidth, GuardInterval::Short));
                assert!(short >= long, "{mcs:?} at {bandwidth:?}");
                if long > 0 {
                    assert!(short > long);
                }
            }
        }
    }

    #[test]
    fn test_rates_increase_with_mcs_and_bandwidth() {
        for guard in GuardInterval::ALL {
            for bandwidth in Bandwidth::ALL {
                let rates: Vec<_> = (0..10)
                    .filter_map(Mcs::from_index)
                    .map(|mcs| theoretical_bps(&phy(mcs, bandwidth, guard)))
                    .collect();
                assert!(rates.windows(2).all(|w| w[0] < w[1]));
            }
            for mcs in (0..10).filter_map(Mcs::from_index) {
                let rates: Vec<_> = Bandwidth::ALL
                    .into_iter()
                    .map(|bw| theoretical_bps(&phy(mcs, bw, guard)))
                    .collect();
                assert!(rates.windows(2).all(|w| w[0] < w[1]));
            }
        }
    }
}
