//! SNR-driven delivery model.
//!
//! Each rate needs a minimum SNR; delivery probability ramps linearly from 0
//! to 1 across `ramp_db` centred on that threshold. Wider channels and extra
//! streams need 3 dB more per step, the short guard 1 dB more.

use clap::ValueEnum;
use halow_rc::{GuardInterval, Rate};
use rand::{rngs::SmallRng, Rng};

use crate::config::ChannelOverrides;

/// SNR threshold at 1 MHz, one stream, long guard, indexed by MCS. MCS10
/// trades half the rate for 3 dB.
const REQUIRED_SNR_DB: [f64; 11] = [
    2.0, 5.0, 8.0, 11.0, 15.0, 19.0, 21.0, 23.0, 27.0, 30.0, -1.0,
];

const PER_STEP_DB: f64 = 3.0;
const SHORT_GUARD_DB: f64 = 1.0;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Profile {
    /// Constant SNR.
    #[default]
    Clean,
    /// SNR oscillates around the base value.
    Fading,
    /// SNR falls steadily over the run.
    Degrading,
}

#[derive(Debug, Clone)]
pub struct Channel {
    profile: Profile,
    params: ChannelOverrides,
    /// Fixed loss of this station relative to the base SNR, dB.
    offset_db: f64,
    duration_us: u64,
}

impl Channel {
    pub fn new(
        profile: Profile,
        params: ChannelOverrides,
        offset_db: f64,
        duration_us: u64,
    ) -> Self {
        Self {
            profile,
            params,
            offset_db,
            duration_us: duration_us.max(1),
        }
    }

    /// SNR at virtual time `now_us`, dB.
    pub fn snr_db(&self, now_us: u64) -> f64 {
        let base = self.params.base_snr_db - self.offset_db;
        match self.profile {
            Profile::Clean => base,
            Profile::Fading => {
                let period_us = (self.params.fade_period_ms.max(1) * 1_000) as f64;
                let phase = (now_us as f64 / period_us) * std::f64::consts::TAU;
                base + self.params.fade_depth_db * phase.sin()
            }
            Profile::Degrading => {
                let progress = (now_us.min(self.duration_us) as f64) / self.duration_us as f64;
                base - self.params.degradation_db * progress
            }
        }
    }

    /// Probability that one attempt at `rate` gets through at `now_us`.
    pub fn delivery_probability(&self, rate: &Rate, now_us: u64) -> f64 {
        let margin = self.snr_db(now_us) - required_snr_db(rate);
        let ramp = self.params.ramp_db.max(f64::EPSILON);
        (margin / ramp + 0.5).clamp(0.0, 1.0)
    }

    pub fn attempt(&self, rate: &Rate, now_us: u64, rng: &mut SmallRng) -> bool {
        rng.random_bool(self.delivery_probability(rate, now_us))
    }
}

pub fn required_snr_db(rate: &Rate) -> f64 {
    let steps = rate.bandwidth().index() + rate.streams().index();
    let guard = if rate.guard() == GuardInterval::Short {
        SHORT_GUARD_DB
    } else {
        0.0
    };
    REQUIRED_SNR_DB[rate.mcs().index()] + PER_STEP_DB * steps as f64 + guard
}

#[cfg(test)]
mod tests {
    use halow_rc::rate::space;
    use halow_rc::{Bandwidth, Capabilities, Mcs, PhyParams, SpatialStreams};
    use rand::SeedableRng;

    use super::*;

    fn rate(mcs: Mcs, bandwidth: Bandwidth) -> Rate {
        let caps = Capabilities::builder()
            .mcs(Mcs::ALL)
            .bandwidths([Bandwidth::Mhz1, Bandwidth::Mhz2, Bandwidth::Mhz4])
            .build()
            .unwrap();
        let phy = PhyParams::new(mcs, bandwidth, SpatialStreams::One, GuardInterval::Long);
        space::decode(&caps, space::encode_phy(&caps, &phy).unwrap().get())
    }

    #[test]
    fn test_wider_needs_more_snr() {
        let narrow = required_snr_db(&rate(Mcs::Mcs3, Bandwidth::Mhz1));
        let wide = required_snr_db(&rate(Mcs::Mcs3, Bandwidth::Mhz4));
        assert_eq!(wide - narrow, 6.0);
        assert!(required_snr_db(&rate(Mcs::Mcs10, Bandwidth::Mhz1)) < narrow);
    }

    #[test]
    fn test_ramp() {
        let channel = Channel::new(Profile::Clean, ChannelOverrides::default(), 0.0, 1_000);
        // base 24 dB: MCS7 at 1 MHz needs 23, one dB of margin on a 4 dB ramp
        let mcs7 = rate(Mcs::Mcs7, Bandwidth::Mhz1);
        assert!((channel.delivery_probability(&mcs7, 0) - 0.75).abs() < 1e-9);
        assert_eq!(channel.delivery_probability(&rate(Mcs::Mcs0, Bandwidth::Mhz1), 0), 1.0);
        assert_eq!(channel.delivery_probability(&rate(Mcs::Mcs9, Bandwidth::Mhz4), 0), 0.0);
    }

    #[test]
    fn test_degrading_reaches_floor() {
        let channel = Channel::new(Profile::Degrading, ChannelOverrides::default(), 0.0, 1_000);
        assert_eq!(channel.snr_db(0), 24.0);
        assert_eq!(channel.snr_db(1_000), 2.0);
        assert_eq!(channel.snr_db(5_000), 2.0);
    }

    #[test]
    fn test_attempts_follow_probability() {
        let channel = Channel::new(Profile::Clean, ChannelOverrides::default(), 0.0, 1_000);
        let mut rng = SmallRng::seed_from_u64(5);
        let mcs0 = rate(Mcs::Mcs0, Bandwidth::Mhz1);
        assert!((0..100).all(|_| channel.attempt(&mcs0, 0, &mut rng)));
        let mcs9 = rate(Mcs::Mcs9, Bandwidth::Mhz4);
        assert!(!(0..100).any(|_| channel.attempt(&mcs9, 0, &mut rng)));
    }
}
