//! Virtual-time simulation loop.
//!
//! Stations take turns on the medium. Every frame advances the clock by the
//! airtime of the attempts it used plus a fixed access delay; the statistics
//! timer fires on the virtual clock, never on the wall clock.

use halow_rc::rate::throughput;
use halow_rc::{station_rng, Capabilities, RateControlConfig, RateTable, RetryChain, Station};
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::channel::Channel;
use crate::config::{ChannelOverrides, RunConfig};

/// Contention and inter-frame spacing charged once per frame, µs.
const ACCESS_DELAY_US: u64 = 160;

/// Outcome of one station over the run.
#[derive(Debug, Clone, Default)]
pub struct StationReport {
    pub station: u64,
    pub frames: u64,
    pub delivered: u64,
    pub attempts: u64,
    pub airtime_us: u64,
    /// Payload bytes acknowledged.
    pub payload_bytes: u64,
}

impl StationReport {
    pub fn delivery_ratio(&self) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        self.delivered as f64 / self.frames as f64
    }
}

pub struct SimStation {
    pub station: Station,
    pub channel: Channel,
    pub report: StationReport,
}

pub struct Simulation {
    stations: Vec<SimStation>,
    rng: SmallRng,
    frame_size: usize,
    ampdu: Option<u32>,
    update_us: u64,
    duration_us: u64,
    now_us: u64,
}

impl Simulation {
    pub fn new(
        run: &RunConfig,
        caps: Capabilities,
        config: RateControlConfig,
        channel: ChannelOverrides,
    ) -> anyhow::Result<Self> {
        let duration_us = run.duration_ms.saturating_mul(1_000);
        let stations = (0..run.stations.max(1))
            .map(|index| -> anyhow::Result<SimStation> {
                let table =
                    RateTable::with_sampler(caps, config.clone(), station_rng(run.seed, index))?;
                let offset_db = run.station_spread_db * index as f64;
                Ok(SimStation {
                    station: Station::from_table(table),
                    channel: Channel::new(run.profile, channel.clone(), offset_db, duration_us),
                    report: StationReport {
                        station: index,
                        ..StationReport::default()
                    },
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            stations,
            rng: SmallRng::seed_from_u64(run.seed),
            frame_size: run.frame_size,
            ampdu: run.ampdu.filter(|n| *n > 1),
            update_us: run.update_ms.max(1) * 1_000,
            duration_us,
            now_us: 0,
        })
    }

    pub fn run(mut self) -> Vec<SimStation> {
        let mut next_update = self.update_us;
        let mut turn = 0;
        while self.now_us < self.duration_us {
            let index = turn % self.stations.len();
            turn += 1;
            let elapsed = self.send_frame(index);
            self.now_us += elapsed + ACCESS_DELAY_US;

            while self.now_us >= next_update {
                for sim in &self.stations {
                    sim.station.update();
                }
                next_update += self.update_us;
            }
        }
        tracing::info!(
            stations = self.stations.len(),
            elapsed_ms = self.now_us / 1_000,
            "Simulation finished"
        );
        self.stations
    }

    /// Transmit one frame for station `index`; airtime consumed, µs.
    fn send_frame(&mut self, index: usize) -> u64 {
        let now = self.now_us;
        let frame_size = self.frame_size;
        let ampdu = self.ampdu;
        let Self { stations, rng, .. } = self;
        let sim = &mut stations[index];
        let chain = sim.station.select(frame_size);

        let outcome = match ampdu {
            None => transmit_single(&sim.channel, &chain, frame_size as u64, now, rng),
            Some(subframes) => {
                transmit_aggregate(&sim.channel, &chain, frame_size as u64, subframes, now, rng)
            }
        };
        match outcome.delivered {
            Delivery::Single(acked) => sim.station.report(&chain, outcome.attempts, acked),
            Delivery::Aggregate { success, failure } => {
                sim.station
                    .report_aggregate(&chain, outcome.attempts, success, failure)
            }
        }

        let report = &mut sim.report;
        report.frames += 1;
        report.attempts += u64::from(outcome.attempts);
        report.airtime_us += outcome.airtime_us;
        let delivered_mpdus = match outcome.delivered {
            Delivery::Single(acked) => u64::from(acked),
            Delivery::Aggregate { success, .. } => u64::from(success),
        };
        if delivered_mpdus > 0 {
            report.delivered += 1;
            report.payload_bytes += delivered_mpdus * frame_size as u64;
        }
        outcome.airtime_us
    }
}

#[derive(Debug, Clone, Copy)]
enum Delivery {
    Single(bool),
    Aggregate { success: u32, failure: u32 },
}

#[derive(Debug, Clone, Copy)]
struct Outcome {
    attempts: u32,
    airtime_us: u64,
    delivered: Delivery,
}

/// Airtime of one attempt at `rate` carrying `bytes`, scaled from the
/// reference payload.
fn attempt_airtime_us(rate: &halow_rc::Rate, bytes: u64) -> u64 {
    let reference = u64::from(throughput::REFERENCE_PAYLOAD_BYTES);
    let per_reference = u64::from(throughput::tx_time_us(&rate.phy()));
    (per_reference * bytes).div_ceil(reference)
}

fn transmit_single(
    channel: &Channel,
    chain: &RetryChain,
    bytes: u64,
    now: u64,
    rng: &mut SmallRng,
) -> Outcome {
    let mut attempts = 0;
    let mut airtime_us = 0;
    for rate in chain.iter() {
        for _ in 0..rate.attempts().get() {
            attempts += 1;
            airtime_us += attempt_airtime_us(rate, bytes);
            if channel.attempt(rate, now + airtime_us, rng) {
                return Outcome {
                    attempts,
                    airtime_us,
                    delivered: Delivery::Single(true),
                };
            }
        }
    }
    Outcome {
        attempts,
        airtime_us,
        delivered: Delivery::Single(false),
    }
}

/// An A-MPDU is retried as a whole until at least one subframe is
/// block-acked; the block ack then reports every subframe.
fn transmit_aggregate(
    channel: &Channel,
    chain: &RetryChain,
    bytes: u64,
    subframes: u32,
    now: u64,
    rng: &mut SmallRng,
) -> Outcome {
    let mut attempts = 0;
    let mut airtime_us = 0;
    for rate in chain.iter() {
        for _ in 0..rate.attempts().get() {
            attempts += 1;
            airtime_us += attempt_airtime_us(rate, bytes * u64::from(subframes));
            let p = channel.delivery_probability(rate, now + airtime_us);
            let success = (0..subframes).filter(|_| rng.random_bool(p)).count() as u32;
            if success > 0 {
                return Outcome {
                    attempts,
                    airtime_us,
                    delivered: Delivery::Aggregate {
                        success,
                        failure: subframes - success,
                    },
                };
            }
        }
    }
    Outcome {
        attempts,
        airtime_us,
        delivered: Delivery::Aggregate {
            success: 0,
            failure: subframes,
        },
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use rstest::rstest;

    use super::*;
    use crate::channel::Profile;
    use crate::config::{Config, SubCommand};

    fn run_config(args: &[&str]) -> RunConfig {
        let mut argv = vec!["rcsim", "run"];
        argv.extend_from_slice(args);
        match Config::parse_from(argv).sub_command {
            SubCommand::Run(run) => run,
            SubCommand::Rows(_) => unreachable!(),
        }
    }

    fn simulate(run: &RunConfig) -> Vec<SimStation> {
        let caps = run.caps.capabilities().unwrap();
        Simulation::new(run, caps, RateControlConfig::default(), ChannelOverrides::default())
            .unwrap()
            .run()
    }

    #[rstest]
    #[case::single(&[])]
    #[case::aggregate(&["--ampdu", "8"])]
    fn test_clean_channel_delivers(#[case] extra: &[&str]) {
        let mut args = vec!["--duration-ms", "5000"];
        args.extend_from_slice(extra);
        let run = run_config(&args);
        assert_eq!(run.profile, Profile::Clean);
        let stations = simulate(&run);
        let report = &stations[0].report;
        assert!(report.frames > 20);
        assert!(report.delivery_ratio() > 0.9, "{report:?}");
        assert!(stations[0].station.snapshot().initialized);
    }

    #[test]
    fn test_same_seed_same_outcome() {
        let run = run_config(&["--duration-ms", "2000", "--profile", "fading", "--stations", "2"]);
        let first: Vec<_> = simulate(&run).into_iter().map(|s| s.report.payload_bytes).collect();
        let second: Vec<_> = simulate(&run).into_iter().map(|s| s.report.payload_bytes).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_attempt_airtime_scales_with_payload() {
        let caps = Capabilities::builder()
            .mcs_up_to(halow_rc::Mcs::Mcs3)
            .bandwidths([halow_rc::Bandwidth::Mhz1])
            .build()
            .unwrap();
        let rate = halow_rc::rate::space::decode(&caps, 0);
        assert_eq!(attempt_airtime_us(&rate, 64), 1_720);
        assert_eq!(attempt_airtime_us(&rate, 128), 3_440);
    }
}
