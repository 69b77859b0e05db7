use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::ValueEnum;
use halow_rc::{Bandwidth, Capabilities, GuardInterval, Mcs, RateControlConfig, SpatialStreams};
use serde::Deserialize;

use crate::channel::Profile;

#[derive(clap::Parser, Clone, Debug)]
#[clap(name = "HaLow rate control simulator")]
#[clap(version)]
pub struct Config {
    #[clap(subcommand)]
    pub sub_command: SubCommand,
    /// Log level; overrides `RUST_LOG` when given.
    #[arg(long, global = true, env = "RCSIM_LOG_LEVEL")]
    pub log_level: Option<tracing::level_filters::LevelFilter>,
}

#[derive(clap::Subcommand, Clone, Debug)]
pub enum SubCommand {
    /// Drive one or more stations over a simulated channel and report the outcome.
    Run(RunConfig),
    /// Print the rate rows a capability set enumerates.
    Rows(CapabilityArgs),
}

#[derive(clap::Parser, Clone, Debug)]
pub struct RunConfig {
    /// Seed for the channel and every station's lookaround generator.
    #[arg(long, default_value_t = 1)]
    pub seed: u64,
    /// Simulated duration in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    pub duration_ms: u64,
    /// Payload size of every frame, in bytes.
    #[arg(long, default_value_t = 512)]
    pub frame_size: usize,
    /// Number of associated stations sharing the medium.
    #[arg(long, default_value_t = 1)]
    pub stations: u64,
    /// SNR loss of each additional station relative to the first, dB.
    #[arg(long, default_value_t = 3.0)]
    pub station_spread_db: f64,
    /// Channel evolution over the run.
    #[arg(long, value_enum, default_value_t = Profile::Clean)]
    pub profile: Profile,
    /// Send A-MPDUs of this many subframes instead of single MPDUs.
    #[arg(long)]
    pub ampdu: Option<u32>,
    /// Statistics update period in milliseconds.
    #[arg(long, default_value_t = 100)]
    pub update_ms: u64,
    /// TOML file with `[rate-control]` and `[channel]` overrides.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Print each station's rate table at the end of the run.
    #[arg(long)]
    pub dump: bool,
    /// Output format of the summary.
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
    #[clap(flatten)]
    pub caps: CapabilityArgs,
}

#[derive(clap::Parser, Clone, Debug)]
pub struct CapabilityArgs {
    /// Highest regular MCS the peer supports.
    #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u8).range(0..=9))]
    pub max_mcs: u8,
    /// Also support the MCS10 duplicate mode at 1 MHz.
    #[arg(long)]
    pub mcs10: bool,
    /// Supported channel widths in MHz.
    #[arg(long, value_delimiter = ',', default_values_t = [1u32, 2, 4])]
    pub bandwidths: Vec<u32>,
    /// Number of spatial streams, all counts up to it are supported.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=4))]
    pub streams: u8,
    /// Allow the short guard interval at 2 MHz and wider.
    #[arg(long)]
    pub short_guard: bool,
    /// Retry-chain slots the hardware offers.
    #[arg(long, default_value_t = 4)]
    pub max_rates: usize,
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Plain,
}

impl CapabilityArgs {
    pub fn capabilities(&self) -> anyhow::Result<Capabilities> {
        let bandwidths = self
            .bandwidths
            .iter()
            .map(|mhz| {
                Bandwidth::ALL
                    .into_iter()
                    .find(|bw| bw.mhz() == *mhz)
                    .with_context(|| format!("unsupported bandwidth {mhz} MHz"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut mcs: Vec<Mcs> = (0..=usize::from(self.max_mcs))
            .filter_map(Mcs::from_index)
            .collect();
        if self.mcs10 {
            mcs.push(Mcs::Mcs10);
        }
        let streams = (0..usize::from(self.streams)).filter_map(SpatialStreams::from_index);

        let mut builder = Capabilities::builder()
            .mcs(mcs)
            .bandwidths(bandwidths.iter().copied())
            .streams(streams)
            .max_rates(self.max_rates);
        if self.short_guard {
            builder = builder.guards(GuardInterval::ALL).short_guard_at(
                bandwidths
                    .iter()
                    .copied()
                    .filter(|bw| *bw != Bandwidth::Mhz1),
            );
        }
        Ok(builder.build()?)
    }
}

/// Channel parameters a config file may override.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ChannelOverrides {
    /// SNR of the first station at the start of the run, dB.
    pub base_snr_db: f64,
    /// Width of the delivery ramp around each rate's SNR threshold, dB.
    pub ramp_db: f64,
    /// Amplitude of the fading profile, dB.
    pub fade_depth_db: f64,
    /// Period of the fading profile, ms.
    pub fade_period_ms: u64,
    /// SNR lost over the whole run by the degrading profile, dB.
    pub degradation_db: f64,
}

impl Default for ChannelOverrides {
    fn default() -> Self {
        Self {
            base_snr_db: 24.0,
            ramp_db: 4.0,
            fade_depth_db: 8.0,
            fade_period_ms: 4_000,
            degradation_db: 22.0,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SimFile {
    pub rate_control: RateControlConfig,
    pub channel: ChannelOverrides,
}

impl SimFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let file: Self =
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        file.rate_control.validate()?;
        Ok(file)
    }
}
