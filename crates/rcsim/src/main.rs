use clap::Parser;
use halow_rc::rate::{space, throughput};
use prettytable::{Cell, Row, Table};

mod channel;
mod config;
mod simulation;

use crate::{
    config::{CapabilityArgs, Config, OutputFormat, RunConfig, SimFile, SubCommand},
    simulation::{SimStation, Simulation},
};

fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    halow_rc::config::set_logger(config.log_level);
    match config.sub_command {
        SubCommand::Run(run) => run_simulation(run),
        SubCommand::Rows(caps) => print_rows(&caps),
    }
}

fn run_simulation(run: RunConfig) -> anyhow::Result<()> {
    let caps = run.caps.capabilities()?;
    let file = match &run.config {
        Some(path) => SimFile::load(path)?,
        None => SimFile::default(),
    };
    tracing::info!(
        seed = run.seed,
        stations = run.stations,
        profile = ?run.profile,
        rows = space::row_count(&caps),
        "Starting simulation"
    );
    let stations = Simulation::new(&run, caps, file.rate_control, file.channel)?.run();

    match run.format {
        OutputFormat::Table => summary_table(&stations).printstd(),
        OutputFormat::Plain => {
            for sim in &stations {
                let report = &sim.report;
                println!(
                    "station={} frames={} delivered={} attempts={} goodput_kbps={:.1} \
                     best={} mode={}",
                    report.station,
                    report.frames,
                    report.delivered,
                    report.attempts,
                    goodput_kbps(sim, run.duration_ms),
                    sim.station.best(),
                    sim.station.mode(),
                );
            }
        }
    }
    if run.dump {
        for sim in &stations {
            println!("\n=== Station {} ===", sim.report.station);
            print!("{}", sim.station.snapshot());
        }
    }
    Ok(())
}

fn goodput_kbps(sim: &SimStation, duration_ms: u64) -> f64 {
    if duration_ms == 0 {
        return 0.0;
    }
    (sim.report.payload_bytes * 8) as f64 / duration_ms as f64
}

fn summary_table(stations: &[SimStation]) -> Table {
    let mut table = Table::new();
    table.add_row(Row::new(vec![
        Cell::new("Station"),
        Cell::new("Frames"),
        Cell::new("Delivered"),
        Cell::new("Attempts/frame"),
        Cell::new("Airtime (ms)"),
        Cell::new("Payload (kB)"),
        Cell::new("Best"),
        Cell::new("Mode"),
        Cell::new("Lookarounds"),
    ]));
    for sim in stations {
        let report = &sim.report;
        let stats = sim.station.snapshot();
        let per_frame = if report.frames == 0 {
            0.0
        } else {
            report.attempts as f64 / report.frames as f64
        };
        table.add_row(Row::new(vec![
            Cell::new(&report.station.to_string()),
            Cell::new(&report.frames.to_string()),
            Cell::new(&format!("{:.1}%", report.delivery_ratio() * 100.0)),
            Cell::new(&format!("{per_frame:.2}")),
            Cell::new(&(report.airtime_us / 1_000).to_string()),
            Cell::new(&(report.payload_bytes / 1_000).to_string()),
            Cell::new(&stats.best.phy().to_string()),
            Cell::new(&stats.mode.to_string()),
            Cell::new(&stats.lookarounds.to_string()),
        ]));
    }
    table
}

fn print_rows(args: &CapabilityArgs) -> anyhow::Result<()> {
    let caps = args.capabilities()?;
    let mut table = Table::new();
    table.add_row(Row::new(vec![
        Cell::new("Row"),
        Cell::new("Rate"),
        Cell::new("Valid"),
        Cell::new("Nominal"),
        Cell::new("Airtime (us)"),
    ]));
    for rate in space::rows(&caps) {
        let phy = rate.phy();
        let valid = if rate.is_guard_coerced() {
            "alias"
        } else if space::validate(&rate) {
            "yes"
        } else {
            "no"
        };
        table.add_row(Row::new(vec![
            Cell::new(&rate.row().to_string()),
            Cell::new(&phy.to_string()),
            Cell::new(valid),
            Cell::new(&format!(
                "{:.1} kb/s",
                f64::from(throughput::theoretical_bps(&phy)) / 1_000.0
            )),
            Cell::new(&throughput::tx_time_us(&phy).to_string()),
        ]));
    }
    table.printstd();
    Ok(())
}
