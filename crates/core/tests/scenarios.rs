//! End-to-end behavior of the public rate-control API.

use halow_rc::rate::{space, throughput};
use halow_rc::{
    station_rng, Bandwidth, Capabilities, GuardInterval, Mcs, PhyParams, RateControlConfig,
    RateControlError, RateTable, SpatialStreams, StabilityMode, Station,
};
use rstest::rstest;
use testresult::TestResult;

fn halow_1_to_8() -> Capabilities {
    Capabilities::builder()
        .mcs_up_to(Mcs::Mcs7)
        .bandwidths([Bandwidth::Mhz1, Bandwidth::Mhz2, Bandwidth::Mhz4, Bandwidth::Mhz8])
        .build()
        .unwrap()
}

#[rstest]
#[case::narrowband(
    Capabilities::builder()
        .mcs([Mcs::Mcs0, Mcs::Mcs1, Mcs::Mcs2, Mcs::Mcs10])
        .bandwidths([Bandwidth::Mhz1])
        .guards(GuardInterval::ALL)
        .build()
        .unwrap()
)]
#[case::short_guard_wide(
    Capabilities::builder()
        .mcs_up_to(Mcs::Mcs9)
        .bandwidths([Bandwidth::Mhz1, Bandwidth::Mhz4, Bandwidth::Mhz16])
        .guards(GuardInterval::ALL)
        .short_guard_at([Bandwidth::Mhz4])
        .build()
        .unwrap()
)]
#[case::multi_stream(
    Capabilities::builder()
        .mcs([Mcs::Mcs0, Mcs::Mcs3, Mcs::Mcs7, Mcs::Mcs10])
        .bandwidths([Bandwidth::Mhz2, Bandwidth::Mhz8])
        .streams([SpatialStreams::One, SpatialStreams::Three])
        .build()
        .unwrap()
)]
fn test_every_row_round_trips(#[case] caps: Capabilities) {
    let count = space::row_count(&caps);
    assert!(count > 0);
    for row in 0..count {
        let rate = space::decode(&caps, row);
        assert_eq!(rate.row().get(), row);
        assert_eq!(space::encode(&caps, &rate), Some(rate.row()), "{rate}");
    }
}

#[test]
fn test_mcs10_only_at_1mhz_single_stream() {
    let narrow = PhyParams::new(
        Mcs::Mcs10,
        Bandwidth::Mhz1,
        SpatialStreams::One,
        GuardInterval::Long,
    );
    assert!(space::validate_phy(&narrow));
    for bandwidth in [Bandwidth::Mhz2, Bandwidth::Mhz4, Bandwidth::Mhz8, Bandwidth::Mhz16] {
        assert!(!space::validate_phy(&PhyParams { bandwidth, ..narrow }));
    }
    for streams in [SpatialStreams::Two, SpatialStreams::Three, SpatialStreams::Four] {
        assert!(!space::validate_phy(&PhyParams { streams, ..narrow }));
    }
}

#[test]
fn test_estimate_never_drops_as_probability_rises() {
    let caps = halow_1_to_8();
    for rate in space::rows(&caps).filter(space::validate) {
        let mut previous = 0;
        for probability in 0..=100 {
            let estimate = throughput::estimated_bps(&rate, probability);
            assert!(estimate >= previous, "{rate} at {probability}%");
            previous = estimate;
        }
    }
}

#[test]
fn test_fresh_station_sends_single_robust_rate() -> TestResult {
    let station = Station::seeded(halow_1_to_8(), RateControlConfig::default(), 1)?;
    let chain = station.select(1500);
    assert_eq!(chain.len(), 1);
    let rate = chain.rates()[0];
    assert_eq!(rate.attempts().get(), 4);
    assert_eq!(rate.mcs(), Mcs::Mcs0);
    assert_eq!(rate.bandwidth(), Bandwidth::Mhz1);
    assert_eq!(rate.streams(), SpatialStreams::One);
    assert_eq!(rate.guard(), GuardInterval::Long);
    assert_eq!(station.mode(), StabilityMode::Init);
    Ok(())
}

#[test]
fn test_chain_always_within_budget() -> TestResult {
    let config = RateControlConfig::default();
    let budget = config.airtime_budget_us;
    let station = Station::seeded(halow_1_to_8(), config, 21)?;
    for frame in 0..2_000u32 {
        let size = [40usize, 300, 800, 1500, 4000][frame as usize % 5];
        let chain = station.select(size);
        assert!(!chain.is_empty());
        assert!(chain.len() <= 4);
        assert!(chain.airtime_us() <= budget, "{chain}");
        assert!(chain.iter().all(|rate| (1..=7).contains(&rate.attempts().get())));
        // feed back a mix so the table moves through its states
        let acked = frame % 3 != 0;
        station.report(&chain, chain.total_attempts().min(2), acked);
        if frame % 20 == 19 {
            station.update();
        }
    }
    Ok(())
}

#[test]
fn test_identical_seeds_replay_identically() -> TestResult {
    let run = |seed: u64| -> Result<Vec<String>, RateControlError> {
        let mut table = RateTable::with_sampler(
            halow_1_to_8(),
            RateControlConfig::default(),
            station_rng(seed, 4),
        )?;
        let mut chains = Vec::new();
        for frame in 0..400u32 {
            let candidates = table.select_rates(256);
            let chain = table.build_chain(&candidates);
            table.feedback(&chain, 1, frame % 4 != 0);
            chains.push(chain.to_string());
            if frame % 10 == 9 {
                table.periodic_update();
            }
        }
        Ok(chains)
    };
    assert_eq!(run(99)?, run(99)?);
    Ok(())
}

#[test]
fn test_fixed_rate_rejected_outside_capabilities() -> TestResult {
    let station = Station::seeded(halow_1_to_8(), RateControlConfig::default(), 1)?;
    let beyond = PhyParams::new(
        Mcs::Mcs9,
        Bandwidth::Mhz1,
        SpatialStreams::One,
        GuardInterval::Long,
    );
    assert!(matches!(
        station.set_fixed_rate(Some(beyond)),
        Err(RateControlError::UnsupportedRate(phy)) if phy == beyond
    ));

    let pinned = PhyParams::new(
        Mcs::Mcs4,
        Bandwidth::Mhz8,
        SpatialStreams::One,
        GuardInterval::Long,
    );
    station.set_fixed_rate(Some(pinned))?;
    let chain = station.select(100);
    assert_eq!(chain.len(), 1);
    assert_eq!(chain.rates()[0].phy(), pinned);
    Ok(())
}

#[test]
fn test_config_from_toml() -> TestResult {
    let config = RateControlConfig::from_toml_str(
        r#"
        airtime-budget-us = 12000
        lookaround-period-normal = 40
        rts-threshold = 1000
        "#,
    )?;
    assert_eq!(config.airtime_budget_us, 12_000);
    assert_eq!(config.lookaround_period_normal, 40);
    assert_eq!(config.lookaround_period_init, 5);
    assert_eq!(config.rts_threshold, Some(1000));

    let station = Station::seeded(halow_1_to_8(), config, 1)?;
    assert!(station.select(2000).rates()[0].uses_rts());
    Ok(())
}

#[test]
fn test_stats_dump_lists_used_rows() -> TestResult {
    let station = Station::seeded(halow_1_to_8(), RateControlConfig::default(), 1)?;
    // a lookaround is only due on the fifth selection after the first delivery
    for _ in 0..5 {
        let chain = station.select(500);
        station.report(&chain, 1, true);
    }
    station.update();
    let stats = station.snapshot();
    assert_eq!(stats.rows.len(), 1);
    assert_eq!(stats.rows[0].probability, 100);
    let dump = stats.to_string();
    assert!(dump.contains("MCS0/1MHz/1SS/LGI"), "{dump}");
    assert!(dump.starts_with("RC[init]"), "{dump}");
    Ok(())
}
