//! Running statistics and time-series gauges

mod common;

use approx::assert_relative_eq;
use celeris_core::config::GaugeLocation;
use celeris_core::field::{FieldData, FieldDesc};
use celeris_core::params::ParamBuilder;
use celeris_core::statistics::Statistics;
use celeris_core::{ComputeBackend, CpuBackend, EquationMode, InitialCondition, OutputField, SimulationConfig};
use common::{centred_bump, config, flat_simulation};

/// Fold eta = 0, 1, ..., n-1 into fresh statistics
fn accumulate_ramp(n: u32) -> (FieldData, FieldData, u32) {
    let etas: Vec<f32> = (0..n).map(|k| k as f32).collect();
    accumulate(&etas)
}

/// Fold one uniform state (eta, 2 eta, -eta, 0) per entry of `etas`
fn accumulate(etas: &[f32]) -> (FieldData, FieldData, u32) {
    let cfg = SimulationConfig {
        width: 8,
        height: 8,
        ..SimulationConfig::default()
    };
    let params = ParamBuilder::new(&cfg);
    let mut backend = CpuBackend::new();
    let state = backend.create_field(FieldDesc::grid("state", 8, 8)).unwrap();
    let zero = backend.create_field(FieldDesc::grid("zero", 8, 8)).unwrap();
    let mut stats = Statistics::allocate(&mut backend, (8, 8), state, zero).unwrap();
    for &eta in etas {
        backend
            .upload_field(state, &FieldData::with_value(8, 8, [eta, 2.0 * eta, -eta, 0.0]))
            .unwrap();
        stats.accumulate(&mut backend, &params).unwrap();
    }
    let means = backend.read_field(stats.means()).unwrap();
    let heights = backend.read_field(stats.wave_stats()).unwrap();
    (means, heights, stats.mean_samples())
}

#[test]
fn test_means_before_any_sample_are_zero() {
    let (means, heights, samples) = accumulate_ramp(0);
    assert_eq!(samples, 0);
    assert!(means.data.iter().all(|t| *t == [0.0; 4]));
    assert!(heights.data.iter().all(|t| *t == [0.0; 4]));
}

#[test]
fn test_means_after_one_sample_equal_it() {
    let (means, heights, samples) = accumulate(&[0.75]);
    assert_eq!(samples, 1);
    let m = means.get(3, 5);
    assert_relative_eq!(m[0], 0.75, max_relative = 1e-6);
    assert_relative_eq!(m[1], 1.5, max_relative = 1e-6);
    assert_relative_eq!(m[2], -0.75, max_relative = 1e-6);
    assert_relative_eq!(m[3], 0.5625, max_relative = 1e-6);
    assert_eq!(heights.get(3, 5), [0.75, 0.75, 0.0, 0.0]);
}

#[test]
fn test_means_after_ten_samples() {
    let (means, heights, samples) = accumulate_ramp(10);
    assert_eq!(samples, 10);
    let m = means.get(4, 4);
    assert_relative_eq!(m[0], 4.5, max_relative = 1e-5);
    assert_relative_eq!(m[1], 9.0, max_relative = 1e-5);
    assert_relative_eq!(m[2], -4.5, max_relative = 1e-5);
    // Mean of k^2 for k < 10
    assert_relative_eq!(m[3], 28.5, max_relative = 1e-5);

    let h = heights.get(4, 4);
    assert_eq!((h[0], h[1], h[3]), (9.0, 0.0, 9.0));
    // Variance (n^2 - 1) / 12
    assert_relative_eq!(h[2], 4.0 * 8.25_f32.sqrt(), max_relative = 1e-4);
}

#[test]
fn test_means_after_a_thousand_samples() {
    let (means, heights, samples) = accumulate_ramp(1000);
    assert_eq!(samples, 1000);
    let m = means.get(0, 7);
    assert_relative_eq!(m[0], 499.5, max_relative = 1e-4);
    assert_relative_eq!(m[3], 332_833.5, max_relative = 1e-4);
    assert_eq!(heights.get(0, 7)[0], 999.0);
}

#[test]
fn test_simulation_statistics_count_steps_and_reset() {
    let cfg = config(16, 16, EquationMode::Nlsw);
    let bump = centred_bump(&cfg, 2.0, 0.05);
    let mut sim = flat_simulation(cfg, 1.0, bump);
    for _ in 0..5 {
        sim.step().unwrap();
    }
    assert_eq!(sim.statistics_samples(), 5);
    let heights = sim.read_field_channel(OutputField::WaveHeight, 3).unwrap();
    assert!(heights.iter().any(|&range| range > 0.0));

    sim.reset_statistics().unwrap();
    assert_eq!(sim.statistics_samples(), 0);
    let means = sim.read_field_channel(OutputField::Means, 0).unwrap();
    assert!(means.iter().all(|&m| m == 0.0));
}

#[test]
fn test_gauges_record_one_sample_per_frame() {
    let mut cfg = config(24, 24, EquationMode::Nlsw);
    cfg.render_step = 3;
    cfg.gauges = vec![
        GaugeLocation {
            name: "centre".into(),
            x: 12,
            y: 12,
        },
        GaugeLocation {
            name: String::new(),
            x: 5,
            y: 20,
        },
    ];
    let bump = centred_bump(&cfg, 2.0, 0.1);
    let mut sim = flat_simulation(cfg, 1.5, bump);
    assert!(sim.gauge_series().iter().all(|s| s.samples.is_empty()));

    sim.run_frame().unwrap();
    let report = sim.run_frame().unwrap();

    let series = sim.gauge_series();
    assert_eq!(series.len(), 2);
    assert_eq!(series[0].name, "centre");
    assert_eq!(series[1].name, "gauge_1");
    assert_eq!(series[0].samples.len(), 2);
    let last = series[0].samples[1];
    assert_eq!(last.time, report.time);
    assert_eq!(last.bottom, -1.5);
    assert!(last.depth() > 1.4);

    let state = sim.read_field(OutputField::State).unwrap();
    assert_eq!(last.eta, state.get(12, 12)[0]);
}

#[test]
fn test_simulation_without_gauges_has_no_series() {
    let mut sim = flat_simulation(config(16, 16, EquationMode::Nlsw), 1.0, InitialCondition::Still);
    sim.run_frame().unwrap();
    assert!(sim.gauge_series().is_empty());
}
