//! Adaptive cadence under noisy and steady timings

mod common;

use celeris_core::config::CadenceConfig;
use celeris_core::{CadenceController, CadenceDecision};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

fn tuning(max_render_step: u32) -> CadenceConfig {
    CadenceConfig {
        max_render_step,
        ..CadenceConfig::default()
    }
}

#[test]
fn test_render_step_stays_in_bounds_under_noise() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut controller = CadenceController::new(tuning(40), 20);
    let mut previous = controller.render_step();
    for _ in 0..10_000 {
        let per_step = rng.random_range(1.0e-6..1.0e-3);
        controller.evaluate(per_step);
        let step = controller.render_step();
        assert!((1..=40).contains(&step), "render_step {step}");
        assert!(step.abs_diff(previous) <= 1, "jumped from {previous} to {step}");
        previous = step;
    }
}

#[test]
fn test_steady_timing_probes_up_to_the_cap() {
    let mut controller = CadenceController::new(tuning(25), 20);
    for _ in 0..2_000 {
        controller.evaluate(1.0e-4);
    }
    assert_eq!(controller.render_step(), 25);
    assert_eq!(controller.evaluate(1.0e-4), CadenceDecision::Hold);
}

#[test]
fn test_sustained_slowdown_bottoms_out_at_one() {
    let mut controller = CadenceController::new(tuning(1000), 5);
    let mut per_step = 1.0e-6;
    for _ in 0..50 {
        per_step *= 1.5;
        controller.evaluate(per_step);
    }
    assert_eq!(controller.render_step(), 1);
}

#[test]
fn test_frames_close_windows_by_wall_time() {
    let mut controller = CadenceController::new(tuning(100), 10);
    let start = Instant::now();
    assert_eq!(controller.record_frame(start, 10), None);
    // Ten frames of 0.1 s close the one-second window
    let mut decisions = 0;
    for frame in 1..=30 {
        let now = start + Duration::from_millis(100 * frame);
        if controller.record_frame(now, 10).is_some() {
            decisions += 1;
        }
    }
    assert_eq!(decisions, 3);
    assert!((1..=100).contains(&controller.render_step()));
}
