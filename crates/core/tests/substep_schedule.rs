//! Dispatch order of full steps per equation set and time scheme

mod common;

use celeris_core::backend::TraceEvent;
use celeris_core::config::DisturbanceSource;
use celeris_core::{EquationMode, KernelId, Simulation, TimeScheme};
use common::{config, euler, traced_simulation};

fn dispatched(sim: &mut Simulation) -> Vec<KernelId> {
    sim.take_trace()
        .into_iter()
        .filter_map(|e| match e {
            TraceEvent::Dispatch { kernel, .. } => Some(kernel),
            _ => None,
        })
        .collect()
}

fn one_step(mut sim: Simulation) -> Vec<KernelId> {
    sim.take_trace();
    sim.step().unwrap();
    dispatched(&mut sim)
}

fn pcr_iterations() -> Vec<KernelId> {
    // log2(16) iterations per direction
    let mut kernels = vec![KernelId::TridiagX; 4];
    kernels.extend([KernelId::TridiagY; 4]);
    kernels
}

#[test]
fn test_boussinesq_step_solves_then_reapplies_boundaries() {
    let sim = traced_simulation(euler(config(16, 16, EquationMode::Boussinesq)), 1.0);
    let mut expected = vec![
        KernelId::NearDry,
        KernelId::Reconstruct,
        KernelId::Flux,
        KernelId::UpdateBoussinesq,
        KernelId::Boundary,
    ];
    expected.extend(pcr_iterations());
    expected.extend([KernelId::Boundary, KernelId::CalcMeans, KernelId::CalcWaveHeight]);
    assert_eq!(one_step(sim), expected);
}

#[test]
fn test_fully_nonlinear_step_with_breaking_and_sediment() {
    let mut cfg = euler(config(16, 16, EquationMode::Coulwave));
    cfg.breaking.enabled = true;
    cfg.sediment.enabled = true;
    let sim = traced_simulation(cfg, 1.0);

    let mut expected = vec![
        KernelId::NearDry,
        KernelId::Reconstruct,
        KernelId::SedimentReconstruct,
        KernelId::Flux,
        KernelId::SedimentFlux,
        KernelId::Breaking,
        KernelId::DispersionAux,
        KernelId::DispersionGroup,
        KernelId::UpdateCoulwave,
        KernelId::SedimentUpdate,
        KernelId::SedimentBoundary,
        KernelId::Boundary,
        KernelId::TridiagCoef,
    ];
    expected.extend(pcr_iterations());
    expected.extend([
        KernelId::Boundary,
        KernelId::SedimentBed,
        KernelId::CalcMeans,
        KernelId::CalcWaveHeight,
    ]);
    assert_eq!(one_step(sim), expected);
}

#[test]
fn test_predictor_corrector_runs_two_substeps() {
    let cfg = config(16, 16, EquationMode::Boussinesq);
    assert_eq!(cfg.time_scheme, TimeScheme::PredictorCorrector);
    let kernels = one_step(traced_simulation(cfg, 1.0));

    let count = |k: KernelId| kernels.iter().filter(|&&x| x == k).count();
    assert_eq!(count(KernelId::UpdateBoussinesq), 2);
    assert_eq!(count(KernelId::Boundary), 4);
    assert_eq!(count(KernelId::TridiagX), 8);
    assert_eq!(count(KernelId::CalcMeans), 1);
}

#[test]
fn test_disturbance_runs_once_per_step_while_playing() {
    let mut cfg = config(16, 16, EquationMode::Nlsw);
    cfg.disturbances.push(DisturbanceSource {
        center_x: 8.0,
        center_y: 8.0,
        radius: 2.0,
        amplitude: 0.5,
        start_time: 0.0,
        duration: 10.0,
    });
    let mut sim = traced_simulation(cfg, 1.0);
    sim.take_trace();
    for _ in 0..3 {
        sim.step().unwrap();
    }
    let kernels = dispatched(&mut sim);
    assert_eq!(kernels.iter().filter(|&&k| k == KernelId::Disturbance).count(), 3);
}

#[test]
fn test_bed_change_refreshes_boussinesq_coefficients() {
    let mut cfg = euler(config(16, 16, EquationMode::Boussinesq));
    cfg.sediment.enabled = true;
    let mut sim = traced_simulation(cfg, 1.0);
    sim.take_trace();
    sim.step().unwrap();
    sim.step().unwrap();
    let kernels = dispatched(&mut sim);
    // The first step sees fresh coefficients; its bed update makes them stale
    assert_eq!(kernels.iter().filter(|&&k| k == KernelId::TridiagCoef).count(), 1);
}

#[test]
fn test_every_pcr_iteration_is_submitted() {
    let mut sim = traced_simulation(euler(config(16, 16, EquationMode::Boussinesq)), 1.0);
    sim.take_trace();
    sim.step().unwrap();
    let trace = sim.take_trace();
    for (i, event) in trace.iter().enumerate() {
        if let TraceEvent::Dispatch {
            kernel: KernelId::TridiagX | KernelId::TridiagY,
            ..
        } = event
        {
            assert!(matches!(trace[i + 1], TraceEvent::Copy { .. }));
            assert_eq!(trace[i + 2], TraceEvent::Submit);
        }
    }
}
