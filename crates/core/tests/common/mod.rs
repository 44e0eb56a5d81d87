//! Shared setup for the integration tests

#![allow(dead_code)]

use celeris_core::{
    Bathymetry, CpuBackend, EquationMode, InitialCondition, Simulation, SimulationConfig, TimeScheme,
};

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A `width` × `height` configuration on 1 m cells
pub fn config(width: u32, height: u32, equation: EquationMode) -> SimulationConfig {
    SimulationConfig {
        width,
        height,
        equation,
        ..SimulationConfig::default()
    }
}

pub fn euler(config: SimulationConfig) -> SimulationConfig {
    SimulationConfig {
        time_scheme: TimeScheme::Euler,
        ..config
    }
}

/// Gaussian hump of `amplitude` meters centred in the domain
pub fn centred_bump(config: &SimulationConfig, radius: f32, amplitude: f32) -> InitialCondition {
    InitialCondition::GaussianBump {
        center_x: (config.width / 2) as f32 * config.dx,
        center_y: (config.height / 2) as f32 * config.dy,
        radius,
        amplitude,
    }
}

/// Simulation over a flat bed on the CPU backend
pub fn flat_simulation(config: SimulationConfig, depth: f32, initial: InitialCondition) -> Simulation {
    let bathymetry = Bathymetry::flat(config.width, config.height, depth);
    Simulation::with_backend(config, bathymetry, initial, Box::new(CpuBackend::new())).unwrap()
}

/// Same as [`flat_simulation`], recording every dispatch
pub fn traced_simulation(config: SimulationConfig, depth: f32) -> Simulation {
    let bathymetry = Bathymetry::flat(config.width, config.height, depth);
    Simulation::with_backend(
        config,
        bathymetry,
        InitialCondition::Still,
        Box::new(CpuBackend::with_trace()),
    )
    .unwrap()
}

/// Whether `(x, y)` lies in the boundary margin of a `width` × `height` grid
pub fn in_margin(x: usize, y: usize, width: usize, height: usize) -> bool {
    let m = celeris_core::BOUNDARY_MARGIN as usize;
    x < m || y < m || x + m >= width || y + m >= height
}
