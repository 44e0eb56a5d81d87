use celeris_core::{
    BathymetrySpec, CelerisError, EquationMode, InitialCondition, KernelSources, OutputField, Scenario, Simulation,
    SimulationConfig,
};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Equations {
    Nlsw,
    Boussinesq,
    Coulwave,
}

impl From<Equations> for EquationMode {
    fn from(e: Equations) -> Self {
        match e {
            Equations::Nlsw => Self::Nlsw,
            Equations::Boussinesq => Self::Boussinesq,
            Equations::Coulwave => Self::Coulwave,
        }
    }
}

/// Headless Celeris wave simulation
#[derive(Parser, Debug)]
#[command(name = "celeris-headless")]
#[command(about = "Run a Celeris wave simulation without rendering", long_about = None)]
struct Args {
    /// Scenario JSON file (config, bathymetry, initial_condition)
    #[arg(short, long)]
    scenario: Option<PathBuf>,

    /// Directory with the WGSL kernels; runs on the CPU when omitted
    #[arg(short, long)]
    kernels: Option<PathBuf>,

    /// Number of frames to run
    #[arg(short, long, default_value_t = 100)]
    frames: u32,

    /// Grid size for the built-in basin scenario
    #[arg(long, default_value_t = 128)]
    size: u32,

    /// Still-water depth of the built-in basin in meters
    #[arg(long, default_value_t = 5.0)]
    depth: f32,

    /// Equation set for the built-in basin
    #[arg(short, long, value_enum, default_value_t = Equations::Boussinesq)]
    equations: Equations,

    /// Report every N frames
    #[arg(short, long, default_value_t = 10)]
    report_interval: u32,

    /// Write gauge time series as JSON to this file
    #[arg(short, long)]
    gauges: Option<PathBuf>,
}

fn basin_scenario(args: &Args) -> Scenario {
    let config = SimulationConfig {
        width: args.size,
        height: args.size,
        base_depth: args.depth,
        equation: args.equations.into(),
        ..SimulationConfig::default()
    };
    let centre = args.size as f32 * config.dx * 0.5;
    Scenario {
        config,
        bathymetry: BathymetrySpec::Flat { depth: args.depth },
        initial_condition: InitialCondition::GaussianBump {
            center_x: centre,
            center_y: centre,
            radius: args.size as f32 * 0.05,
            amplitude: 0.1 * args.depth,
        },
    }
}

fn run(args: &Args) -> Result<(), CelerisError> {
    let scenario = match &args.scenario {
        Some(path) => Scenario::load(path)?,
        None => basin_scenario(args),
    };
    let sources = args.kernels.as_ref().map(KernelSources::from_dir).transpose()?;
    let mut sim = Simulation::from_scenario(&scenario, sources)?;

    info!("=== Celeris Headless ===");
    info!(
        "Grid {}x{}, dx {:.2} m, dt {:.4} s, {:?} / {:?}",
        scenario.config.width,
        scenario.config.height,
        scenario.config.dx,
        scenario.config.dt(),
        scenario.config.equation,
        scenario.config.time_scheme
    );
    info!("Backend: {}", sim.backend_name());

    for frame in 1..=args.frames {
        let report = sim.run_frame()?;
        if frame % args.report_interval.max(1) == 0 || frame == args.frames {
            let eta = match sim.read_field_channel(OutputField::State, 0) {
                Ok(eta) => eta,
                Err(e) if !e.is_fatal() => {
                    warn!("Frame {}: {}", frame, e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let max_eta = eta.iter().copied().fold(f32::MIN, f32::max);
            let min_eta = eta.iter().copied().fold(f32::MAX, f32::min);
            info!(
                "Frame {:4}: t = {:8.3} s, steps {:6}, render_step {:3}, eta [{:.4}, {:.4}], {:.2} ms",
                frame,
                report.time,
                sim.step_count(),
                report.render_step,
                min_eta,
                max_eta,
                report.frame_ms
            );
        }
    }

    let timer = sim.frame_timer();
    info!(
        "Done: {} steps, {:.2} ms/frame, {:.3} ms/step, {:.1}x realtime",
        sim.step_count(),
        timer.average_frame_time_ms(),
        timer.average_step_time_ms(),
        timer.realtime_factor()
    );
    let stats = sim.backend_stats();
    info!(
        "Backend: {} dispatches, {} copies, {} submissions",
        stats.dispatches, stats.copies, stats.submissions
    );

    for series in sim.gauge_series() {
        if let Some(max) = series.max_eta() {
            info!("Gauge '{}' ({}, {}): max eta {:.4}", series.name, series.x, series.y, max);
        }
    }
    if let Some(path) = &args.gauges {
        let json = serde_json::to_string_pretty(sim.gauge_series())?;
        std::fs::write(path, json).map_err(|e| CelerisError::io(path, e))?;
        info!("Wrote gauge series to {}", path.display());
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }
}
