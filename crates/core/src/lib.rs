//! Celeris wave solver core
//!
//! Orchestrates a finite-volume solver for nonlinear shallow-water and
//! Boussinesq-type wave propagation on a compute device. The crate owns the
//! parts that need careful ordering and bookkeeping:
//!
//! - a field store of four-channel grids with generation-tagged handles
//! - binding contracts for every compute kernel, validated when passes are prepared
//! - typed 256-byte uniform blocks with a versioned layout
//! - the predictor/corrector time-step state machine over a fixed stage list
//! - a parallel cyclic reduction solver for the implicit dispersion correction
//! - an adaptive controller for the number of steps per rendered frame
//!
//! Kernels run on a [`backend::ComputeBackend`]: the wgpu backend dispatches
//! externally supplied WGSL shaders, the CPU backend runs reference kernels in
//! [`kernels`] and always works.
//!
//! ## Quick start
//!
//! ```no_run
//! use celeris_core::{Bathymetry, InitialCondition, Simulation, SimulationConfig};
//!
//! let config = SimulationConfig {
//!     width: 128,
//!     height: 64,
//!     ..SimulationConfig::default()
//! };
//! let bathymetry = Bathymetry::flat(128, 64, 10.0);
//! let mut sim = Simulation::new(config, bathymetry, InitialCondition::Still, None)?;
//! for _ in 0..60 {
//!     sim.run_frame()?;
//! }
//! let eta = sim.read_field_channel(celeris_core::OutputField::State, 0)?;
//! # Ok::<(), celeris_core::CelerisError>(())
//! ```

pub mod backend;
pub mod bathymetry;
pub mod cadence;
pub mod config;
pub mod error;
pub mod field;
pub mod kernel;
pub mod kernels;
pub mod orchestrator;
pub mod params;
pub mod pcr;
pub mod profiler;
pub mod statistics;
pub mod timeseries;

/// Edge length of the square thread tile every kernel is dispatched in
pub const TILE_SIZE: u32 = 16;

/// Cells along each domain edge handled by the boundary pass
pub const BOUNDARY_MARGIN: u32 = 3;

pub use backend::{create_backend, ComputeBackend, CpuBackend, KernelSources};
pub use bathymetry::{Bathymetry, BathymetrySpec, InitialCondition, Scenario};
pub use cadence::{CadenceController, CadenceDecision};
pub use config::{
    apply_config_patch, BoundaryType, ConfigPatch, EquationMode, PatchOutcome, SimulationConfig,
    TimeScheme,
};
pub use error::{CelerisError, CelerisResult};
pub use field::{DoubleBuffered, FieldData, FieldDesc, FieldHandle, GradientHistory};
pub use kernel::KernelId;
pub use orchestrator::{FrameReport, OutputField, Phase, Simulation, Stage};
pub use pcr::{SolveCapture, TridiagSolver};
pub use timeseries::GaugeSeries;
