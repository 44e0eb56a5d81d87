//! Time-step orchestration
//!
//! [`Simulation`] owns the configuration, the backend and every field, and
//! advances the state one frame at a time. A frame runs `render_step` full
//! steps; a full step runs one sub-step per phase of the time scheme (the
//! predictor, plus a corrector for the predictor-corrector scheme) following
//! [`SUBSTEP_SCHEDULE`], then shifts the derivative histories and folds the new
//! state into the running statistics.

mod fields;
mod passes;
mod schedule;

pub use fields::{FieldSet, SedimentFields};
pub use passes::{update_kernel, DispersionPasses, PassTable, SedimentPasses};
pub use schedule::{active_stages, ScheduledStage, Stage, StageContext, SUBSTEP_SCHEDULE};

use crate::backend::{create_backend, BackendStats, ComputeBackend, KernelSources, TraceEvent};
use crate::bathymetry::{Bathymetry, InitialCondition, Scenario};
use crate::cadence::{CadenceController, CadenceDecision};
use crate::config::{ConfigPatch, EquationMode, PatchOutcome, SimulationConfig, TimeScheme};
use crate::error::{CelerisError, CelerisResult};
use crate::field::{FieldData, FieldHandle};
use crate::params::{ParamBuilder, UniformBlock};
use crate::pcr::{SolveCapture, SolverBindings, TridiagSolver};
use crate::profiler::{FrameTimer, ProfilerScope};
use crate::statistics::Statistics;
use crate::timeseries::{GaugeRecorder, GaugeSeries};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Sub-step of a full time step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u32)]
pub enum Phase {
    Predictor = 1,
    Corrector = 2,
}

impl Phase {
    /// Uniform encoding of the phase
    #[must_use]
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// Fields exposed for readback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputField {
    /// (eta, P, Q, C)
    State,
    /// (B north face, B east face, B centre, near-land flag)
    Bottom,
    /// (h, near-dry flag, minimum neighbour depth, 0)
    NearDry,
    /// (eddy viscosity, age, foam, 0)
    Breaking,
    /// Running means of (eta, P, Q, eta^2)
    Means,
    /// (max eta, min eta, significant height, max - min)
    WaveHeight,
    /// Suspended sediment concentration
    Sediment,
}

/// Summary of one [`Simulation::run_frame`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameReport {
    /// Full steps run by this frame
    pub steps: u32,
    /// Steps the next frame will run
    pub render_step: u32,
    /// Simulation time after the frame
    pub time: f64,
    /// Wall time of the frame
    pub frame_ms: f64,
    #[serde(skip)]
    pub cadence: Option<CadenceDecision>,
}

/// Everything allocated for one field layout
#[derive(Debug)]
struct Allocation {
    fields: FieldSet,
    passes: PassTable,
    solver: TridiagSolver,
    statistics: Statistics,
    gauges: Option<GaugeRecorder>,
}

impl Allocation {
    fn build(
        backend: &mut dyn ComputeBackend,
        config: &SimulationConfig,
        bathymetry: &Bathymetry,
        initial: &InitialCondition,
        params: &ParamBuilder,
    ) -> CelerisResult<Self> {
        let domain = (config.width, config.height);
        backend.destroy_all();

        let fields = FieldSet::allocate(backend, config)?;
        let solver = TridiagSolver::allocate(
            backend,
            config,
            SolverBindings {
                provisional: fields.provisional.current(),
                next_state: fields.new_state.current(),
                state: fields.provisional.current(),
                bottom: fields.bottom.current(),
                near_dry: fields.near_dry,
            },
        )?;
        let statistics = Statistics::allocate(backend, domain, fields.state, fields.zero)?;
        let gauges = if config.gauges.is_empty() {
            None
        } else {
            Some(GaugeRecorder::allocate(
                backend,
                domain,
                &config.gauges,
                fields.state,
                fields.bottom.current(),
            )?)
        };
        let passes = PassTable::prepare(backend, config, &fields)?;

        let resampled;
        let bathymetry = if (bathymetry.width(), bathymetry.height()) == domain {
            bathymetry
        } else {
            debug!(
                "Resampling {}x{} bathymetry to {}x{}",
                bathymetry.width(),
                bathymetry.height(),
                config.width,
                config.height
            );
            resampled = bathymetry.resampled(config.width, config.height);
            &resampled
        };
        backend.upload_field(fields.bottom.current(), &bathymetry.to_bottom_field())?;
        let state = initial.to_state(bathymetry, config);
        for target in [
            fields.state,
            fields.state_star,
            fields.provisional.current(),
            fields.new_state.current(),
        ] {
            backend.upload_field(target, &state)?;
        }

        let mut waves = FieldData::new(config.waves.len().max(1), 1);
        for (i, wave) in config.waves.iter().enumerate() {
            waves.set(i, 0, [wave.amplitude, wave.period, wave.direction, wave.phase]);
        }
        backend.upload_field(fields.waves, &waves)?;

        let mut allocation = Self {
            fields,
            passes,
            solver,
            statistics,
            gauges,
        };
        backend.run_pass(&allocation.passes.near_dry, &UniformBlock::pack(&params.depth()))?;
        allocation
            .solver
            .refresh_coefficients(backend, params, config.equation == EquationMode::Coulwave)?;
        backend.submit()?;
        Ok(allocation)
    }
}

/// A running simulation
pub struct Simulation {
    config: SimulationConfig,
    bathymetry: Bathymetry,
    initial: InitialCondition,
    backend: Box<dyn ComputeBackend>,
    params: ParamBuilder,
    alloc: Allocation,
    cadence: CadenceController,
    timer: FrameTimer,
    step: u64,
    time: f64,
    paused: bool,
    coefficients_stale: bool,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("backend", &self.backend.name())
            .field("width", &self.config.width)
            .field("height", &self.config.height)
            .field("equation", &self.config.equation)
            .field("step", &self.step)
            .field("time", &self.time)
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Create a simulation on the best available backend
    ///
    /// # Errors
    /// Returns [`CelerisError::Config`] for an invalid configuration, or any
    /// allocation or binding error raised while building the field set
    pub fn new(
        config: SimulationConfig,
        bathymetry: Bathymetry,
        initial: InitialCondition,
        sources: Option<KernelSources>,
    ) -> CelerisResult<Self> {
        config.validate()?;
        let backend = create_backend(&config, sources);
        Self::with_backend(config, bathymetry, initial, backend)
    }

    /// Create a simulation from a parsed scenario
    ///
    /// # Errors
    /// See [`Simulation::new`]
    pub fn from_scenario(scenario: &Scenario, sources: Option<KernelSources>) -> CelerisResult<Self> {
        let bathymetry = scenario.build_bathymetry()?;
        Self::new(
            scenario.config.clone(),
            bathymetry,
            scenario.initial_condition,
            sources,
        )
    }

    /// Create a simulation on an explicit backend
    ///
    /// # Errors
    /// See [`Simulation::new`]
    pub fn with_backend(
        config: SimulationConfig,
        bathymetry: Bathymetry,
        initial: InitialCondition,
        mut backend: Box<dyn ComputeBackend>,
    ) -> CelerisResult<Self> {
        config.validate()?;
        let params = ParamBuilder::new(&config);
        let alloc = Allocation::build(backend.as_mut(), &config, &bathymetry, &initial, &params)?;
        info!(
            "Simulation initialised: {}x{} {:?}/{:?} on {} (dt = {:.5} s)",
            config.width,
            config.height,
            config.equation,
            config.time_scheme,
            backend.name(),
            params.derived().dt
        );
        Ok(Self {
            cadence: CadenceController::new(config.cadence, config.render_step),
            config,
            bathymetry,
            initial,
            backend,
            params,
            alloc,
            timer: FrameTimer::new(),
            step: 0,
            time: 0.0,
            paused: false,
            coefficients_stale: false,
        })
    }

    /// Release every field and reallocate from the current configuration
    ///
    /// Time, step count and statistics restart from zero.
    ///
    /// # Errors
    /// Propagates allocation and binding errors
    pub fn reinitialize(&mut self) -> CelerisResult<()> {
        self.params = ParamBuilder::new(&self.config);
        self.alloc = Allocation::build(
            self.backend.as_mut(),
            &self.config,
            &self.bathymetry,
            &self.initial,
            &self.params,
        )?;
        self.cadence = CadenceController::new(self.config.cadence, self.config.render_step);
        self.step = 0;
        self.time = 0.0;
        self.coefficients_stale = false;
        info!(
            "Simulation reinitialised: {}x{} {:?}",
            self.config.width, self.config.height, self.config.equation
        );
        Ok(())
    }

    /// Apply a partial configuration
    ///
    /// Changes to the field layout reallocate everything; other changes take
    /// effect from the next step.
    ///
    /// # Errors
    /// Returns [`CelerisError::Config`] if the patched configuration is
    /// invalid, in which case nothing changes
    pub fn apply_config_patch(&mut self, patch: &ConfigPatch) -> CelerisResult<PatchOutcome> {
        let outcome = crate::config::apply_config_patch(&mut self.config, patch)?;
        if outcome.changed.is_empty() {
            return Ok(outcome);
        }
        debug!("Configuration patch changed {:?}", outcome.changed);
        if outcome.requires_reinit {
            self.reinitialize()?;
            return Ok(outcome);
        }
        self.params = ParamBuilder::new(&self.config);
        self.cadence.set_config(self.config.cadence);
        if outcome.changed.contains(&"render_step") {
            self.cadence.set_render_step(self.config.render_step);
        }
        if outcome.refresh_coefficients && self.config.equation.is_dispersive() {
            self.coefficients_stale = true;
        }
        Ok(outcome)
    }

    /// Release every device resource
    ///
    /// Any later step or readback fails with a stale-handle error until
    /// [`Simulation::reinitialize`] is called.
    pub fn teardown(&mut self) {
        self.backend.destroy_all();
        info!("Simulation torn down after {} steps", self.step);
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Run one frame of `render_step` full steps, sample the gauges and
    /// adapt the cadence
    ///
    /// A paused simulation runs no steps.
    ///
    /// # Errors
    /// Returns the first fatal error; a failed gauge readback is logged and
    /// skipped
    pub fn run_frame(&mut self) -> CelerisResult<FrameReport> {
        if self.paused {
            return Ok(FrameReport {
                steps: 0,
                render_step: self.cadence.render_step(),
                time: self.time,
                frame_ms: 0.0,
                cadence: None,
            });
        }

        let scope = ProfilerScope::new("frame");
        let started_at = self.time;
        let steps = self.cadence.render_step();
        for _ in 0..steps {
            self.step()?;
        }

        if let Some(gauges) = &mut self.alloc.gauges {
            if let Err(err) = gauges.sample(self.backend.as_mut(), &self.params, self.time) {
                if err.is_fatal() {
                    return Err(err);
                }
                warn!("Skipping gauge sample at t = {:.3} s: {}", self.time, err);
            }
        }

        let frame_ms = scope.elapsed_ms();
        drop(scope);
        self.timer.record(frame_ms, steps, self.time - started_at);
        let cadence = self.cadence.record_frame(Instant::now(), steps);
        if let Some(decision) = cadence {
            debug!(
                "Cadence {:?}: render_step = {}",
                decision,
                self.cadence.render_step()
            );
        }

        Ok(FrameReport {
            steps,
            render_step: self.cadence.render_step(),
            time: self.time,
            frame_ms,
            cadence,
        })
    }

    /// Advance one full time step
    ///
    /// # Errors
    /// Propagates backend errors, including a lost device
    pub fn step(&mut self) -> CelerisResult<()> {
        let phases: &[Phase] = if self.config.time_scheme == TimeScheme::PredictorCorrector {
            &[Phase::Predictor, Phase::Corrector]
        } else {
            &[Phase::Predictor]
        };
        let dt = self.params.derived().dt;
        let window = (self.time as f32, self.time as f32 + dt);
        let disturbance_active = self
            .config
            .disturbances
            .iter()
            .any(|d| d.progress(window.1) != d.progress(window.0));

        for (i, &phase) in phases.iter().enumerate() {
            if phase == Phase::Corrector {
                self.begin_corrector()?;
            }
            let final_phase = i + 1 == phases.len();
            for scheduled in &SUBSTEP_SCHEDULE {
                let ctx = self.stage_context(phase, final_phase, disturbance_active);
                if scheduled.is_active(&ctx) {
                    self.run_stage(scheduled.stage, phase, window)?;
                }
            }
        }
        self.finish_step(phases[phases.len() - 1])
    }

    fn stage_context(&self, phase: Phase, final_phase: bool, disturbance_active: bool) -> StageContext {
        StageContext {
            equation: self.config.equation,
            breaking: self.config.breaking.enabled,
            sediment: self.config.sediment.enabled,
            phase,
            final_phase,
            disturbance_active,
            coefficients_stale: self.coefficients_stale,
        }
    }

    /// The corrector is evaluated at the predicted state
    fn begin_corrector(&mut self) -> CelerisResult<()> {
        let f = &self.alloc.fields;
        let backend = self.backend.as_mut();
        backend.copy_field(f.new_state.current(), f.state)?;
        if let Some(s) = &f.sediment {
            backend.copy_field(s.next.current(), s.current)?;
        }
        Ok(())
    }

    fn run_stage(&mut self, stage: Stage, phase: Phase, window: (f32, f32)) -> CelerisResult<()> {
        let backend = self.backend.as_mut();
        let params = &self.params;
        let f = &self.alloc.fields;
        let passes = &self.alloc.passes;

        match stage {
            Stage::NearDry => backend.run_pass(&passes.near_dry, &UniformBlock::pack(&params.depth()))?,
            Stage::Reconstruct => {
                backend.run_pass(&passes.reconstruct, &UniformBlock::pack(&params.reconstruct()))?;
            }
            Stage::SedimentReconstruct => {
                if let Some(sediment) = &passes.sediment {
                    backend.run_pass(&sediment.reconstruct, &UniformBlock::pack(&params.sediment(phase)))?;
                }
            }
            Stage::Flux => {
                backend.run_pass(&passes.flux, &UniformBlock::pack(&params.flux()))?;
                if let Some(sediment) = &passes.sediment {
                    backend.run_pass(&sediment.flux, &UniformBlock::pack(&params.sediment(phase)))?;
                }
            }
            Stage::Breaking => {
                if let Some(pass) = &passes.breaking {
                    backend.run_pass(pass, &UniformBlock::pack(&params.breaking()))?;
                    f.breaking.rotate(backend)?;
                }
            }
            Stage::DispersiveGrouping => {
                if let Some(dispersion) = &passes.dispersion {
                    let uniforms = UniformBlock::pack(&params.dispersion());
                    backend.run_pass(&dispersion.auxiliaries, &uniforms)?;
                    backend.run_pass(&dispersion.group, &uniforms)?;
                }
            }
            Stage::Update => {
                backend.run_pass(&passes.update, &UniformBlock::pack(&params.update(phase)))?;
                if phase == Phase::Predictor {
                    f.grad.predicted.rotate(backend)?;
                }
            }
            Stage::SedimentUpdate => {
                if let (Some(sediment), Some(s)) = (&passes.sediment, &f.sediment) {
                    let uniforms = UniformBlock::pack(&params.sediment(phase));
                    backend.run_pass(&sediment.update, &uniforms)?;
                    if phase == Phase::Predictor {
                        s.grad.predicted.rotate(backend)?;
                    }
                    backend.run_pass(&sediment.boundary, &uniforms)?;
                    s.next.rotate(backend)?;
                }
            }
            Stage::Boundary => {
                backend.run_pass(&passes.boundary, &UniformBlock::pack(&params.boundary(window.1)))?;
                f.provisional.rotate(backend)?;
                f.breaking.rotate(backend)?;
            }
            Stage::NonlinearCoefficients => {
                self.alloc.solver.refresh_coefficients(
                    backend,
                    params,
                    self.config.equation == EquationMode::Coulwave,
                )?;
                self.coefficients_stale = false;
            }
            Stage::TridiagSolve => self.alloc.solver.solve(backend, params)?,
            Stage::SolvedBoundary => {
                if let Some(pass) = &passes.solved_boundary {
                    backend.run_pass(pass, &UniformBlock::pack(&params.boundary(window.1)))?;
                    f.new_state.rotate(backend)?;
                    f.breaking.rotate(backend)?;
                }
            }
            Stage::ForcingShift => {
                f.forcing.predicted.rotate(backend)?;
                f.forcing.shift(backend)?;
            }
            Stage::Disturbance => {
                let mut moved = false;
                for source in &self.config.disturbances {
                    let delta = source.amplitude * (source.progress(window.1) - source.progress(window.0));
                    if delta == 0.0 {
                        continue;
                    }
                    let uniforms = UniformBlock::pack(&params.disturbance(
                        (source.center_x, source.center_y),
                        source.radius,
                        delta,
                    ));
                    backend.run_pass(&passes.disturbance, &uniforms)?;
                    f.bottom.rotate(backend)?;
                    f.new_state.rotate(backend)?;
                    moved = true;
                }
                if moved && self.config.equation.is_dispersive() {
                    self.coefficients_stale = true;
                }
            }
        }
        Ok(())
    }

    fn finish_step(&mut self, last_phase: Phase) -> CelerisResult<()> {
        let backend = self.backend.as_mut();
        let f = &self.alloc.fields;

        f.grad.shift(backend)?;
        backend.copy_field(f.new_state.current(), f.state)?;
        backend.copy_field(f.new_state.current(), f.state_star)?;

        if let (Some(s), Some(sediment)) = (&f.sediment, &self.alloc.passes.sediment) {
            s.grad.shift(backend)?;
            backend.copy_field(s.next.current(), s.current)?;
            backend.copy_field(s.next.current(), s.base)?;
            backend.run_pass(&sediment.bed, &UniformBlock::pack(&self.params.sediment(last_phase)))?;
            f.bottom.rotate(backend)?;
            if self.config.equation.is_dispersive() {
                self.coefficients_stale = true;
            }
        }

        self.alloc.statistics.accumulate(backend, &self.params)?;
        self.step += 1;
        self.time += f64::from(self.params.derived().dt);
        backend.submit()?;
        backend.check_device()
    }

    fn output_handle(&self, output: OutputField) -> CelerisResult<FieldHandle> {
        let f = &self.alloc.fields;
        Ok(match output {
            OutputField::State => f.state,
            OutputField::Bottom => f.bottom.current(),
            OutputField::NearDry => f.near_dry,
            OutputField::Breaking => f.breaking.current(),
            OutputField::Means => self.alloc.statistics.means(),
            OutputField::WaveHeight => self.alloc.statistics.wave_stats(),
            OutputField::Sediment => f.sediment.map(|s| s.current).ok_or_else(|| CelerisError::Readback {
                field: "sediment".into(),
                reason: "sediment transport is disabled".into(),
            })?,
        })
    }

    /// Read a whole output field
    ///
    /// # Errors
    /// Returns [`CelerisError::Readback`] if the readback fails or the field
    /// is not allocated
    pub fn read_field(&mut self, output: OutputField) -> CelerisResult<FieldData> {
        let handle = self.output_handle(output)?;
        self.backend.read_field(handle)
    }

    /// Read one channel of an output field as a flat row-major array
    ///
    /// # Errors
    /// Returns [`CelerisError::Readback`] for a channel above 3, a failed
    /// readback or a field that is not allocated
    pub fn read_field_channel(&mut self, output: OutputField, channel: usize) -> CelerisResult<Vec<f32>> {
        let handle = self.output_handle(output)?;
        self.backend.read_field_channel(handle, channel)
    }

    /// Restart the running means and wave-height statistics
    ///
    /// # Errors
    /// Propagates backend errors
    pub fn reset_statistics(&mut self) -> CelerisResult<()> {
        self.alloc.statistics.reset_means(self.backend.as_mut())?;
        self.alloc.statistics.reset_wave_height(self.backend.as_mut())?;
        self.backend.submit()
    }

    /// Samples folded into the running means
    #[must_use]
    pub fn statistics_samples(&self) -> u32 {
        self.alloc.statistics.mean_samples()
    }

    /// Recorded gauge series, empty without gauges
    #[must_use]
    pub fn gauge_series(&self) -> &[GaugeSeries] {
        match &self.alloc.gauges {
            Some(gauges) => gauges.series(),
            None => &[],
        }
    }

    /// Keep the provisional and solved state of the next tridiagonal solve
    pub fn capture_next_solve(&mut self) {
        self.alloc.solver.capture_next_solve();
    }

    pub fn take_solve_capture(&mut self) -> Option<SolveCapture> {
        self.alloc.solver.take_capture()
    }

    /// Drain the backend's work log
    pub fn take_trace(&mut self) -> Vec<TraceEvent> {
        self.backend.take_trace()
    }

    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Simulation time in seconds
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.step
    }

    #[must_use]
    pub fn render_step(&self) -> u32 {
        self.cadence.render_step()
    }

    #[must_use]
    pub fn frame_timer(&self) -> &FrameTimer {
        &self.timer
    }

    #[must_use]
    pub fn backend_name(&self) -> String {
        self.backend.name()
    }

    #[must_use]
    pub fn is_gpu_accelerated(&self) -> bool {
        self.backend.is_gpu_accelerated()
    }

    #[must_use]
    pub fn backend_stats(&self) -> BackendStats {
        self.backend.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use crate::kernel::KernelId;

    fn small_config() -> SimulationConfig {
        SimulationConfig {
            width: 16,
            height: 16,
            time_scheme: TimeScheme::Euler,
            ..SimulationConfig::default()
        }
    }

    fn traced(config: SimulationConfig) -> Simulation {
        let bathymetry = Bathymetry::flat(config.width, config.height, 1.0);
        Simulation::with_backend(
            config,
            bathymetry,
            InitialCondition::Still,
            Box::new(CpuBackend::with_trace()),
        )
        .unwrap()
    }

    fn dispatched(trace: &[TraceEvent]) -> Vec<KernelId> {
        trace
            .iter()
            .filter_map(|e| match e {
                TraceEvent::Dispatch { kernel, .. } => Some(*kernel),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_phase_codes() {
        assert_eq!(Phase::Predictor.code(), 1);
        assert_eq!(Phase::Corrector.code(), 2);
    }

    #[test]
    fn test_euler_step_dispatch_order() {
        let mut sim = traced(small_config());
        sim.take_trace();
        sim.step().unwrap();
        assert_eq!(
            dispatched(&sim.take_trace()),
            [
                KernelId::NearDry,
                KernelId::Reconstruct,
                KernelId::Flux,
                KernelId::UpdateNlsw,
                KernelId::Boundary,
                KernelId::CalcMeans,
                KernelId::CalcWaveHeight,
            ]
        );
        assert_eq!(sim.step_count(), 1);
    }

    #[test]
    fn test_corrector_repeats_the_substep() {
        let mut sim = traced(SimulationConfig {
            time_scheme: TimeScheme::PredictorCorrector,
            ..small_config()
        });
        sim.take_trace();
        sim.step().unwrap();
        let updates = dispatched(&sim.take_trace())
            .into_iter()
            .filter(|k| *k == KernelId::UpdateNlsw)
            .count();
        assert_eq!(updates, 2);
    }

    #[test]
    fn test_still_water_stays_still() {
        let mut sim = traced(small_config());
        for _ in 0..5 {
            sim.step().unwrap();
        }
        let state = sim.read_field(OutputField::State).unwrap();
        for texel in &state.data {
            assert!(texel[0].abs() < 1e-6, "eta = {}", texel[0]);
            assert!(texel[1].abs() < 1e-6 && texel[2].abs() < 1e-6);
        }
    }

    #[test]
    fn test_paused_frame_runs_nothing() {
        let mut sim = traced(small_config());
        sim.pause();
        let report = sim.run_frame().unwrap();
        assert_eq!(report.steps, 0);
        assert_eq!(sim.step_count(), 0);
        sim.resume();
        let report = sim.run_frame().unwrap();
        assert_eq!(report.steps, 20);
        assert_eq!(sim.step_count(), 20);
    }

    #[test]
    fn test_sediment_readback_requires_sediment() {
        let mut sim = traced(small_config());
        let err = sim.read_field_channel(OutputField::Sediment, 0).unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_teardown_invalidates_handles() {
        let mut sim = traced(small_config());
        sim.teardown();
        assert!(sim.step().is_err());
        assert!(matches!(
            sim.read_field(OutputField::State),
            Err(CelerisError::StaleHandle { .. })
        ));
        sim.reinitialize().unwrap();
        sim.step().unwrap();
        assert_eq!(sim.step_count(), 1);
    }

    #[test]
    fn test_patch_without_layout_change_keeps_fields() {
        let mut sim = traced(small_config());
        sim.step().unwrap();
        let outcome = sim
            .apply_config_patch(&ConfigPatch {
                friction: Some(0.02),
                render_step: Some(5),
                ..ConfigPatch::default()
            })
            .unwrap();
        assert!(!outcome.requires_reinit);
        assert_eq!(sim.step_count(), 1);
        assert_eq!(sim.render_step(), 5);

        let outcome = sim
            .apply_config_patch(&ConfigPatch {
                width: Some(24),
                ..ConfigPatch::default()
            })
            .unwrap();
        assert!(outcome.requires_reinit);
        assert_eq!(sim.step_count(), 0);
        assert_eq!(sim.read_field(OutputField::State).unwrap().width, 24);
    }
}
