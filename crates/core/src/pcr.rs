//! Tridiagonal solve of the implicit dispersion correction
//!
//! Every grid line carries one tridiagonal system
//! `a x[i-1] + b x[i] + c x[i+1] = d[i]`. Lines along x solve for P (channel 1)
//! of the provisional state, lines along y then solve for Q (channel 2) of the
//! x-solved state. Both run parallel cyclic reduction: iteration `p` combines
//! every row with its neighbours at distance `s = 2^p`, so after
//! `ceil(log2(extent))` iterations each row is diagonal and the solution is
//! `d / b`.
//!
//! Iteration `p + 1` reads the rows iteration `p` wrote, so each iteration
//! writes a scratch coefficient field, rotates it into place and ends with a
//! submission. In the non-dispersive mode the solve is a plain copy of the
//! provisional state.

use crate::backend::{ComputeBackend, PreparedPass};
use crate::config::SimulationConfig;
use crate::error::CelerisResult;
use crate::field::{DoubleBuffered, FieldData, FieldDesc, FieldHandle};
use crate::kernel::KernelId;
use crate::params::{ParamBuilder, UniformBlock};
use tracing::{debug, trace};

/// Channel of the state solved along x
pub const X_CHANNEL: u32 = 1;

/// Channel of the state solved along y
pub const Y_CHANNEL: u32 = 2;

/// Fields the solver reads from the rest of the field set
#[derive(Debug, Clone, Copy)]
pub struct SolverBindings {
    /// Boundary-corrected state before the solve
    pub provisional: FieldHandle,
    /// Receives the solved state
    pub next_state: FieldHandle,
    /// Inputs of the coefficient pass
    pub state: FieldHandle,
    pub bottom: FieldHandle,
    pub near_dry: FieldHandle,
}

/// Provisional and solved state of one solve, for inspection
#[derive(Debug, Clone, PartialEq)]
pub struct SolveCapture {
    pub provisional: FieldData,
    pub solved: FieldData,
}

#[derive(Debug)]
struct PcrLines {
    coef_x: FieldHandle,
    coef_y: FieldHandle,
    pcr_x: DoubleBuffered,
    pcr_y: DoubleBuffered,
    solution_x: FieldHandle,
    solution_y: FieldHandle,
    coefficient_pass: PreparedPass,
    x_pass: PreparedPass,
    y_pass: PreparedPass,
}

/// PCR solver over the x and y lines of the domain
#[derive(Debug)]
pub struct TridiagSolver {
    provisional: FieldHandle,
    next_state: FieldHandle,
    lines: Option<PcrLines>,
    capture_next: bool,
    capture: Option<SolveCapture>,
}

impl TridiagSolver {
    /// Allocate the coefficient and reduction fields and prepare the passes
    ///
    /// Nothing is allocated for the non-dispersive mode.
    ///
    /// # Errors
    /// Propagates allocation and binding errors from the backend
    pub fn allocate(
        backend: &mut dyn ComputeBackend,
        config: &SimulationConfig,
        bindings: SolverBindings,
    ) -> CelerisResult<Self> {
        let lines = if config.equation.is_dispersive() {
            Some(Self::allocate_lines(backend, config, &bindings)?)
        } else {
            None
        };
        Ok(Self {
            provisional: bindings.provisional,
            next_state: bindings.next_state,
            lines,
            capture_next: false,
            capture: None,
        })
    }

    fn allocate_lines(
        backend: &mut dyn ComputeBackend,
        config: &SimulationConfig,
        bindings: &SolverBindings,
    ) -> CelerisResult<PcrLines> {
        let (width, height) = (config.width, config.height);
        let domain = (width, height);
        let grid = |name: &str| FieldDesc::grid(name, width, height);

        let coef_x = backend.create_field(grid("coef_x"))?;
        let coef_y = backend.create_field(grid("coef_y"))?;
        let pcr_x = DoubleBuffered::allocate(backend, &grid("pcr_x"))?;
        let pcr_y = DoubleBuffered::allocate(backend, &grid("pcr_y"))?;
        let solution_x = backend.create_field(grid("solution_x"))?;
        let solution_y = backend.create_field(grid("solution_y"))?;

        let coefficient_pass = backend.prepare_pass(
            KernelId::TridiagCoef,
            &[bindings.state, bindings.bottom, bindings.near_dry, coef_x, coef_y],
            domain,
        )?;
        let x_pass = backend.prepare_pass(
            KernelId::TridiagX,
            &[pcr_x.current(), bindings.provisional, pcr_x.scratch(), solution_x],
            domain,
        )?;
        let y_pass = backend.prepare_pass(
            KernelId::TridiagY,
            &[pcr_y.current(), bindings.next_state, pcr_y.scratch(), solution_y],
            domain,
        )?;
        Ok(PcrLines {
            coef_x,
            coef_y,
            pcr_x,
            pcr_y,
            solution_x,
            solution_y,
            coefficient_pass,
            x_pass,
            y_pass,
        })
    }

    /// Whether the solve runs PCR rather than a copy
    #[must_use]
    pub fn is_dispersive(&self) -> bool {
        self.lines.is_some()
    }

    /// The (x, y) coefficient fields, if allocated
    #[must_use]
    pub fn coefficient_fields(&self) -> Option<(FieldHandle, FieldHandle)> {
        self.lines.as_ref().map(|l| (l.coef_x, l.coef_y))
    }

    /// Recompute the coefficients from the current bed, near-dry flags and
    /// (with `use_total_depth`) the total water depth
    ///
    /// # Errors
    /// Propagates backend errors
    pub fn refresh_coefficients(
        &mut self,
        backend: &mut dyn ComputeBackend,
        params: &ParamBuilder,
        use_total_depth: bool,
    ) -> CelerisResult<()> {
        if let Some(lines) = &self.lines {
            backend.run_pass(
                &lines.coefficient_pass,
                &UniformBlock::pack(&params.coefficients(use_total_depth)),
            )?;
            trace!("Tridiagonal coefficients refreshed");
        }
        Ok(())
    }

    /// Read the provisional and solved state of the next solve
    pub fn capture_next_solve(&mut self) {
        self.capture_next = true;
    }

    /// The captured solve, if one has run since [`Self::capture_next_solve`]
    pub fn take_capture(&mut self) -> Option<SolveCapture> {
        self.capture.take()
    }

    /// Turn the provisional state into the solved next state
    ///
    /// # Errors
    /// Propagates backend errors
    pub fn solve(&mut self, backend: &mut dyn ComputeBackend, params: &ParamBuilder) -> CelerisResult<()> {
        let provisional = if self.capture_next {
            Some(backend.read_field(self.provisional)?)
        } else {
            None
        };

        match &self.lines {
            None => {
                backend.copy_field(self.provisional, self.next_state)?;
                backend.submit()?;
            }
            Some(lines) => {
                let derived = params.derived();
                backend.copy_field(lines.coef_x, lines.pcr_x.current())?;
                backend.submit()?;
                for p in 0..derived.px {
                    backend.run_pass(&lines.x_pass, &UniformBlock::pack(&params.tridiag(p, X_CHANNEL)))?;
                    lines.pcr_x.rotate(backend)?;
                    backend.submit()?;
                }

                backend.copy_field(lines.solution_x, self.next_state)?;
                backend.copy_field(lines.coef_y, lines.pcr_y.current())?;
                backend.submit()?;
                for p in 0..derived.py {
                    backend.run_pass(&lines.y_pass, &UniformBlock::pack(&params.tridiag(p, Y_CHANNEL)))?;
                    lines.pcr_y.rotate(backend)?;
                    backend.submit()?;
                }

                backend.copy_field(lines.solution_y, self.next_state)?;
                backend.submit()?;
            }
        }

        if let Some(provisional) = provisional {
            let solved = backend.read_field(self.next_state)?;
            self.capture = Some(SolveCapture { provisional, solved });
            self.capture_next = false;
            debug!("Captured tridiagonal solve");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CpuBackend, TraceEvent};
    use crate::config::EquationMode;

    fn bindings(backend: &mut CpuBackend, n: u32) -> SolverBindings {
        let mut grid = |name: &str| backend.create_field(FieldDesc::grid(name, n, n)).unwrap();
        SolverBindings {
            provisional: grid("provisional"),
            next_state: grid("next_state"),
            state: grid("state"),
            bottom: grid("bottom"),
            near_dry: grid("near_dry"),
        }
    }

    #[test]
    fn test_shallow_water_solve_is_one_copy() {
        let mut backend = CpuBackend::with_trace();
        let config = SimulationConfig {
            width: 8,
            height: 8,
            ..SimulationConfig::default()
        };
        let fields = bindings(&mut backend, 8);
        let mut solver = TridiagSolver::allocate(&mut backend, &config, fields).unwrap();
        assert!(!solver.is_dispersive());
        assert!(solver.coefficient_fields().is_none());

        solver.solve(&mut backend, &ParamBuilder::new(&config)).unwrap();
        assert_eq!(
            backend.trace(),
            &[
                TraceEvent::Copy {
                    src: fields.provisional,
                    dst: fields.next_state
                },
                TraceEvent::Submit
            ]
        );
    }

    #[test]
    fn test_every_iteration_ends_with_a_submit() {
        let mut backend = CpuBackend::with_trace();
        let config = SimulationConfig {
            width: 16,
            height: 16,
            equation: EquationMode::Boussinesq,
            ..SimulationConfig::default()
        };
        let fields = bindings(&mut backend, 16);
        let mut solver = TridiagSolver::allocate(&mut backend, &config, fields).unwrap();
        solver.solve(&mut backend, &ParamBuilder::new(&config)).unwrap();

        let trace = backend.trace();
        let dispatches: Vec<usize> = trace
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, TraceEvent::Dispatch { .. }))
            .map(|(i, _)| i)
            .collect();
        // log2(16) iterations per direction
        assert_eq!(dispatches.len(), 8);
        for &i in &dispatches {
            assert!(matches!(trace[i + 1], TraceEvent::Copy { .. }), "rotate after dispatch {i}");
            assert_eq!(trace[i + 2], TraceEvent::Submit, "submit after dispatch {i}");
        }
        assert_eq!(trace.last(), Some(&TraceEvent::Submit));
        assert_eq!(backend.stats().submissions, 11);
    }
}
