//! Sub-step stage list
//!
//! The order of every predictor and corrector sub-step is declared once in
//! [`SUBSTEP_SCHEDULE`]. Optional physics is expressed as a predicate on
//! [`StageContext`]; the scheduler never reorders stages, it only skips those
//! whose predicate is false.

use super::Phase;
use crate::config::EquationMode;

/// One stage of a sub-step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Water depth and near-dry flags (Pass0)
    NearDry,
    /// Face values of h, u, v and c (Pass1)
    Reconstruct,
    /// Face values of the sediment concentration
    SedimentReconstruct,
    /// Face fluxes, plus sediment fluxes when sediment is on (Pass2)
    Flux,
    /// Breaking eddy viscosity
    Breaking,
    /// Fully nonlinear auxiliaries grouped into one volume field
    DispersiveGrouping,
    /// Right-hand side and time integration (Pass3)
    Update,
    /// Sediment transport and its boundary homogenisation
    SedimentUpdate,
    /// Boundary conditions on the provisional state
    Boundary,
    /// Tridiagonal coefficients from the updated state
    NonlinearCoefficients,
    /// Implicit dispersion solve, or a copy without dispersion
    TridiagSolve,
    /// Boundary conditions on the solved state
    SolvedBoundary,
    /// Dispersive forcing history shift
    ForcingShift,
    /// Prescribed sea-floor motion
    Disturbance,
}

/// Inputs of the stage predicates for one sub-step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageContext {
    pub equation: EquationMode,
    pub breaking: bool,
    pub sediment: bool,
    pub phase: Phase,
    /// This sub-step completes the time step
    pub final_phase: bool,
    /// A disturbance source moves the bed during this step
    pub disturbance_active: bool,
    /// The bed changed since the coefficients were last computed
    pub coefficients_stale: bool,
}

/// A stage and the condition under which it runs
#[derive(Clone, Copy)]
pub struct ScheduledStage {
    pub stage: Stage,
    pub when: fn(&StageContext) -> bool,
}

impl ScheduledStage {
    #[must_use]
    pub fn is_active(&self, ctx: &StageContext) -> bool {
        (self.when)(ctx)
    }
}

impl std::fmt::Debug for ScheduledStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ScheduledStage").field(&self.stage).finish()
    }
}

fn always(_: &StageContext) -> bool {
    true
}

fn with_sediment(ctx: &StageContext) -> bool {
    ctx.sediment
}

fn with_breaking(ctx: &StageContext) -> bool {
    ctx.breaking
}

fn fully_nonlinear(ctx: &StageContext) -> bool {
    ctx.equation == EquationMode::Coulwave
}

fn dispersive(ctx: &StageContext) -> bool {
    ctx.equation.is_dispersive()
}

fn coefficients_due(ctx: &StageContext) -> bool {
    fully_nonlinear(ctx) || (dispersive(ctx) && ctx.coefficients_stale)
}

fn disturbance_due(ctx: &StageContext) -> bool {
    ctx.final_phase && ctx.disturbance_active
}

/// Stage order of every sub-step
pub static SUBSTEP_SCHEDULE: [ScheduledStage; 14] = [
    ScheduledStage {
        stage: Stage::NearDry,
        when: always,
    },
    ScheduledStage {
        stage: Stage::Reconstruct,
        when: always,
    },
    ScheduledStage {
        stage: Stage::SedimentReconstruct,
        when: with_sediment,
    },
    ScheduledStage {
        stage: Stage::Flux,
        when: always,
    },
    ScheduledStage {
        stage: Stage::Breaking,
        when: with_breaking,
    },
    ScheduledStage {
        stage: Stage::DispersiveGrouping,
        when: fully_nonlinear,
    },
    ScheduledStage {
        stage: Stage::Update,
        when: always,
    },
    ScheduledStage {
        stage: Stage::SedimentUpdate,
        when: with_sediment,
    },
    ScheduledStage {
        stage: Stage::Boundary,
        when: always,
    },
    ScheduledStage {
        stage: Stage::NonlinearCoefficients,
        when: coefficients_due,
    },
    ScheduledStage {
        stage: Stage::TridiagSolve,
        when: always,
    },
    ScheduledStage {
        stage: Stage::SolvedBoundary,
        when: dispersive,
    },
    ScheduledStage {
        stage: Stage::ForcingShift,
        when: always,
    },
    ScheduledStage {
        stage: Stage::Disturbance,
        when: disturbance_due,
    },
];

/// Stages that run for `ctx`, in order
pub fn active_stages(ctx: &StageContext) -> impl Iterator<Item = Stage> + '_ {
    SUBSTEP_SCHEDULE
        .iter()
        .filter(move |s| s.is_active(ctx))
        .map(|s| s.stage)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(equation: EquationMode) -> StageContext {
        StageContext {
            equation,
            breaking: false,
            sediment: false,
            phase: Phase::Predictor,
            final_phase: false,
            disturbance_active: false,
            coefficients_stale: false,
        }
    }

    #[test]
    fn test_shallow_water_stages() {
        let stages: Vec<_> = active_stages(&context(EquationMode::Nlsw)).collect();
        assert_eq!(
            stages,
            [
                Stage::NearDry,
                Stage::Reconstruct,
                Stage::Flux,
                Stage::Update,
                Stage::Boundary,
                Stage::TridiagSolve,
                Stage::ForcingShift,
            ]
        );
    }

    #[test]
    fn test_fully_nonlinear_with_everything_on() {
        let ctx = StageContext {
            breaking: true,
            sediment: true,
            final_phase: true,
            disturbance_active: true,
            ..context(EquationMode::Coulwave)
        };
        let stages: Vec<_> = active_stages(&ctx).collect();
        let all: Vec<_> = SUBSTEP_SCHEDULE.iter().map(|s| s.stage).collect();
        assert_eq!(stages, all);
    }

    #[test]
    fn test_boussinesq_coefficients_only_when_stale() {
        let fresh = context(EquationMode::Boussinesq);
        assert!(!active_stages(&fresh).any(|s| s == Stage::NonlinearCoefficients));
        assert!(active_stages(&fresh).any(|s| s == Stage::SolvedBoundary));

        let stale = StageContext {
            coefficients_stale: true,
            ..fresh
        };
        assert!(active_stages(&stale).any(|s| s == Stage::NonlinearCoefficients));
    }

    #[test]
    fn test_disturbance_waits_for_final_phase() {
        let ctx = StageContext {
            disturbance_active: true,
            ..context(EquationMode::Nlsw)
        };
        assert!(!active_stages(&ctx).any(|s| s == Stage::Disturbance));
    }
}
