//! Prepared passes of one field set
//!
//! Every binding is fixed at initialisation. Passes that would read and write
//! the same logical field bind its `current` handle for reading and its
//! `scratch` handle for writing; the orchestrator rotates afterwards.

use super::fields::FieldSet;
use crate::backend::{ComputeBackend, PreparedPass};
use crate::config::{EquationMode, SimulationConfig};
use crate::error::CelerisResult;
use crate::kernel::KernelId;

/// Sediment transport passes
#[derive(Debug, Clone, Copy)]
pub struct SedimentPasses {
    pub reconstruct: PreparedPass,
    pub flux: PreparedPass,
    pub update: PreparedPass,
    pub boundary: PreparedPass,
    pub bed: PreparedPass,
}

/// Fully nonlinear dispersion passes
#[derive(Debug, Clone, Copy)]
pub struct DispersionPasses {
    pub auxiliaries: PreparedPass,
    pub group: PreparedPass,
}

/// Every pass a sub-step can dispatch, apart from the solver's own
#[derive(Debug, Clone)]
pub struct PassTable {
    pub near_dry: PreparedPass,
    pub reconstruct: PreparedPass,
    pub flux: PreparedPass,
    pub breaking: Option<PreparedPass>,
    pub dispersion: Option<DispersionPasses>,
    pub update: PreparedPass,
    pub boundary: PreparedPass,
    /// Second boundary pass on the solved state
    pub solved_boundary: Option<PreparedPass>,
    pub disturbance: PreparedPass,
    pub sediment: Option<SedimentPasses>,
}

/// Update kernel of an equation set
#[must_use]
pub fn update_kernel(equation: EquationMode) -> KernelId {
    match equation {
        EquationMode::Nlsw => KernelId::UpdateNlsw,
        EquationMode::Boussinesq => KernelId::UpdateBoussinesq,
        EquationMode::Coulwave => KernelId::UpdateCoulwave,
    }
}

impl PassTable {
    /// Validate and prepare every pass over `fields`
    ///
    /// # Errors
    /// Returns [`crate::CelerisError::Binding`] if a binding breaks a kernel
    /// contract, or the backend's error for a missing kernel
    pub fn prepare(
        backend: &mut dyn ComputeBackend,
        config: &SimulationConfig,
        f: &FieldSet,
    ) -> CelerisResult<Self> {
        let domain = (config.width, config.height);

        let near_dry = backend.prepare_pass(KernelId::NearDry, &[f.state, f.bottom.current(), f.near_dry], domain)?;
        let reconstruct = backend.prepare_pass(
            KernelId::Reconstruct,
            &[
                f.state,
                f.bottom.current(),
                f.near_dry,
                f.h_edges,
                f.u_edges,
                f.v_edges,
                f.c_edges,
            ],
            domain,
        )?;
        let flux = backend.prepare_pass(
            KernelId::Flux,
            &[
                f.h_edges,
                f.u_edges,
                f.v_edges,
                f.c_edges,
                f.bottom.current(),
                f.breaking.current(),
                f.x_flux,
                f.y_flux,
            ],
            domain,
        )?;

        let breaking = if config.breaking.enabled {
            Some(backend.prepare_pass(
                KernelId::Breaking,
                &[
                    f.state,
                    f.bottom.current(),
                    f.near_dry,
                    f.grad.old,
                    f.breaking.current(),
                    f.breaking.scratch(),
                ],
                domain,
            )?)
        } else {
            None
        };

        let dispersion = match f.aux {
            Some(aux) => {
                let mut aux_bindings = vec![f.state, f.bottom.current(), f.near_dry];
                aux_bindings.extend_from_slice(&aux);
                let auxiliaries = backend.prepare_pass(KernelId::DispersionAux, &aux_bindings, domain)?;
                let mut group_bindings = aux.to_vec();
                group_bindings.push(f.dispersion);
                let group = backend.prepare_pass(KernelId::DispersionGroup, &group_bindings, domain)?;
                Some(DispersionPasses { auxiliaries, group })
            }
            None => None,
        };

        let update = backend.prepare_pass(
            update_kernel(config.equation),
            &[
                f.state,
                f.state_star,
                f.bottom.current(),
                f.near_dry,
                f.h_edges,
                f.x_flux,
                f.y_flux,
                f.grad.predicted.current(),
                f.grad.old,
                f.grad.old_old,
                f.forcing.old,
                f.forcing.old_old,
                f.dispersion,
                f.provisional.current(),
                f.grad.predicted.scratch(),
                f.forcing.predicted.scratch(),
            ],
            domain,
        )?;

        let boundary = backend.prepare_pass(
            KernelId::Boundary,
            &[
                f.provisional.current(),
                f.bottom.current(),
                f.waves,
                f.breaking.current(),
                f.provisional.scratch(),
                f.breaking.scratch(),
            ],
            domain,
        )?;
        let solved_boundary = if config.equation.is_dispersive() {
            Some(backend.prepare_pass(
                KernelId::Boundary,
                &[
                    f.new_state.current(),
                    f.bottom.current(),
                    f.waves,
                    f.breaking.current(),
                    f.new_state.scratch(),
                    f.breaking.scratch(),
                ],
                domain,
            )?)
        } else {
            None
        };

        let disturbance = backend.prepare_pass(
            KernelId::Disturbance,
            &[
                f.bottom.current(),
                f.new_state.current(),
                f.bottom.scratch(),
                f.new_state.scratch(),
            ],
            domain,
        )?;

        let sediment = match &f.sediment {
            Some(s) => {
                let breaking = if config.breaking.enabled {
                    f.breaking.current()
                } else {
                    f.placeholder_grid
                };
                Some(SedimentPasses {
                    reconstruct: backend.prepare_pass(
                        KernelId::SedimentReconstruct,
                        &[s.current, f.bottom.current(), f.near_dry, s.edges],
                        domain,
                    )?,
                    flux: backend.prepare_pass(
                        KernelId::SedimentFlux,
                        &[f.h_edges, f.u_edges, f.v_edges, s.edges, s.x_flux, s.y_flux],
                        domain,
                    )?,
                    update: backend.prepare_pass(
                        KernelId::SedimentUpdate,
                        &[
                            s.base,
                            s.current,
                            s.x_flux,
                            s.y_flux,
                            s.grad.predicted.current(),
                            s.grad.old,
                            s.grad.old_old,
                            f.near_dry,
                            f.u_edges,
                            f.v_edges,
                            breaking,
                            s.next.current(),
                            s.grad.predicted.scratch(),
                            s.exchange,
                        ],
                        domain,
                    )?,
                    boundary: backend.prepare_pass(
                        KernelId::SedimentBoundary,
                        &[s.next.current(), s.next.scratch()],
                        domain,
                    )?,
                    bed: backend.prepare_pass(
                        KernelId::SedimentBed,
                        &[f.bottom.current(), s.exchange, f.bottom.scratch()],
                        domain,
                    )?,
                })
            }
            None => None,
        };

        Ok(Self {
            near_dry,
            reconstruct,
            flux,
            breaking,
            dispersion,
            update,
            boundary,
            solved_boundary,
            disturbance,
            sediment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;

    #[test]
    fn test_update_kernel_per_mode() {
        assert_eq!(update_kernel(EquationMode::Nlsw), KernelId::UpdateNlsw);
        assert_eq!(update_kernel(EquationMode::Boussinesq), KernelId::UpdateBoussinesq);
        assert_eq!(update_kernel(EquationMode::Coulwave), KernelId::UpdateCoulwave);
    }

    #[test]
    fn test_optional_passes_follow_config() {
        let mut config = SimulationConfig {
            width: 16,
            height: 16,
            ..SimulationConfig::default()
        };
        let mut backend = CpuBackend::new();
        let fields = FieldSet::allocate(&mut backend, &config).unwrap();
        let passes = PassTable::prepare(&mut backend, &config, &fields).unwrap();
        assert!(passes.breaking.is_none());
        assert!(passes.dispersion.is_none());
        assert!(passes.solved_boundary.is_none());
        assert!(passes.sediment.is_none());

        config.equation = EquationMode::Coulwave;
        config.breaking.enabled = true;
        config.sediment.enabled = true;
        backend.destroy_all();
        let fields = FieldSet::allocate(&mut backend, &config).unwrap();
        let passes = PassTable::prepare(&mut backend, &config, &fields).unwrap();
        assert!(passes.breaking.is_some());
        assert!(passes.dispersion.is_some());
        assert!(passes.solved_boundary.is_some());
        assert!(passes.sediment.is_some());
        assert_eq!(passes.update.kernel(), KernelId::UpdateCoulwave);
    }
}
