//! Every field one simulation allocates
//!
//! Fields of disabled physics are bound as 1×1 placeholders, so the pass
//! table never changes shape with the configuration.

use crate::backend::ComputeBackend;
use crate::config::{EquationMode, SimulationConfig};
use crate::error::CelerisResult;
use crate::field::{DoubleBuffered, FieldDesc, FieldHandle, FieldKind, GradientHistory};
use crate::kernel::DISPERSION_LAYERS;

/// Sediment concentration and its transport fields
#[derive(Debug, Clone, Copy)]
pub struct SedimentFields {
    /// Concentration at the start of the step
    pub base: FieldHandle,
    /// Concentration the fluxes are evaluated from
    pub current: FieldHandle,
    /// Integrated concentration, then its boundary-corrected copy
    pub next: DoubleBuffered,
    pub edges: FieldHandle,
    pub x_flux: FieldHandle,
    pub y_flux: FieldHandle,
    pub grad: GradientHistory,
    /// Erosion, deposition and bed change rate
    pub exchange: FieldHandle,
}

impl SedimentFields {
    fn allocate(backend: &mut dyn ComputeBackend, width: u32, height: u32) -> CelerisResult<Self> {
        let grid = |name: &str| FieldDesc::grid(name, width, height);
        Ok(Self {
            base: backend.create_field(grid("sediment_base"))?,
            current: backend.create_field(grid("sediment"))?,
            next: DoubleBuffered::allocate(backend, &grid("sediment_next"))?,
            edges: backend.create_field(grid("sediment_edges"))?,
            x_flux: backend.create_field(grid("sediment_x_flux"))?,
            y_flux: backend.create_field(grid("sediment_y_flux"))?,
            grad: GradientHistory::allocate(backend, &grid("sediment_grad"))?,
            exchange: backend.create_field(grid("sediment_exchange"))?,
        })
    }
}

/// Handles of the whole field set
#[derive(Debug, Clone)]
pub struct FieldSet {
    /// State the current sub-step is evaluated at
    pub state: FieldHandle,
    /// State at the start of the step, the integration base
    pub state_star: FieldHandle,
    pub bottom: DoubleBuffered,
    pub near_dry: FieldHandle,
    pub h_edges: FieldHandle,
    pub u_edges: FieldHandle,
    pub v_edges: FieldHandle,
    pub c_edges: FieldHandle,
    pub x_flux: FieldHandle,
    pub y_flux: FieldHandle,
    pub grad: GradientHistory,
    pub forcing: GradientHistory,
    /// Update output, then its boundary-corrected copy
    pub provisional: DoubleBuffered,
    /// Solved state, then its boundary-corrected copy
    pub new_state: DoubleBuffered,
    pub breaking: DoubleBuffered,
    /// Grouped fully nonlinear terms, or a volume placeholder
    pub dispersion: FieldHandle,
    pub aux: Option<[FieldHandle; DISPERSION_LAYERS as usize]>,
    pub sediment: Option<SedimentFields>,
    /// Incident wave components, one texel each
    pub waves: FieldHandle,
    /// Never written; reset source for the statistics
    pub zero: FieldHandle,
    /// Stand-in for optional grid bindings
    pub placeholder_grid: FieldHandle,
}

impl FieldSet {
    /// Allocate every field `config` needs
    ///
    /// # Errors
    /// Propagates allocation failures from the backend
    pub fn allocate(backend: &mut dyn ComputeBackend, config: &SimulationConfig) -> CelerisResult<Self> {
        let (width, height) = (config.width, config.height);
        let grid = |name: &str| FieldDesc::grid(name, width, height);

        let state = backend.create_field(grid("state"))?;
        let state_star = backend.create_field(grid("state_star"))?;
        let bottom = DoubleBuffered::allocate(backend, &grid("bottom"))?;
        let near_dry = backend.create_field(grid("near_dry"))?;
        let h_edges = backend.create_field(grid("h_edges"))?;
        let u_edges = backend.create_field(grid("u_edges"))?;
        let v_edges = backend.create_field(grid("v_edges"))?;
        let c_edges = backend.create_field(grid("c_edges"))?;
        let x_flux = backend.create_field(grid("x_flux"))?;
        let y_flux = backend.create_field(grid("y_flux"))?;
        let grad = GradientHistory::allocate(backend, &grid("grad"))?;
        let forcing = GradientHistory::allocate(backend, &grid("forcing"))?;
        let provisional = DoubleBuffered::allocate(backend, &grid("provisional"))?;
        let new_state = DoubleBuffered::allocate(backend, &grid("new_state"))?;
        // The boundary pass always carries the breaking state along
        let breaking = DoubleBuffered::allocate(backend, &grid("breaking"))?;

        let (dispersion, aux) = if config.equation == EquationMode::Coulwave {
            let dispersion = backend.create_field(FieldDesc::volume(
                "dispersion",
                width,
                height,
                DISPERSION_LAYERS,
            ))?;
            let mut aux = [dispersion; DISPERSION_LAYERS as usize];
            for (i, slot) in aux.iter_mut().enumerate() {
                *slot = backend.create_field(grid(&format!("dispersion_aux{i}")))?;
            }
            (dispersion, Some(aux))
        } else {
            let placeholder = backend.create_field(FieldDesc::placeholder("dispersion", FieldKind::Volume))?;
            (placeholder, None)
        };

        let sediment = if config.sediment.enabled {
            Some(SedimentFields::allocate(backend, width, height)?)
        } else {
            None
        };

        let waves = backend.create_field(FieldDesc::line("waves", config.waves.len() as u32))?;
        let zero = backend.create_field(grid("zero"))?;
        let placeholder_grid = backend.create_field(FieldDesc::placeholder("placeholder", FieldKind::Grid))?;

        Ok(Self {
            state,
            state_star,
            bottom,
            near_dry,
            h_edges,
            u_edges,
            v_edges,
            c_edges,
            x_flux,
            y_flux,
            grad,
            forcing,
            provisional,
            new_state,
            breaking,
            dispersion,
            aux,
            sediment,
            waves,
            zero,
            placeholder_grid,
        })
    }
}
