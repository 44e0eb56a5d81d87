//! Uniform parameter blocks
//!
//! Every kernel receives one 256-byte uniform block at binding 0. The block is
//! built from a typed `#[repr(C)]` struct per kernel family; field order is the
//! wire layout (little-endian, width at offset 0 and height at offset 4). The
//! offsets of the layouts shared with externally written shaders are pinned in
//! [`layout`] and checked against the structs in tests; bump
//! [`LAYOUT_VERSION`] whenever one of them changes.

use crate::config::{DerivedConstants, SimulationConfig};
use crate::orchestrator::Phase;
use bytemuck::{Pod, Zeroable};
use std::f32::consts::PI;
use std::fmt;

/// Size of one uniform block and of one slot in the GPU uniform ring
pub const UNIFORM_BLOCK_SIZE: usize = 256;

/// Version of the uniform layouts in [`layout`]
pub const LAYOUT_VERSION: u32 = 1;

/// Typed parameters that fit in one uniform block
pub trait UniformParams: Pod {}

macro_rules! uniform_params {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl UniformParams for $ty {}
            const _: () = assert!(std::mem::size_of::<$ty>() <= UNIFORM_BLOCK_SIZE);
        )+
    };
}

/// Raw bytes of one uniform block
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct UniformBlock([u8; UNIFORM_BLOCK_SIZE]);

impl Default for UniformBlock {
    fn default() -> Self {
        Self([0; UNIFORM_BLOCK_SIZE])
    }
}

impl fmt::Debug for UniformBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniformBlock")
            .field("width", &self.read_u32(0))
            .field("height", &self.read_u32(4))
            .finish_non_exhaustive()
    }
}

impl UniformBlock {
    /// Serialize `params` into a zero-padded block
    pub fn pack<T: UniformParams>(params: &T) -> Self {
        let mut block = Self::default();
        let bytes = bytemuck::bytes_of(params);
        block.0[..bytes.len()].copy_from_slice(bytes);
        block
    }

    /// Reinterpret the leading bytes as `T`
    #[must_use]
    pub fn decode<T: UniformParams>(&self) -> T {
        bytemuck::pod_read_unaligned(&self.0[..std::mem::size_of::<T>()])
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn read_u32(&self, offset: usize) -> u32 {
        bytemuck::pod_read_unaligned(&self.0[offset..offset + 4])
    }

    #[must_use]
    pub fn read_i32(&self, offset: usize) -> i32 {
        bytemuck::pod_read_unaligned(&self.0[offset..offset + 4])
    }

    #[must_use]
    pub fn read_f32(&self, offset: usize) -> f32 {
        bytemuck::pod_read_unaligned(&self.0[offset..offset + 4])
    }
}

/// Near-dry detection (Pass0)
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct DepthParams {
    pub width: u32,
    pub height: u32,
    /// Depth below which a cell counts as dry
    pub dry_depth: f32,
    pub epsilon: f32,
}

/// Edge reconstruction (Pass1)
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ReconstructParams {
    pub width: u32,
    pub height: u32,
    pub one_over_dx: f32,
    pub one_over_dy: f32,
    pub dissipation_threshold: f32,
    pub two_theta: f32,
    pub epsilon: f32,
    pub white_water_decay_rate: f32,
    pub dt: f32,
    pub base_depth: f32,
    pub dx: f32,
    pub dy: f32,
}

/// Central-upwind fluxes (Pass2)
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FluxParams {
    pub width: u32,
    pub height: u32,
    pub g: f32,
    pub half_g: f32,
    pub dx: f32,
    pub dy: f32,
    pub epsilon: f32,
    /// Non-zero adds eddy-viscosity fluxes from the breaking field
    pub use_breaking: u32,
}

/// Time update (Pass3, all equation modes)
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct UpdateParams {
    pub width: u32,
    pub height: u32,
    pub dt: f32,
    pub dx: f32,
    pub dy: f32,
    pub one_over_dx: f32,
    pub one_over_dy: f32,
    pub g_over_dx: f32,
    pub g_over_dy: f32,
    pub time_scheme: u32,
    pub epsilon: f32,
    pub is_manning: u32,
    pub g: f32,
    pub friction: f32,
    /// 1 in the predictor, 2 in the corrector
    pub pred_or_corrector: u32,
    pub bcoef: f32,
    pub bcoef_g: f32,
    pub one_over_d2x: f32,
    pub one_over_d3x: f32,
    pub one_over_d2y: f32,
    pub one_over_d3y: f32,
    pub one_over_dxdy: f32,
    pub sea_level: f32,
}

/// Boundary conditions
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BoundaryParams {
    pub width: u32,
    pub height: u32,
    pub dt: f32,
    pub dx: f32,
    pub dy: f32,
    pub total_time: f32,
    pub reflect_x: u32,
    pub reflect_y: u32,
    pub pi: f32,
    pub boundary_width: u32,
    pub sea_level: f32,
    pub boundary_nx: u32,
    pub boundary_ny: u32,
    pub number_of_waves: u32,
    pub west: u32,
    pub east: u32,
    pub south: u32,
    pub north: u32,
    pub boundary_g: f32,
}

/// One PCR reduction step
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TridiagParams {
    pub width: u32,
    pub height: u32,
    /// Iteration index
    pub p: i32,
    /// Stride, `2^p`
    pub s: i32,
    /// State channel being solved for (1 = P, 2 = Q)
    pub channel: u32,
}

/// Tridiagonal coefficient assembly
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CoefParams {
    pub width: u32,
    pub height: u32,
    pub dx: f32,
    pub dy: f32,
    pub bcoef: f32,
    /// Non-zero uses the instantaneous total depth instead of still-water depth
    pub use_total_depth: u32,
    /// Cells within this distance of an edge get identity rows
    pub margin: u32,
    pub epsilon: f32,
}

/// Breaking eddy viscosity
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BreakingParams {
    pub width: u32,
    pub height: u32,
    pub dt: f32,
    pub dx: f32,
    pub dy: f32,
    pub g: f32,
    pub onset_threshold: f32,
    pub final_threshold: f32,
    pub transition_factor: f32,
    pub mixing_length: f32,
    pub white_water_decay_rate: f32,
    pub epsilon: f32,
}

/// Sediment reconstruction, fluxes, transport and bed update
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SedimentParams {
    pub width: u32,
    pub height: u32,
    pub dt: f32,
    pub dx: f32,
    pub dy: f32,
    pub g: f32,
    pub epsilon: f32,
    pub time_scheme: u32,
    pub pred_or_corrector: u32,
    pub d50: f32,
    pub specific_gravity: f32,
    pub porosity: f32,
    pub critical_shields: f32,
    pub erosion_coefficient: f32,
    pub settling_velocity: f32,
    pub friction: f32,
    pub is_manning: u32,
}

/// Fully nonlinear dispersion auxiliaries
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct DispersionParams {
    pub width: u32,
    pub height: u32,
    pub one_over_dx: f32,
    pub one_over_dy: f32,
    pub epsilon: f32,
}

/// Running statistics
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct StatisticsParams {
    pub width: u32,
    pub height: u32,
    /// Samples already accumulated
    pub samples: u32,
}

/// One increment of a sea-floor disturbance
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct DisturbanceParams {
    pub width: u32,
    pub height: u32,
    pub dx: f32,
    pub dy: f32,
    pub center_x: f32,
    pub center_y: f32,
    pub radius: f32,
    /// Peak uplift added by this dispatch
    pub delta: f32,
}

/// Gauge sampling
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GaugeParams {
    pub width: u32,
    pub height: u32,
    pub count: u32,
}

uniform_params!(
    DepthParams,
    ReconstructParams,
    FluxParams,
    UpdateParams,
    BoundaryParams,
    TridiagParams,
    CoefParams,
    BreakingParams,
    SedimentParams,
    DispersionParams,
    StatisticsParams,
    DisturbanceParams,
    GaugeParams,
);

/// Builds every parameter struct from the owned configuration
///
/// Holds a snapshot of the configuration and its derived constants; rebuild it
/// after a configuration patch.
#[derive(Debug, Clone)]
pub struct ParamBuilder {
    config: SimulationConfig,
    derived: DerivedConstants,
}

impl ParamBuilder {
    #[must_use]
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            config: config.clone(),
            derived: config.derived(),
        }
    }

    #[must_use]
    pub fn derived(&self) -> &DerivedConstants {
        &self.derived
    }

    #[must_use]
    pub fn depth(&self) -> DepthParams {
        DepthParams {
            width: self.config.width,
            height: self.config.height,
            dry_depth: self.derived.epsilon.sqrt(),
            epsilon: self.derived.epsilon,
        }
    }

    #[must_use]
    pub fn reconstruct(&self) -> ReconstructParams {
        let c = &self.config;
        let d = &self.derived;
        ReconstructParams {
            width: c.width,
            height: c.height,
            one_over_dx: d.one_over_dx,
            one_over_dy: d.one_over_dy,
            dissipation_threshold: c.breaking.onset_threshold,
            two_theta: d.two_theta,
            epsilon: d.epsilon,
            white_water_decay_rate: c.breaking.white_water_decay_rate,
            dt: d.dt,
            base_depth: c.base_depth,
            dx: c.dx,
            dy: c.dy,
        }
    }

    #[must_use]
    pub fn flux(&self) -> FluxParams {
        FluxParams {
            width: self.config.width,
            height: self.config.height,
            g: self.config.g,
            half_g: self.derived.half_g,
            dx: self.config.dx,
            dy: self.config.dy,
            epsilon: self.derived.epsilon,
            use_breaking: u32::from(self.config.breaking.enabled),
        }
    }

    #[must_use]
    pub fn update(&self, phase: Phase) -> UpdateParams {
        let c = &self.config;
        let d = &self.derived;
        UpdateParams {
            width: c.width,
            height: c.height,
            dt: d.dt,
            dx: c.dx,
            dy: c.dy,
            one_over_dx: d.one_over_dx,
            one_over_dy: d.one_over_dy,
            g_over_dx: d.g_over_dx,
            g_over_dy: d.g_over_dy,
            time_scheme: c.time_scheme.code(),
            epsilon: d.epsilon,
            is_manning: u32::from(c.is_manning),
            g: c.g,
            friction: c.friction,
            pred_or_corrector: phase.code(),
            bcoef: c.bcoef,
            bcoef_g: d.bcoef_g,
            one_over_d2x: d.one_over_d2x,
            one_over_d3x: d.one_over_d3x,
            one_over_d2y: d.one_over_d2y,
            one_over_d3y: d.one_over_d3y,
            one_over_dxdy: d.one_over_dxdy,
            sea_level: c.sea_level,
        }
    }

    /// Boundary parameters at simulation time `total_time`
    #[must_use]
    pub fn boundary(&self, total_time: f32) -> BoundaryParams {
        let c = &self.config;
        BoundaryParams {
            width: c.width,
            height: c.height,
            dt: self.derived.dt,
            dx: c.dx,
            dy: c.dy,
            total_time,
            reflect_x: self.derived.reflect_x,
            reflect_y: self.derived.reflect_y,
            pi: PI,
            boundary_width: c.boundary_width,
            sea_level: c.sea_level,
            boundary_nx: c.width - 1,
            boundary_ny: c.height - 1,
            number_of_waves: c.waves.len() as u32,
            west: c.boundaries.west.code(),
            east: c.boundaries.east.code(),
            south: c.boundaries.south.code(),
            north: c.boundaries.north.code(),
            boundary_g: c.g,
        }
    }

    /// PCR step `p` solving `channel`
    #[must_use]
    pub fn tridiag(&self, p: u32, channel: u32) -> TridiagParams {
        TridiagParams {
            width: self.config.width,
            height: self.config.height,
            p: p as i32,
            s: 1_i32 << p,
            channel,
        }
    }

    #[must_use]
    pub fn coefficients(&self, use_total_depth: bool) -> CoefParams {
        CoefParams {
            width: self.config.width,
            height: self.config.height,
            dx: self.config.dx,
            dy: self.config.dy,
            bcoef: self.config.bcoef,
            use_total_depth: u32::from(use_total_depth),
            margin: crate::BOUNDARY_MARGIN,
            epsilon: self.derived.epsilon,
        }
    }

    #[must_use]
    pub fn breaking(&self) -> BreakingParams {
        let b = &self.config.breaking;
        BreakingParams {
            width: self.config.width,
            height: self.config.height,
            dt: self.derived.dt,
            dx: self.config.dx,
            dy: self.config.dy,
            g: self.config.g,
            onset_threshold: b.onset_threshold,
            final_threshold: b.final_threshold,
            transition_factor: b.transition_factor,
            mixing_length: b.mixing_length,
            white_water_decay_rate: b.white_water_decay_rate,
            epsilon: self.derived.epsilon,
        }
    }

    #[must_use]
    pub fn sediment(&self, phase: Phase) -> SedimentParams {
        let c = &self.config;
        let s = &c.sediment;
        SedimentParams {
            width: c.width,
            height: c.height,
            dt: self.derived.dt,
            dx: c.dx,
            dy: c.dy,
            g: c.g,
            epsilon: self.derived.epsilon,
            time_scheme: c.time_scheme.code(),
            pred_or_corrector: phase.code(),
            d50: s.d50,
            specific_gravity: s.specific_gravity,
            porosity: s.porosity,
            critical_shields: s.critical_shields,
            erosion_coefficient: s.erosion_coefficient,
            settling_velocity: s.settling_velocity,
            friction: c.friction,
            is_manning: u32::from(c.is_manning),
        }
    }

    #[must_use]
    pub fn dispersion(&self) -> DispersionParams {
        DispersionParams {
            width: self.config.width,
            height: self.config.height,
            one_over_dx: self.derived.one_over_dx,
            one_over_dy: self.derived.one_over_dy,
            epsilon: self.derived.epsilon,
        }
    }

    #[must_use]
    pub fn statistics(&self, samples: u32) -> StatisticsParams {
        StatisticsParams {
            width: self.config.width,
            height: self.config.height,
            samples,
        }
    }

    /// Disturbance increment adding `delta` meters of peak uplift
    #[must_use]
    pub fn disturbance(&self, center: (f32, f32), radius: f32, delta: f32) -> DisturbanceParams {
        DisturbanceParams {
            width: self.config.width,
            height: self.config.height,
            dx: self.config.dx,
            dy: self.config.dy,
            center_x: center.0,
            center_y: center.1,
            radius,
            delta,
        }
    }

    #[must_use]
    pub fn gauges(&self) -> GaugeParams {
        GaugeParams {
            width: self.config.width,
            height: self.config.height,
            count: self.config.gauges.len() as u32,
        }
    }
}

/// Byte offsets of the layouts shared with shader authors
pub mod layout {
    /// Pass1 uniform offsets
    pub const RECONSTRUCT: &[(&str, usize)] = &[
        ("width", 0),
        ("height", 4),
        ("one_over_dx", 8),
        ("one_over_dy", 12),
        ("dissipation_threshold", 16),
        ("two_theta", 20),
        ("epsilon", 24),
        ("white_water_decay_rate", 28),
        ("dt", 32),
        ("base_depth", 36),
        ("dx", 40),
        ("dy", 44),
    ];

    /// Pass2 uniform offsets
    pub const FLUX: &[(&str, usize)] = &[
        ("width", 0),
        ("height", 4),
        ("g", 8),
        ("half_g", 12),
        ("dx", 16),
        ("dy", 20),
        ("epsilon", 24),
        ("use_breaking", 28),
    ];

    /// Pass3 uniform offsets
    pub const UPDATE: &[(&str, usize)] = &[
        ("width", 0),
        ("height", 4),
        ("dt", 8),
        ("dx", 12),
        ("dy", 16),
        ("one_over_dx", 20),
        ("one_over_dy", 24),
        ("g_over_dx", 28),
        ("g_over_dy", 32),
        ("time_scheme", 36),
        ("epsilon", 40),
        ("is_manning", 44),
        ("g", 48),
        ("friction", 52),
        ("pred_or_corrector", 56),
        ("bcoef", 60),
        ("bcoef_g", 64),
        ("one_over_d2x", 68),
        ("one_over_d3x", 72),
        ("one_over_d2y", 76),
        ("one_over_d3y", 80),
        ("one_over_dxdy", 84),
        ("sea_level", 88),
    ];

    /// Boundary pass uniform offsets
    pub const BOUNDARY: &[(&str, usize)] = &[
        ("width", 0),
        ("height", 4),
        ("dt", 8),
        ("dx", 12),
        ("dy", 16),
        ("total_time", 20),
        ("reflect_x", 24),
        ("reflect_y", 28),
        ("pi", 32),
        ("boundary_width", 36),
        ("sea_level", 40),
        ("boundary_nx", 44),
        ("boundary_ny", 48),
        ("number_of_waves", 52),
        ("west", 56),
        ("east", 60),
        ("south", 64),
        ("north", 68),
        ("boundary_g", 72),
    ];

    /// PCR step uniform offsets
    pub const TRIDIAG: &[(&str, usize)] = &[
        ("width", 0),
        ("height", 4),
        ("p", 8),
        ("s", 12),
        ("channel", 16),
    ];

    /// Offset of `name` in `table`
    #[must_use]
    pub fn offset(table: &[(&str, usize)], name: &str) -> Option<usize> {
        table.iter().find(|(n, _)| *n == name).map(|(_, o)| *o)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::mem::offset_of;

    macro_rules! assert_layout {
        ($ty:ty, $table:expr, [$($field:ident),+ $(,)?]) => {
            let names = [$(stringify!($field)),+];
            assert_eq!(names.len(), $table.len(), "layout table of {} is incomplete", stringify!($ty));
            $(
                assert_eq!(
                    Some(offset_of!($ty, $field)),
                    layout::offset($table, stringify!($field)),
                    "{}::{}",
                    stringify!($ty),
                    stringify!($field)
                );
            )+
        };
    }

    #[test]
    fn test_shared_layouts_match_structs() {
        assert_layout!(
            ReconstructParams,
            layout::RECONSTRUCT,
            [width, height, one_over_dx, one_over_dy, dissipation_threshold, two_theta,
             epsilon, white_water_decay_rate, dt, base_depth, dx, dy]
        );
        assert_layout!(
            FluxParams,
            layout::FLUX,
            [width, height, g, half_g, dx, dy, epsilon, use_breaking]
        );
        assert_layout!(
            UpdateParams,
            layout::UPDATE,
            [width, height, dt, dx, dy, one_over_dx, one_over_dy, g_over_dx, g_over_dy,
             time_scheme, epsilon, is_manning, g, friction, pred_or_corrector, bcoef, bcoef_g,
             one_over_d2x, one_over_d3x, one_over_d2y, one_over_d3y, one_over_dxdy, sea_level]
        );
        assert_layout!(
            BoundaryParams,
            layout::BOUNDARY,
            [width, height, dt, dx, dy, total_time, reflect_x, reflect_y, pi, boundary_width,
             sea_level, boundary_nx, boundary_ny, number_of_waves, west, east, south, north,
             boundary_g]
        );
        assert_layout!(TridiagParams, layout::TRIDIAG, [width, height, p, s, channel]);
        assert_eq!(LAYOUT_VERSION, 1);
    }

    #[test]
    fn test_pack_writes_little_endian_at_offsets() {
        let builder = ParamBuilder::new(&SimulationConfig::default());
        let block = UniformBlock::pack(&builder.update(Phase::Corrector));

        assert_eq!(block.read_u32(0), 800);
        assert_eq!(block.read_u32(4), 600);
        assert_eq!(block.read_u32(36), 2);
        assert_eq!(block.read_u32(56), 2);
        assert_relative_eq!(block.read_f32(48), 9.80665);
        // Bytes past the struct stay zero
        assert!(block.as_bytes()[92..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_tridiag_step_fields() {
        let builder = ParamBuilder::new(&SimulationConfig::default());
        let block = UniformBlock::pack(&builder.tridiag(4, 1));
        assert_eq!(block.read_i32(8), 4);
        assert_eq!(block.read_i32(12), 16);
        assert_eq!(block.read_u32(16), 1);
    }

    #[test]
    fn test_decode_round_trips_typed_params() {
        let builder = ParamBuilder::new(&SimulationConfig::default());
        let params = builder.boundary(12.5);
        let decoded: BoundaryParams = UniformBlock::pack(&params).decode();
        assert_eq!(decoded, params);
        assert_eq!(decoded.reflect_y, 2 * (600 - 3));
    }
}
