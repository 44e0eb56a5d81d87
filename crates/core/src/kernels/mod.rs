//! CPU reference kernels
//!
//! One function per [`KernelId`], honouring the same binding contract as the GPU
//! shaders: `inputs` holds the read bindings and `outputs` the write bindings, both
//! in declaration order. Every kernel is a gather: it overwrites each texel of each
//! output from the inputs only, so rows are processed in parallel with rayon.
//!
//! The numerics are a compact central-upwind finite-volume scheme with minmod
//! reconstruction. They are a reference for the orchestration, not a replica of
//! any particular shader set.

mod boundary;
mod breaking;
mod dispersion;
mod sediment;
mod shallow_water;
mod statistics;

pub use dispersion::{pcr_solve, thomas_solve};

use crate::field::{FieldData, Texel};
use crate::kernel::KernelId;
use crate::params::UniformBlock;
use rayon::prelude::*;

/// Run `kernel` on the host
///
/// # Panics
///
/// Panics if the binding counts do not match the kernel layout; bindings are
/// validated when the pass is prepared.
pub(crate) fn dispatch(
    kernel: KernelId,
    uniforms: &UniformBlock,
    inputs: &[&FieldData],
    outputs: &mut [FieldData],
) {
    debug_assert_eq!(inputs.len(), kernel.read_count(), "{kernel:?} inputs");
    debug_assert_eq!(
        outputs.len(),
        kernel.layout().len() - kernel.read_count(),
        "{kernel:?} outputs"
    );
    match kernel {
        KernelId::NearDry => shallow_water::near_dry(&uniforms.decode(), inputs, outputs),
        KernelId::Reconstruct => shallow_water::reconstruct(&uniforms.decode(), inputs, outputs),
        KernelId::Flux => shallow_water::flux(&uniforms.decode(), inputs, outputs),
        KernelId::UpdateNlsw => {
            shallow_water::update(&uniforms.decode(), shallow_water::Dispersion::None, inputs, outputs);
        }
        KernelId::UpdateBoussinesq => shallow_water::update(
            &uniforms.decode(),
            shallow_water::Dispersion::Boussinesq,
            inputs,
            outputs,
        ),
        KernelId::UpdateCoulwave => shallow_water::update(
            &uniforms.decode(),
            shallow_water::Dispersion::FullyNonlinear,
            inputs,
            outputs,
        ),
        KernelId::SedimentReconstruct => sediment::reconstruct(&uniforms.decode(), inputs, outputs),
        KernelId::SedimentFlux => sediment::flux(&uniforms.decode(), inputs, outputs),
        KernelId::SedimentUpdate => sediment::update(&uniforms.decode(), inputs, outputs),
        KernelId::SedimentBed => sediment::bed_update(&uniforms.decode(), inputs, outputs),
        KernelId::SedimentBoundary => boundary::homogenize(&uniforms.decode(), inputs, outputs),
        KernelId::Breaking => breaking::eddy_viscosity(&uniforms.decode(), inputs, outputs),
        KernelId::DispersionAux => dispersion::auxiliaries(&uniforms.decode(), inputs, outputs),
        KernelId::DispersionGroup => dispersion::group(inputs, outputs),
        KernelId::Boundary => boundary::apply(&uniforms.decode(), inputs, outputs),
        KernelId::TridiagCoef => dispersion::coefficients(&uniforms.decode(), inputs, outputs),
        KernelId::TridiagX => dispersion::pcr_step(&uniforms.decode(), Axis::X, inputs, outputs),
        KernelId::TridiagY => dispersion::pcr_step(&uniforms.decode(), Axis::Y, inputs, outputs),
        KernelId::CalcMeans => statistics::means(&uniforms.decode(), inputs, outputs),
        KernelId::CalcWaveHeight => statistics::wave_height(&uniforms.decode(), inputs, outputs),
        KernelId::Disturbance => statistics::disturbance(&uniforms.decode(), inputs, outputs),
        KernelId::SampleGauges => statistics::sample_gauges(inputs, outputs),
    }
}

/// Grid direction of a line operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Axis {
    X,
    Y,
}

/// Overwrite every texel of `out` with `f(x, y)`
pub(crate) fn for_each_cell<F>(out: &mut FieldData, f: F)
where
    F: Fn(usize, usize) -> Texel + Sync,
{
    let width = out.width;
    out.data
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, texel) in row.iter_mut().enumerate() {
                *texel = f(x, y);
            }
        });
}

/// Overwrite texel (x, y) of each of `N` equally sized outputs with `f(x, y)[k]`
pub(crate) fn for_each_cell_multi<const N: usize, F>(outputs: &mut [FieldData], f: F)
where
    F: Fn(usize, usize) -> [Texel; N] + Sync,
{
    debug_assert_eq!(outputs.len(), N);
    let width = outputs[0].width;
    let height = outputs[0].height;
    let cells: Vec<[Texel; N]> = (0..width * height)
        .into_par_iter()
        .map(|i| f(i % width, i / width))
        .collect();
    for (i, values) in cells.into_iter().enumerate() {
        for (out, value) in outputs.iter_mut().zip(values) {
            out.data[i] = value;
        }
    }
}

/// Generalised minmod limiter
#[inline]
pub(crate) fn minmod(a: f32, b: f32, c: f32) -> f32 {
    if a > 0.0 && b > 0.0 && c > 0.0 {
        a.min(b).min(c)
    } else if a < 0.0 && b < 0.0 && c < 0.0 {
        a.max(b).max(c)
    } else {
        0.0
    }
}

/// Velocity from a discharge without blowing up as `h` goes to zero
#[inline]
pub(crate) fn desingularize(h: f32, discharge: f32, epsilon: f32) -> f32 {
    let h2 = h * h;
    2.0 * h * discharge / (h2 + h2.max(epsilon))
}

/// Field bound to an optional slot is a 1×1 placeholder
#[inline]
pub(crate) fn is_placeholder(field: &FieldData) -> bool {
    field.width == 1 && field.height == 1
}

/// Signed neighbour access helper
#[inline]
pub(crate) fn at(field: &FieldData, x: usize, y: usize, dx: isize, dy: isize) -> Texel {
    field.at(x as isize + dx, y as isize + dy)
}

/// Time integration shared by the hydrodynamic and sediment updates
///
/// `scheme` and `phase` follow the uniform encoding: scheme 0 Euler, 1 AB3,
/// 2 AB3 predictor / AM4 corrector; phase 1 predictor, 2 corrector.
#[inline]
pub(crate) fn integrate(
    scheme: u32,
    phase: u32,
    dt: f32,
    base: f32,
    rate: f32,
    predicted: f32,
    old: f32,
    old_old: f32,
) -> f32 {
    match (scheme, phase) {
        (0, _) => base + dt * rate,
        (2, 2) => base + dt / 24.0 * (9.0 * rate + 19.0 * predicted - 5.0 * old + old_old),
        _ => base + dt / 12.0 * (23.0 * rate - 16.0 * old + 5.0 * old_old),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minmod() {
        assert_eq!(minmod(1.0, 2.0, 3.0), 1.0);
        assert_eq!(minmod(-1.0, -2.0, -0.5), -0.5);
        assert_eq!(minmod(1.0, -2.0, 3.0), 0.0);
        // Reflection symmetry used by the wall boundary
        assert_eq!(minmod(-3.0, -2.0, -1.0), -minmod(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_desingularize_matches_division_when_wet() {
        let u = desingularize(2.0, 3.0, 1e-6);
        assert!((u - 1.5).abs() < 1e-6);
        assert_eq!(desingularize(0.0, 1.0, 1e-6), 0.0);
    }

    #[test]
    fn test_integrators() {
        // Euler
        assert_eq!(integrate(0, 1, 0.5, 1.0, 2.0, 0.0, 0.0, 0.0), 2.0);
        // AB3 with constant history reduces to Euler
        let ab3 = integrate(1, 1, 0.5, 1.0, 2.0, 0.0, 2.0, 2.0);
        assert!((ab3 - 2.0).abs() < 1e-6);
        // AM4 corrector with constant rates reduces to Euler
        let am4 = integrate(2, 2, 0.5, 1.0, 2.0, 2.0, 2.0, 2.0);
        assert!((am4 - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_multi_output_scatter() {
        let mut outputs = vec![FieldData::new(3, 2), FieldData::new(3, 2)];
        for_each_cell_multi(&mut outputs, |x, y| {
            [[x as f32; 4], [y as f32; 4]]
        });
        assert_eq!(outputs[0].get(2, 1), [2.0; 4]);
        assert_eq!(outputs[1].get(2, 1), [1.0; 4]);
    }
}
