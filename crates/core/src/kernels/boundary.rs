//! Boundary conditions for the hydrodynamic and sediment state

use super::{for_each_cell, for_each_cell_multi};
use crate::field::{FieldData, Texel};
use crate::params::{BoundaryParams, SedimentParams};
use crate::BOUNDARY_MARGIN;

const WALL: u32 = 0;
const SPONGE: u32 = 1;
const INCIDENT_WAVE: u32 = 2;
const PERIODIC: u32 = 3;

/// Where a boundary cell takes its value from along one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Source {
    index: usize,
    /// Negate the normal discharge (mirrored ghost cell)
    flip: bool,
    /// Zero the normal discharge (the wall cell itself)
    zero: bool,
}

/// Resolve the source index of `i` on an axis of length `n`
///
/// `low` and `high` are the boundary codes of the two ends, `reflect` is
/// `2 * (n - 3)`.
fn resolve(i: usize, n: usize, low: u32, high: u32, reflect: usize) -> Source {
    let margin = BOUNDARY_MARGIN as usize;
    let mut source = Source {
        index: i,
        flip: false,
        zero: false,
    };
    let period = n - 2 * margin;
    if i < margin {
        match low {
            WALL if i < 2 => {
                source.index = 4 - i;
                source.flip = true;
            }
            WALL => source.zero = true,
            PERIODIC => source.index = i + period,
            _ => {}
        }
    } else if i + margin >= n {
        match high {
            WALL if i + 2 >= n => {
                source.index = reflect - i;
                source.flip = true;
            }
            WALL => source.zero = true,
            PERIODIC => source.index = i - period,
            _ => {}
        }
    }
    source
}

/// Cosine taper factor of a sponge layer, 0 at the edge and 1 at `width` cells in
fn sponge_factor(distance: usize, width: u32) -> f32 {
    if width == 0 || distance >= width as usize {
        return 1.0;
    }
    let fraction = distance as f32 / width as f32;
    0.5 - 0.5 * (std::f32::consts::PI * fraction).cos()
}

/// Linear wave number from the Eckart approximation
fn wave_number(omega: f32, depth: f32, g: f32) -> f32 {
    let k0 = omega * omega / g;
    let tanh = (k0 * depth).tanh().max(1e-6);
    k0 / tanh.sqrt()
}

/// Free surface and discharges of the incident wave train at (x, y)
fn incident_state(params: &BoundaryParams, waves: &FieldData, x: usize, y: usize, depth: f32) -> Texel {
    let px = x as f32 * params.dx;
    let py = y as f32 * params.dy;
    let depth = depth.max(1e-3);
    let mut eta = 0.0;
    let mut p = 0.0;
    let mut q = 0.0;
    for wave in waves.data.iter().take(params.number_of_waves as usize) {
        let [amplitude, period, direction, phase] = *wave;
        if period <= 0.0 {
            continue;
        }
        let omega = 2.0 * params.pi / period;
        let k = wave_number(omega, depth, params.boundary_g);
        let (sin_dir, cos_dir) = direction.sin_cos();
        let elevation =
            amplitude * (k * (px * cos_dir + py * sin_dir) - omega * params.total_time + phase).cos();
        let celerity = omega / k;
        eta += elevation;
        p += elevation * celerity * cos_dir;
        q += elevation * celerity * sin_dir;
    }
    [params.sea_level + eta, p, q, 0.0]
}

/// Boundary pass: fill the three outer cells of every edge
///
/// Wall edges mirror the interior around the third cell, periodic edges copy
/// from the opposite interior, sponge layers damp towards still water and
/// incident-wave edges impose the linear wave train. The breaking state is
/// extended with zero gradient.
pub(crate) fn apply(params: &BoundaryParams, inputs: &[&FieldData], outputs: &mut [FieldData]) {
    let [state, bottom, waves, breaking] = inputs else {
        unreachable!("validated binding count")
    };
    let width = params.width as usize;
    let height = params.height as usize;
    let margin = BOUNDARY_MARGIN as usize;
    let sides = [params.west, params.east, params.south, params.north];

    for_each_cell_multi::<2, _>(outputs, |x, y| {
        let sx = resolve(x, width, params.west, params.east, params.reflect_x as usize);
        let sy = resolve(y, height, params.south, params.north, params.reflect_y as usize);
        let mut value = state.get(sx.index, sy.index);
        if sx.flip {
            value[1] = -value[1];
        }
        if sy.flip {
            value[2] = -value[2];
        }
        if sx.zero {
            value[1] = 0.0;
        }
        if sy.zero {
            value[2] = 0.0;
        }

        let distances = [x, width - 1 - x, y, height - 1 - y];
        let b = bottom.get(x, y)[2];
        for (side, distance) in sides.iter().zip(distances) {
            match *side {
                SPONGE => {
                    let gamma = sponge_factor(distance, params.boundary_width);
                    value[0] = params.sea_level + (value[0] - params.sea_level) * gamma;
                    value[1] *= gamma;
                    value[2] *= gamma;
                }
                INCIDENT_WAVE if distance < margin => {
                    value = incident_state(params, waves, x, y, params.sea_level - b);
                }
                _ => {}
            }
        }
        let in_margin = distances.iter().any(|&d| d < margin);
        if in_margin && value[0] < b {
            value = [b, 0.0, 0.0, 0.0];
        }

        let bx = x.clamp(margin, width - 1 - margin);
        let by = y.clamp(margin, height - 1 - margin);
        [value, breaking.get(bx, by)]
    });
}

/// Sediment boundary: zero-gradient extension of the interior concentration
pub(crate) fn homogenize(params: &SedimentParams, inputs: &[&FieldData], outputs: &mut [FieldData]) {
    let [sediment] = inputs else {
        unreachable!("validated binding count")
    };
    let margin = BOUNDARY_MARGIN as usize;
    let width = params.width as usize;
    let height = params.height as usize;
    for_each_cell(&mut outputs[0], |x, y| {
        sediment.get(
            x.clamp(margin, width - 1 - margin),
            y.clamp(margin, height - 1 - margin),
        )
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wall_mirrors_around_third_cell() {
        let n = 20;
        let reflect = 2 * (n - 3);
        assert_eq!(resolve(0, n, WALL, WALL, reflect).index, 4);
        assert_eq!(resolve(1, n, WALL, WALL, reflect).index, 3);
        assert!(resolve(1, n, WALL, WALL, reflect).flip);
        assert!(resolve(2, n, WALL, WALL, reflect).zero);
        assert_eq!(resolve(n - 1, n, WALL, WALL, reflect).index, n - 5);
        assert_eq!(resolve(n - 2, n, WALL, WALL, reflect).index, n - 4);
        assert!(resolve(n - 3, n, WALL, WALL, reflect).zero);
        assert_eq!(resolve(10, n, WALL, WALL, reflect).index, 10);
    }

    #[test]
    fn test_periodic_wraps_interior() {
        let n = 20;
        let reflect = 2 * (n - 3);
        assert_eq!(resolve(0, n, PERIODIC, PERIODIC, reflect).index, n - 6);
        assert_eq!(resolve(2, n, PERIODIC, PERIODIC, reflect).index, n - 4);
        assert_eq!(resolve(n - 3, n, PERIODIC, PERIODIC, reflect).index, 3);
        assert_eq!(resolve(n - 1, n, PERIODIC, PERIODIC, reflect).index, 5);
    }

    #[test]
    fn test_sponge_taper() {
        assert_eq!(sponge_factor(0, 10), 0.0);
        assert!((sponge_factor(5, 10) - 0.5).abs() < 1e-6);
        assert_eq!(sponge_factor(10, 10), 1.0);
        assert_eq!(sponge_factor(3, 0), 1.0);
    }

    #[test]
    fn test_eckart_limits() {
        let g = 9.81;
        // Shallow water: k ~ omega / sqrt(g h)
        let omega = 0.1;
        let k = wave_number(omega, 1.0, g);
        assert!((k - omega / (g * 1.0_f32).sqrt()).abs() / k < 0.01);
        // Deep water: k ~ omega^2 / g
        let omega = 5.0;
        let k = wave_number(omega, 100.0, g);
        assert!((k - omega * omega / g).abs() / k < 1e-3);
    }
}
