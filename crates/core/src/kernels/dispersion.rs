//! Dispersion: tridiagonal coefficients, parallel cyclic reduction and the
//! fully nonlinear auxiliaries

use super::{at, desingularize, for_each_cell_multi, Axis};
use crate::field::{FieldData, Texel};
use crate::params::{CoefParams, DispersionParams, TridiagParams};

const IDENTITY_ROW: Texel = [0.0, 1.0, 0.0, 0.0];

/// Coefficient assembly for the implicit dispersion operator
///
/// Rows are `a x[i-1] + b x[i] + c x[i+1] = rhs` along x (coef_x) and y (coef_y).
/// Cells within `margin` of any edge, near-dry cells, cells close to land and
/// cells without positive depth get identity rows.
pub(crate) fn coefficients(params: &CoefParams, inputs: &[&FieldData], outputs: &mut [FieldData]) {
    let [_state, bottom, near_dry] = inputs else {
        unreachable!("validated binding count")
    };
    let width = params.width as usize;
    let height = params.height as usize;
    let margin = params.margin as usize;
    let dry_depth = params.epsilon.sqrt();
    let scale = params.bcoef + 1.0 / 3.0;

    let depth = |x: usize, y: usize, dx: isize, dy: isize| {
        if params.use_total_depth != 0 {
            at(near_dry, x, y, dx, dy)[0]
        } else {
            (-at(bottom, x, y, dx, dy)[2]).max(0.0)
        }
    };

    for_each_cell_multi::<2, _>(outputs, |x, y| {
        let in_margin = x < margin || y < margin || x + margin >= width || y + margin >= height;
        let d = depth(x, y, 0, 0);
        if in_margin || bottom.get(x, y)[3] < 0.0 || near_dry.get(x, y)[1] > 0.0 || d <= dry_depth {
            return [IDENTITY_ROW, IDENTITY_ROW];
        }

        let row = |spacing: f32, slope: f32| {
            let k = scale * d * d / (spacing * spacing);
            let skew = d * slope / (6.0 * spacing);
            [skew - k, 1.0 + 2.0 * k, -skew - k, 0.0]
        };
        let d_x = (depth(x, y, 1, 0) - depth(x, y, -1, 0)) / (2.0 * params.dx);
        let d_y = (depth(x, y, 0, 1) - depth(x, y, 0, -1)) / (2.0 * params.dy);
        [row(params.dx, d_x), row(params.dy, d_y)]
    });
}

/// One PCR reduction row update
///
/// `centre`, `below` and `above` are `(a, b, c, d)` rows at offsets 0, -s, +s.
#[inline]
fn reduce(centre: Texel, below: Texel, above: Texel) -> Texel {
    let [a, b, c, d] = centre;
    let k1 = a / below[1];
    let k2 = c / above[1];
    [
        -below[0] * k1,
        b - below[2] * k1 - above[0] * k2,
        -above[2] * k2,
        d - below[3] * k1 - above[3] * k2,
    ]
}

/// One PCR iteration along `axis`
///
/// Iteration 0 takes the right-hand side from the solved channel of `rhs`;
/// later iterations carry it in channel 3 of the reduced coefficients. Rows
/// beyond the grid act as identity rows with a zero right-hand side.
pub(crate) fn pcr_step(
    params: &TridiagParams,
    axis: Axis,
    inputs: &[&FieldData],
    outputs: &mut [FieldData],
) {
    let [coef, rhs] = inputs else {
        unreachable!("validated binding count")
    };
    let width = params.width as usize;
    let height = params.height as usize;
    let stride = params.s as isize;
    let channel = params.channel as usize;
    let first = params.p == 0;

    let row = |x: isize, y: isize| -> Texel {
        if x < 0 || y < 0 || x >= width as isize || y >= height as isize {
            return IDENTITY_ROW;
        }
        let (x, y) = (x as usize, y as usize);
        let mut row = coef.get(x, y);
        if first {
            row[3] = rhs.get(x, y)[channel];
        }
        row
    };

    for_each_cell_multi::<2, _>(outputs, |x, y| {
        let (xi, yi) = (x as isize, y as isize);
        let (below, above) = match axis {
            Axis::X => (row(xi - stride, yi), row(xi + stride, yi)),
            Axis::Y => (row(xi, yi - stride), row(xi, yi + stride)),
        };
        let reduced = reduce(row(xi, yi), below, above);
        let mut solution = rhs.get(x, y);
        solution[channel] = reduced[3] / reduced[1];
        [reduced, solution]
    });
}

/// Solve one tridiagonal line by parallel cyclic reduction on the host
///
/// Applies exactly the reduction of the PCR kernel; `a[0]` and `c[n-1]` are
/// ignored.
///
/// # Panics
///
/// Panics if the four slices differ in length
#[must_use]
pub fn pcr_solve(a: &[f32], b: &[f32], c: &[f32], d: &[f32]) -> Vec<f32> {
    let n = b.len();
    assert!(a.len() == n && c.len() == n && d.len() == n, "line length mismatch");
    let mut rows: Vec<Texel> = (0..n)
        .map(|i| {
            let lower = if i == 0 { 0.0 } else { a[i] };
            let upper = if i + 1 == n { 0.0 } else { c[i] };
            [lower, b[i], upper, d[i]]
        })
        .collect();
    let row = |rows: &[Texel], i: isize| {
        if i < 0 || i >= n as isize {
            IDENTITY_ROW
        } else {
            rows[i as usize]
        }
    };

    let mut stride = 1_isize;
    while (stride as usize) < n {
        rows = (0..n as isize)
            .map(|i| reduce(row(&rows, i), row(&rows, i - stride), row(&rows, i + stride)))
            .collect();
        stride *= 2;
    }
    rows.iter().map(|r| r[3] / r[1]).collect()
}

/// Sequential Thomas algorithm, the reference for [`pcr_solve`]
///
/// # Panics
///
/// Panics if the four slices differ in length
#[must_use]
pub fn thomas_solve(a: &[f32], b: &[f32], c: &[f32], d: &[f32]) -> Vec<f32> {
    let n = b.len();
    assert!(a.len() == n && c.len() == n && d.len() == n, "line length mismatch");
    if n == 0 {
        return Vec::new();
    }
    let mut c_prime = vec![0.0_f64; n];
    let mut d_prime = vec![0.0_f64; n];
    c_prime[0] = f64::from(c[0]) / f64::from(b[0]);
    d_prime[0] = f64::from(d[0]) / f64::from(b[0]);
    for i in 1..n {
        let denom = f64::from(b[i]) - f64::from(a[i]) * c_prime[i - 1];
        c_prime[i] = f64::from(c[i]) / denom;
        d_prime[i] = (f64::from(d[i]) - f64::from(a[i]) * d_prime[i - 1]) / denom;
    }
    let mut x = vec![0.0_f64; n];
    x[n - 1] = d_prime[n - 1];
    for i in (0..n - 1).rev() {
        x[i] = d_prime[i] - c_prime[i] * x[i + 1];
    }
    x.into_iter().map(|v| v as f32).collect()
}

/// Derivative fields of the fully nonlinear correction
///
/// Layers: 0 (u, v, h, d), 1 (u_xx, u_yy, v_xx, v_yy), 2 (u_xy, v_xy, 0, 0),
/// 3 (u_x, u_y, v_x, v_y), 4 (h_x, h_y, d_x, d_y), 5 (eta, h, d, near-dry).
pub(crate) fn auxiliaries(
    params: &DispersionParams,
    inputs: &[&FieldData],
    outputs: &mut [FieldData],
) {
    let [state, bottom, near_dry] = inputs else {
        unreachable!("validated binding count")
    };
    let (rdx, rdy) = (params.one_over_dx, params.one_over_dy);
    let epsilon = params.epsilon;

    for_each_cell_multi::<6, _>(outputs, |x, y| {
        let h = |dx: isize, dy: isize| at(near_dry, x, y, dx, dy)[0];
        let d = |dx: isize, dy: isize| (-at(bottom, x, y, dx, dy)[2]).max(0.0);
        let vel = |dx: isize, dy: isize| {
            let s = at(state, x, y, dx, dy);
            let depth = h(dx, dy);
            (
                desingularize(depth, s[1], epsilon),
                desingularize(depth, s[2], epsilon),
            )
        };

        let (u, v) = vel(0, 0);
        let (ue, ve) = vel(1, 0);
        let (uw, vw) = vel(-1, 0);
        let (un, vn) = vel(0, 1);
        let (us, vs) = vel(0, -1);
        let (une, vne) = vel(1, 1);
        let (unw, vnw) = vel(-1, 1);
        let (use_, vse) = vel(1, -1);
        let (usw, vsw) = vel(-1, -1);

        let mixed = 0.25 * rdx * rdy;
        let nd = near_dry.get(x, y);
        [
            [u, v, h(0, 0), d(0, 0)],
            [
                (ue - 2.0 * u + uw) * rdx * rdx,
                (un - 2.0 * u + us) * rdy * rdy,
                (ve - 2.0 * v + vw) * rdx * rdx,
                (vn - 2.0 * v + vs) * rdy * rdy,
            ],
            [
                (une - use_ - unw + usw) * mixed,
                (vne - vse - vnw + vsw) * mixed,
                0.0,
                0.0,
            ],
            [
                0.5 * (ue - uw) * rdx,
                0.5 * (un - us) * rdy,
                0.5 * (ve - vw) * rdx,
                0.5 * (vn - vs) * rdy,
            ],
            [
                0.5 * (h(1, 0) - h(-1, 0)) * rdx,
                0.5 * (h(0, 1) - h(0, -1)) * rdy,
                0.5 * (d(1, 0) - d(-1, 0)) * rdx,
                0.5 * (d(0, 1) - d(0, -1)) * rdy,
            ],
            [state.get(x, y)[0], nd[0], d(0, 0), nd[1]],
        ]
    });
}

/// Stack the six auxiliary grids into the layered dispersion field
pub(crate) fn group(inputs: &[&FieldData], outputs: &mut [FieldData]) {
    let out = &mut outputs[0];
    let layer = out.width * out.height;
    for (z, aux) in inputs.iter().enumerate() {
        out.data[z * layer..(z + 1) * layer].copy_from_slice(&aux.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::params::ParamBuilder;
    use approx::assert_relative_eq;

    fn line(n: usize) -> (Vec<f32>, Vec<f32>, Vec<f32>, Vec<f32>) {
        let a: Vec<f32> = (0..n).map(|i| -0.3 - 0.01 * (i % 5) as f32).collect();
        let c: Vec<f32> = (0..n).map(|i| -0.4 + 0.02 * (i % 3) as f32).collect();
        let b: Vec<f32> = (0..n).map(|i| 1.9 + 0.05 * (i % 7) as f32).collect();
        let d: Vec<f32> = (0..n).map(|i| (i as f32 * 0.37).sin()).collect();
        (a, b, c, d)
    }

    #[test]
    fn test_pcr_matches_thomas() {
        for n in [1, 2, 7, 8, 33, 100] {
            let (a, b, c, d) = line(n);
            let pcr = pcr_solve(&a, &b, &c, &d);
            let thomas = thomas_solve(&a, &b, &c, &d);
            for (p, t) in pcr.iter().zip(&thomas) {
                assert_relative_eq!(p, t, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_identity_rows_pass_through() {
        let n = 16;
        let a = vec![0.0; n];
        let b = vec![1.0; n];
        let c = vec![0.0; n];
        let d: Vec<f32> = (0..n).map(|i| i as f32 * 1.5 - 3.0).collect();
        assert_eq!(pcr_solve(&a, &b, &c, &d), d);
    }

    #[test]
    fn test_coefficients_identity_in_margin() {
        let config = SimulationConfig {
            width: 16,
            height: 16,
            equation: crate::config::EquationMode::Boussinesq,
            ..SimulationConfig::default()
        };
        let params = ParamBuilder::new(&config).coefficients(false);
        let state = FieldData::new(16, 16);
        let bottom = FieldData::with_value(16, 16, [-2.0, -2.0, -2.0, 99.0]);
        let near_dry = FieldData::with_value(16, 16, [2.0, 0.0, 2.0, 0.0]);
        let mut out = vec![FieldData::new(16, 16), FieldData::new(16, 16)];
        coefficients(&params, &[&state, &bottom, &near_dry], &mut out);

        for (x, y) in [(0, 5), (2, 5), (13, 8), (7, 15), (7, 2)] {
            assert_eq!(out[0].get(x, y), IDENTITY_ROW, "({x}, {y})");
            assert_eq!(out[1].get(x, y), IDENTITY_ROW, "({x}, {y})");
        }
        let row = out[0].get(8, 8);
        let k = (1.0 / 15.0 + 1.0 / 3.0) * 4.0;
        assert_relative_eq!(row[0], -k, epsilon = 1e-5);
        assert_relative_eq!(row[1], 1.0 + 2.0 * k, epsilon = 1e-5);
        assert_relative_eq!(row[2], -k, epsilon = 1e-5);
    }

    #[test]
    fn test_group_stacks_layers() {
        let aux: Vec<FieldData> = (0..6)
            .map(|z| FieldData::with_value(4, 4, [z as f32; 4]))
            .collect();
        let refs: Vec<&FieldData> = aux.iter().collect();
        let mut out = vec![FieldData::new_3d(4, 4, 6)];
        group(&refs, &mut out);
        for z in 0..6 {
            assert_eq!(out[0].get_3d(3, 2, z), [z as f32; 4]);
        }
    }
}
