//! Near-dry detection, edge reconstruction, central-upwind fluxes and the time update

use super::{at, desingularize, for_each_cell, for_each_cell_multi, integrate, is_placeholder, minmod};
use crate::field::{FieldData, Texel};
use crate::params::{DepthParams, FluxParams, ReconstructParams, UpdateParams};

/// Dispersive terms added by the update pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispersion {
    None,
    /// Weakly nonlinear Boussinesq terms on still-water depth
    Boussinesq,
    /// Boussinesq terms plus the fully nonlinear correction
    FullyNonlinear,
}

/// Pass0: total depth and the near-dry flag of each cell
///
/// A cell is near-dry when it or any of its eight neighbours is dry.
pub(crate) fn near_dry(params: &DepthParams, inputs: &[&FieldData], outputs: &mut [FieldData]) {
    let [state, bottom] = inputs else {
        unreachable!("validated binding count")
    };
    let depth = |x: usize, y: usize, dx: isize, dy: isize| {
        (at(state, x, y, dx, dy)[0] - at(bottom, x, y, dx, dy)[2]).max(0.0)
    };
    for_each_cell(&mut outputs[0], |x, y| {
        let h = depth(x, y, 0, 0);
        let mut min_h = h;
        for dy in -1..=1 {
            for dx in -1..=1 {
                min_h = min_h.min(depth(x, y, dx, dy));
            }
        }
        let flag = if min_h < params.dry_depth { 1.0 } else { 0.0 };
        [h, flag, min_h, 0.0]
    });
}

/// Half of the limited slope; zero in near-dry cells
#[inline]
fn half_slope(two_theta: f32, back: f32, fwd: f32, first_order: bool) -> f32 {
    if first_order {
        0.0
    } else {
        0.25 * minmod(two_theta * back, fwd + back, two_theta * fwd)
    }
}

/// Pass1: limited face values of depth, velocities and tracer concentration
///
/// Output channels are the (N, E, S, W) faces of each cell.
pub(crate) fn reconstruct(
    params: &ReconstructParams,
    inputs: &[&FieldData],
    outputs: &mut [FieldData],
) {
    let [state, bottom, near_dry] = inputs else {
        unreachable!("validated binding count")
    };
    let two_theta = params.two_theta;
    let epsilon = params.epsilon;

    for_each_cell_multi::<4, _>(outputs, |x, y| {
        let here = state.get(x, y);
        let east = at(state, x, y, 1, 0);
        let west = at(state, x, y, -1, 0);
        let north = at(state, x, y, 0, 1);
        let south = at(state, x, y, 0, -1);
        let first_order = near_dry.get(x, y)[1] > 0.0;

        // Face values per channel, (N, E, S, W)
        let mut faces = [[0.0_f32; 4]; 4];
        for ch in 0..4 {
            let sx = half_slope(
                two_theta,
                here[ch] - west[ch],
                east[ch] - here[ch],
                first_order,
            );
            let sy = half_slope(
                two_theta,
                here[ch] - south[ch],
                north[ch] - here[ch],
                first_order,
            );
            faces[ch] = [here[ch] + sy, here[ch] + sx, here[ch] - sy, here[ch] - sx];
        }

        let b = bottom.get(x, y);
        let face_bottom = [
            b[0],
            b[1],
            at(bottom, x, y, 0, -1)[0],
            at(bottom, x, y, -1, 0)[1],
        ];

        let mut h = [0.0; 4];
        let mut u = [0.0; 4];
        let mut v = [0.0; 4];
        let mut c = [0.0; 4];
        for face in 0..4 {
            let depth = (faces[0][face] - face_bottom[face]).max(0.0);
            h[face] = depth;
            u[face] = desingularize(depth, faces[1][face], epsilon);
            v[face] = desingularize(depth, faces[2][face], epsilon);
            c[face] = desingularize(depth, faces[3][face], epsilon);
        }
        [h, u, v, c]
    });
}

/// Central-upwind flux across one face
///
/// `un` is the face-normal velocity and `ut` the tangential one. Returns
/// (mass, normal momentum, tangential momentum, tracer).
#[inline]
fn central_upwind(
    g: f32,
    half_g: f32,
    epsilon: f32,
    (hl, unl, utl, cl): (f32, f32, f32, f32),
    (hr, unr, utr, cr): (f32, f32, f32, f32),
) -> Texel {
    let cel_l = (g * hl).sqrt();
    let cel_r = (g * hr).sqrt();
    let ap = (unl + cel_l).max(unr + cel_r).max(0.0);
    let am = (unl - cel_l).min(unr - cel_r).min(0.0);
    let spread = ap - am;
    if spread < epsilon {
        return [0.0; 4];
    }
    let upwind = |fl: f32, fr: f32, ql: f32, qr: f32| (ap * fl - am * fr + ap * am * (qr - ql)) / spread;
    [
        upwind(hl * unl, hr * unr, hl, hr),
        upwind(
            hl * unl * unl + half_g * hl * hl,
            hr * unr * unr + half_g * hr * hr,
            hl * unl,
            hr * unr,
        ),
        upwind(hl * unl * utl, hr * unr * utr, hl * utl, hr * utr),
        upwind(hl * unl * cl, hr * unr * cr, hl * cl, hr * cr),
    ]
}

/// Pass2: fluxes through the east (x_flux) and north (y_flux) face of each cell
pub(crate) fn flux(params: &FluxParams, inputs: &[&FieldData], outputs: &mut [FieldData]) {
    let [h, u, v, c, _bottom, breaking] = inputs else {
        unreachable!("validated binding count")
    };
    let use_breaking = params.use_breaking != 0 && !is_placeholder(breaking);
    let (g, half_g, epsilon) = (params.g, params.half_g, params.epsilon);

    for_each_cell_multi::<2, _>(outputs, |x, y| {
        let (hh, uu, vv, cc) = (h.get(x, y), u.get(x, y), v.get(x, y), c.get(x, y));
        let (he, ue, ve, ce) = (
            at(h, x, y, 1, 0),
            at(u, x, y, 1, 0),
            at(v, x, y, 1, 0),
            at(c, x, y, 1, 0),
        );
        let (hn, un, vn, cn) = (
            at(h, x, y, 0, 1),
            at(u, x, y, 0, 1),
            at(v, x, y, 0, 1),
            at(c, x, y, 0, 1),
        );

        // East face: left is this cell's E value, right is the neighbour's W value
        let mut fx = central_upwind(
            g,
            half_g,
            epsilon,
            (hh[1], uu[1], vv[1], cc[1]),
            (he[3], ue[3], ve[3], ce[3]),
        );
        // North face: normal velocity is v
        let fy_normal = central_upwind(
            g,
            half_g,
            epsilon,
            (hh[0], vv[0], uu[0], cc[0]),
            (hn[2], vn[2], un[2], cn[2]),
        );
        let mut fy = [fy_normal[0], fy_normal[2], fy_normal[1], fy_normal[3]];

        if use_breaking {
            let nu = breaking.get(x, y)[0];
            let nu_x = 0.5 * (nu + at(breaking, x, y, 1, 0)[0]);
            let nu_y = 0.5 * (nu + at(breaking, x, y, 0, 1)[0]);
            fx[1] -= nu_x * (he[3] * ue[3] - hh[1] * uu[1]) / params.dx;
            fx[2] -= nu_x * (he[3] * ve[3] - hh[1] * vv[1]) / params.dx;
            fy[1] -= nu_y * (hn[2] * un[2] - hh[0] * uu[0]) / params.dy;
            fy[2] -= nu_y * (hn[2] * vn[2] - hh[0] * vv[0]) / params.dy;
        }
        [fx, fy]
    });
}

/// Still-water depth below the datum
#[inline]
fn still_depth(bottom: Texel) -> f32 {
    (-bottom[2]).max(0.0)
}

/// Pass3: right-hand side, multistep integration and dispersive forcing
///
/// Writes the provisional state (dispersive modes still have to solve for the
/// physical discharges), the fresh derivative and the explicit forcing term.
pub(crate) fn update(
    params: &UpdateParams,
    dispersion: Dispersion,
    inputs: &[&FieldData],
    outputs: &mut [FieldData],
) {
    let [state, star, bottom, near_dry, h_edges, x_flux, y_flux, grad_predicted, grad_old, grad_old_old, forcing_old, _forcing_old_old, layers] =
        inputs
    else {
        unreachable!("validated binding count")
    };
    let width = params.width as usize;
    let height = params.height as usize;
    let dt = params.dt;
    let dry_depth = params.epsilon.sqrt();
    let dispersive = dispersion != Dispersion::None;
    let fully_nonlinear = dispersion == Dispersion::FullyNonlinear && !is_placeholder(layers);
    let forcing_scale = params.bcoef + 1.0 / 3.0;

    for_each_cell_multi::<3, _>(outputs, |x, y| {
        let s = state.get(x, y);
        let base = star.get(x, y);
        let b = bottom.get(x, y);
        let nd = near_dry.get(x, y);
        let he = h_edges.get(x, y);
        let h = nd[0];

        let fe = x_flux.get(x, y);
        let fw = at(x_flux, x, y, -1, 0);
        let gn = y_flux.get(x, y);
        let gs = at(y_flux, x, y, 0, -1);

        let mut rate = [0.0_f32; 4];
        for ch in 0..4 {
            rate[ch] = -(fe[ch] - fw[ch]) * params.one_over_dx - (gn[ch] - gs[ch]) * params.one_over_dy;
        }

        // Well-balanced bed slope source
        let bw = at(bottom, x, y, -1, 0)[1];
        let bs = at(bottom, x, y, 0, -1)[0];
        rate[1] -= params.g_over_dx * 0.5 * (he[1] + he[3]) * (b[1] - bw);
        rate[2] -= params.g_over_dy * 0.5 * (he[0] + he[2]) * (b[0] - bs);

        if h > dry_depth {
            let u = desingularize(h, s[1], params.epsilon);
            let v = desingularize(h, s[2], params.epsilon);
            let speed = (u * u + v * v).sqrt();
            let cf = if params.is_manning != 0 {
                params.g * params.friction * params.friction / h.cbrt()
            } else {
                params.friction
            };
            rate[1] -= cf * speed * u;
            rate[2] -= cf * speed * v;
        }

        let interior = x >= 2 && y >= 2 && x + 2 < width && y + 2 < height;
        let mut forcing = [0.0_f32; 4];
        if dispersive && interior && nd[1] == 0.0 {
            let d = still_depth(b);
            let d2 = d * d;
            let eta = |dx: isize, dy: isize| at(state, x, y, dx, dy)[0];
            let eta_xxx = 0.5 * (eta(2, 0) - 2.0 * eta(1, 0) + 2.0 * eta(-1, 0) - eta(-2, 0)) * params.one_over_d3x;
            let eta_yyy = 0.5 * (eta(0, 2) - 2.0 * eta(0, 1) + 2.0 * eta(0, -1) - eta(0, -2)) * params.one_over_d3y;
            let eta_xyy = 0.5
                * ((eta(1, 1) - 2.0 * eta(1, 0) + eta(1, -1)) - (eta(-1, 1) - 2.0 * eta(-1, 0) + eta(-1, -1)))
                * params.one_over_dx
                * params.one_over_d2y;
            let eta_xxy = 0.5
                * ((eta(1, 1) - 2.0 * eta(0, 1) + eta(-1, 1)) - (eta(1, -1) - 2.0 * eta(0, -1) + eta(-1, -1)))
                * params.one_over_dy
                * params.one_over_d2x;
            rate[1] += params.bcoef_g * d2 * d * (eta_xxx + eta_xyy);
            rate[2] += params.bcoef_g * d2 * d * (eta_yyy + eta_xxy);

            let cross = |ch: usize| {
                0.25 * params.one_over_dxdy
                    * (at(state, x, y, 1, 1)[ch] - at(state, x, y, 1, -1)[ch] - at(state, x, y, -1, 1)[ch]
                        + at(state, x, y, -1, -1)[ch])
            };
            forcing[0] = forcing_scale * d2 * cross(2);
            forcing[1] = forcing_scale * d2 * cross(1);

            if fully_nonlinear {
                let second = layers.get_3d(x, y, 1);
                let mixed = layers.get_3d(x, y, 2);
                let depths = layers.get_3d(x, y, 5);
                let scale = -depths[1] * (depths[1] * depths[1] - depths[2] * depths[2]) / 3.0;
                forcing[0] += scale * (second[0] + mixed[1]);
                forcing[1] += scale * (second[3] + mixed[0]);
            }
        }

        let predicted = grad_predicted.get(x, y);
        let old = grad_old.get(x, y);
        let old_old = grad_old_old.get(x, y);
        let mut next = [0.0_f32; 4];
        for ch in 0..4 {
            next[ch] = integrate(
                params.time_scheme,
                params.pred_or_corrector,
                dt,
                base[ch],
                rate[ch],
                predicted[ch],
                old[ch],
                old_old[ch],
            );
        }
        if dispersive {
            let previous = forcing_old.get(x, y);
            next[1] += forcing[0] - previous[0];
            next[2] += forcing[1] - previous[1];
        }
        if next[0] - b[2] <= 0.0 {
            next = [b[2], 0.0, 0.0, 0.0];
        }
        [next, rate, forcing]
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::orchestrator::Phase;
    use crate::params::ParamBuilder;
    use approx::assert_relative_eq;

    fn flat(width: usize, height: usize, eta: f32, depth: f32) -> (FieldData, FieldData) {
        let state = FieldData::with_value(width, height, [eta, 0.0, 0.0, 0.0]);
        let bottom = FieldData::with_value(width, height, [-depth, -depth, -depth, 99.0]);
        (state, bottom)
    }

    fn builder(width: u32, height: u32) -> ParamBuilder {
        ParamBuilder::new(&SimulationConfig {
            width,
            height,
            ..SimulationConfig::default()
        })
    }

    #[test]
    fn test_near_dry_flags_neighbours_of_dry_cells() {
        let (mut state, bottom) = flat(8, 8, 0.0, 1.0);
        // Cell (4, 4) dries out
        state.set(4, 4, [-1.0, 0.0, 0.0, 0.0]);
        let mut out = vec![FieldData::new(8, 8)];
        near_dry(&builder(8, 8).depth(), &[&state, &bottom], &mut out);

        assert_eq!(out[0].get(4, 4)[0], 0.0);
        assert_eq!(out[0].get(3, 5)[1], 1.0);
        assert_eq!(out[0].get(1, 1)[1], 0.0);
        assert_relative_eq!(out[0].get(1, 1)[0], 1.0);
    }

    #[test]
    fn test_lake_at_rest_has_zero_rate() {
        // Sloping bottom, flat free surface
        let (width, height) = (12, 12);
        let mut bottom = FieldData::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let b = -2.0 + 0.05 * x as f32;
                bottom.set(x, y, [b, b + 0.025, b, 99.0]);
            }
        }
        let state = FieldData::with_value(width, height, [0.0; 4]);
        let builder = builder(width as u32, height as u32);

        let mut nd = vec![FieldData::new(width, height)];
        near_dry(&builder.depth(), &[&state, &bottom], &mut nd);
        let mut edges = vec![FieldData::new(width, height); 4];
        reconstruct(&builder.reconstruct(), &[&state, &bottom, &nd[0]], &mut edges);
        let placeholder = FieldData::new(1, 1);
        let mut fluxes = vec![FieldData::new(width, height); 2];
        flux(
            &builder.flux(),
            &[&edges[0], &edges[1], &edges[2], &edges[3], &bottom, &placeholder],
            &mut fluxes,
        );
        let zero = FieldData::new(width, height);
        let mut out = vec![FieldData::new(width, height); 3];
        update(
            &builder.update(Phase::Predictor),
            Dispersion::None,
            &[
                &state, &state, &bottom, &nd[0], &edges[0], &fluxes[0], &fluxes[1], &zero, &zero,
                &zero, &zero, &zero, &placeholder,
            ],
            &mut out,
        );

        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let rate = out[1].get(x, y);
                assert!(rate[0].abs() < 1e-5, "mass rate at ({x}, {y}) = {}", rate[0]);
                assert!(rate[1].abs() < 1e-4, "x momentum rate at ({x}, {y}) = {}", rate[1]);
            }
        }
    }

    #[test]
    fn test_flux_is_antisymmetric_under_reflection() {
        let g = 9.81;
        let left = (1.2, 0.3, 0.1, 0.0);
        let right = (0.9, -0.2, 0.0, 0.0);
        let forward = central_upwind(g, 0.5 * g, 1e-6, left, right);
        let mirrored = central_upwind(
            g,
            0.5 * g,
            1e-6,
            (right.0, -right.1, right.2, right.3),
            (left.0, -left.1, left.2, left.3),
        );
        assert_relative_eq!(forward[0], -mirrored[0], epsilon = 1e-6);
        assert_relative_eq!(forward[1], mirrored[1], epsilon = 1e-5);
    }
}
