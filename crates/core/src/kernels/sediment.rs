//! Suspended sediment transport and bed evolution

use super::{at, desingularize, for_each_cell, for_each_cell_multi, integrate, is_placeholder};
use crate::field::FieldData;
use crate::params::SedimentParams;

/// First-order face concentrations (N, E, S, W)
pub(crate) fn reconstruct(params: &SedimentParams, inputs: &[&FieldData], outputs: &mut [FieldData]) {
    let [sediment, _bottom, near_dry] = inputs else {
        unreachable!("validated binding count")
    };
    for_each_cell(&mut outputs[0], |x, y| {
        let h = near_dry.get(x, y)[0];
        let c = desingularize(h, sediment.get(x, y)[0], params.epsilon).max(0.0);
        [c; 4]
    });
}

/// Upwind sediment fluxes through the east and north faces
pub(crate) fn flux(_params: &SedimentParams, inputs: &[&FieldData], outputs: &mut [FieldData]) {
    let [h, u, v, c] = inputs else {
        unreachable!("validated binding count")
    };
    for_each_cell_multi::<2, _>(outputs, |x, y| {
        let (hh, uu, vv, cc) = (h.get(x, y), u.get(x, y), v.get(x, y), c.get(x, y));
        let (he, ue, ce) = (at(h, x, y, 1, 0), at(u, x, y, 1, 0), at(c, x, y, 1, 0));
        let (hn, vn, cn) = (at(h, x, y, 0, 1), at(v, x, y, 0, 1), at(c, x, y, 0, 1));

        let u_face = 0.5 * (uu[1] + ue[3]);
        let fx = if u_face >= 0.0 {
            u_face * hh[1] * cc[1]
        } else {
            u_face * he[3] * ce[3]
        };
        let v_face = 0.5 * (vv[0] + vn[2]);
        let fy = if v_face >= 0.0 {
            v_face * hh[0] * cc[0]
        } else {
            v_face * hn[2] * cn[2]
        };
        [[fx, 0.0, 0.0, 0.0], [fy, 0.0, 0.0, 0.0]]
    });
}

/// Transport update with erosion and deposition
///
/// Outputs: next concentration state, its derivative, and the exchange
/// (erosion, deposition, bed change rate, 0).
pub(crate) fn update(params: &SedimentParams, inputs: &[&FieldData], outputs: &mut [FieldData]) {
    let [base, sediment, x_flux, y_flux, grad_predicted, grad_old, grad_old_old, near_dry, u_edges, v_edges, breaking] =
        inputs
    else {
        unreachable!("validated binding count")
    };
    let dry_depth = params.epsilon.sqrt();
    let use_breaking = !is_placeholder(breaking);
    let submerged = (params.specific_gravity - 1.0) * params.g * params.d50;

    for_each_cell_multi::<3, _>(outputs, |x, y| {
        let h = near_dry.get(x, y)[0];
        if h <= dry_depth {
            return [base.get(x, y), [0.0; 4], [0.0; 4]];
        }
        let ue = u_edges.get(x, y);
        let ve = v_edges.get(x, y);
        let u = 0.5 * (ue[1] + ue[3]);
        let v = 0.5 * (ve[0] + ve[2]);
        let speed2 = u * u + v * v;
        let cf = if params.is_manning != 0 {
            params.g * params.friction * params.friction / h.cbrt()
        } else {
            params.friction
        };
        let shields = if submerged > 0.0 { cf * speed2 / submerged } else { 0.0 };

        let mut erosion = if params.critical_shields > 0.0 {
            params.erosion_coefficient * (shields / params.critical_shields - 1.0).max(0.0)
        } else {
            0.0
        };
        if use_breaking {
            erosion *= 1.0 + breaking.get(x, y)[2];
        }
        let concentration = desingularize(h, sediment.get(x, y)[0], params.epsilon).max(0.0);
        let deposition = params.settling_velocity * concentration;

        let rate = -(x_flux.get(x, y)[0] - at(x_flux, x, y, -1, 0)[0]) / params.dx
            - (y_flux.get(x, y)[0] - at(y_flux, x, y, 0, -1)[0]) / params.dy
            + erosion
            - deposition;
        let next = integrate(
            params.time_scheme,
            params.pred_or_corrector,
            params.dt,
            base.get(x, y)[0],
            rate,
            grad_predicted.get(x, y)[0],
            grad_old.get(x, y)[0],
            grad_old_old.get(x, y)[0],
        )
        .max(0.0);
        let bed_rate = (deposition - erosion) / (1.0 - params.porosity);
        [
            [next, 0.0, 0.0, 0.0],
            [rate, 0.0, 0.0, 0.0],
            [erosion, deposition, bed_rate, 0.0],
        ]
    });
}

/// Apply the bed change rate to the bottom and refresh its face elevations
pub(crate) fn bed_update(params: &SedimentParams, inputs: &[&FieldData], outputs: &mut [FieldData]) {
    let [bottom, exchange] = inputs else {
        unreachable!("validated binding count")
    };
    let dt = params.dt;
    let bed = |x: usize, y: usize, dx: isize, dy: isize| {
        at(bottom, x, y, dx, dy)[2] + at(exchange, x, y, dx, dy)[2] * dt
    };
    for_each_cell(&mut outputs[0], |x, y| {
        let b = bed(x, y, 0, 0);
        [
            0.5 * (b + bed(x, y, 0, 1)),
            0.5 * (b + bed(x, y, 1, 0)),
            b,
            bottom.get(x, y)[3],
        ]
    });
}
