//! Running statistics, gauge sampling and bottom disturbances

use super::{at, for_each_cell, for_each_cell_multi};
use crate::field::FieldData;
use crate::params::{DisturbanceParams, StatisticsParams};

/// Running means of (eta, P, Q, eta^2)
pub(crate) fn means(params: &StatisticsParams, inputs: &[&FieldData], outputs: &mut [FieldData]) {
    let [means, state] = inputs else {
        unreachable!("validated binding count")
    };
    let weight = 1.0 / (params.samples as f32 + 1.0);
    for_each_cell(&mut outputs[0], |x, y| {
        let mean = means.get(x, y);
        let s = state.get(x, y);
        let sample = [s[0], s[1], s[2], s[0] * s[0]];
        let mut out = [0.0; 4];
        for ch in 0..4 {
            out[ch] = mean[ch] + (sample[ch] - mean[ch]) * weight;
        }
        out
    });
}

/// Extremes and significant wave height
///
/// Output channels: (eta max, eta min, Hs, eta max - eta min). `means` must
/// already include the current sample.
pub(crate) fn wave_height(params: &StatisticsParams, inputs: &[&FieldData], outputs: &mut [FieldData]) {
    let [stats, state, means] = inputs else {
        unreachable!("validated binding count")
    };
    let first = params.samples == 0;
    for_each_cell(&mut outputs[0], |x, y| {
        let eta = state.get(x, y)[0];
        let previous = stats.get(x, y);
        let (max, min) = if first {
            (eta, eta)
        } else {
            (previous[0].max(eta), previous[1].min(eta))
        };
        let m = means.get(x, y);
        let variance = (m[3] - m[0] * m[0]).max(0.0);
        [max, min, 4.0 * variance.sqrt(), max - min]
    });
}

/// Raise the bottom by one Gaussian increment and lift wet water columns with it
pub(crate) fn disturbance(params: &DisturbanceParams, inputs: &[&FieldData], outputs: &mut [FieldData]) {
    let [bottom, state] = inputs else {
        unreachable!("validated binding count")
    };
    let two_r2 = 2.0 * params.radius * params.radius;
    let lift = |x: usize, y: usize, dx: isize, dy: isize| {
        if two_r2 <= 0.0 {
            return 0.0;
        }
        let px = (x as isize + dx) as f32 * params.dx - params.center_x;
        let py = (y as isize + dy) as f32 * params.dy - params.center_y;
        params.delta * (-(px * px + py * py) / two_r2).exp()
    };
    let raised = |x: usize, y: usize, dx: isize, dy: isize| at(bottom, x, y, dx, dy)[2] + lift(x, y, dx, dy);

    for_each_cell_multi::<2, _>(outputs, |x, y| {
        let b = bottom.get(x, y);
        let new_b = raised(x, y, 0, 0);
        let north = if y + 1 < params.height as usize { raised(x, y, 0, 1) } else { new_b };
        let east = if x + 1 < params.width as usize { raised(x, y, 1, 0) } else { new_b };

        let mut s = state.get(x, y);
        if s[0] - b[2] > 0.0 {
            s[0] += lift(x, y, 0, 0);
        } else {
            s[0] = s[0].max(new_b);
        }
        [[0.5 * (new_b + north), 0.5 * (new_b + east), new_b, b[3]], s]
    });
}

/// Sample (bottom, eta, P, Q) at each gauge location
pub(crate) fn sample_gauges(inputs: &[&FieldData], outputs: &mut [FieldData]) {
    let [state, bottom, locations] = inputs else {
        unreachable!("validated binding count")
    };
    let out = &mut outputs[0];
    for (value, location) in out.data.iter_mut().zip(&locations.data) {
        let x = (location[0].max(0.0) as usize).min(state.width - 1);
        let y = (location[1].max(0.0) as usize).min(state.height - 1);
        let s = state.get(x, y);
        *value = [bottom.get(x, y)[2], s[0], s[1], s[2]];
    }
}
