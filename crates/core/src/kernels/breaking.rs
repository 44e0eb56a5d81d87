use super::for_each_cell;
use crate::field::FieldData;
use crate::params::BreakingParams;

/// Kennedy-style breaking eddy viscosity
///
/// Breaking starts where the free-surface rise rate exceeds the onset threshold
/// times the shallow-water celerity. While a cell keeps breaking the threshold
/// relaxes towards the final value over `transition_factor * sqrt(h / g)`.
/// Output channels: (viscosity, breaking age, foam, 0).
pub(crate) fn eddy_viscosity(params: &BreakingParams, inputs: &[&FieldData], outputs: &mut [FieldData]) {
    let [_state, _bottom, near_dry, grad_old, breaking] = inputs else {
        unreachable!("validated binding count")
    };
    let dry_depth = params.epsilon.sqrt();
    let foam_decay = (-params.white_water_decay_rate * params.dt).exp();

    for_each_cell(&mut outputs[0], |x, y| {
        let h = near_dry.get(x, y)[0];
        let previous = breaking.get(x, y);
        if h <= dry_depth || near_dry.get(x, y)[1] > 0.0 {
            return [0.0, 0.0, previous[2] * foam_decay, 0.0];
        }

        let eta_t = grad_old.get(x, y)[0];
        let celerity = (params.g * h).sqrt();
        let age = previous[1];
        let transition = params.transition_factor * (h / params.g).sqrt();
        let fraction = if age <= 0.0 || transition <= 0.0 {
            0.0
        } else {
            (age / transition).min(1.0)
        };
        let threshold = celerity
            * (params.onset_threshold + (params.final_threshold - params.onset_threshold) * fraction);

        if threshold > 0.0 && eta_t > threshold {
            let intensity = (eta_t / threshold - 1.0).clamp(0.0, 1.0);
            let nu = params.mixing_length * params.mixing_length * h * intensity * eta_t;
            [nu, age + params.dt, 1.0, 0.0]
        } else {
            [0.0, 0.0, previous[2] * foam_decay, 0.0]
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::params::ParamBuilder;

    fn run(eta_t: f32, previous: [f32; 4]) -> [f32; 4] {
        let params = ParamBuilder::new(&SimulationConfig {
            width: 8,
            height: 8,
            ..SimulationConfig::default()
        })
        .breaking();
        let state = FieldData::new(8, 8);
        let bottom = FieldData::with_value(8, 8, [-1.0, -1.0, -1.0, 99.0]);
        let near_dry = FieldData::with_value(8, 8, [1.0, 0.0, 1.0, 0.0]);
        let grad = FieldData::with_value(8, 8, [eta_t, 0.0, 0.0, 0.0]);
        let breaking = FieldData::with_value(8, 8, previous);
        let mut out = vec![FieldData::new(8, 8)];
        eddy_viscosity(&params, &[&state, &bottom, &near_dry, &grad, &breaking], &mut out);
        out[0].get(4, 4)
    }

    #[test]
    fn test_calm_water_does_not_break() {
        let out = run(0.01, [0.0; 4]);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 0.0);
    }

    #[test]
    fn test_steep_front_breaks_and_ages() {
        // Celerity at h = 1 is ~3.13 m/s; onset at 0.65 of that
        let out = run(3.0, [0.0; 4]);
        assert!(out[0] > 0.0);
        assert!(out[1] > 0.0);
        assert_eq!(out[2], 1.0);
    }

    #[test]
    fn test_foam_decays_after_breaking_stops() {
        let out = run(0.0, [0.0, 0.0, 1.0, 0.0]);
        assert!(out[2] < 1.0 && out[2] > 0.9);
    }
}
