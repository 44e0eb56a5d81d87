//! Time-series gauges
//!
//! Gauge locations live in an N×1 line field. One `SampleGauges` dispatch copies
//! (B, eta, P, Q) at every location into a second line field, which is read back
//! and appended to the per-gauge series with the simulation time.

use crate::backend::{ComputeBackend, PreparedPass};
use crate::config::GaugeLocation;
use crate::error::CelerisResult;
use crate::field::{FieldData, FieldDesc, FieldHandle, Texel};
use crate::kernel::KernelId;
use crate::params::{ParamBuilder, UniformBlock};
use serde::Serialize;

/// One sample of a gauge
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GaugeSample {
    /// Simulation time in seconds
    pub time: f64,
    /// Bed elevation
    pub bottom: f32,
    /// Free-surface elevation
    pub eta: f32,
    /// x discharge
    pub p: f32,
    /// y discharge
    pub q: f32,
}

impl GaugeSample {
    fn new(time: f64, value: Texel) -> Self {
        Self {
            time,
            bottom: value[0],
            eta: value[1],
            p: value[2],
            q: value[3],
        }
    }

    /// Water depth above the bed
    #[must_use]
    pub fn depth(&self) -> f32 {
        (self.eta - self.bottom).max(0.0)
    }
}

/// Recorded samples of one gauge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeSeries {
    pub name: String,
    pub x: u32,
    pub y: u32,
    pub samples: Vec<GaugeSample>,
}

impl GaugeSeries {
    /// Largest surface elevation recorded so far
    #[must_use]
    pub fn max_eta(&self) -> Option<f32> {
        self.samples.iter().map(|s| s.eta).reduce(f32::max)
    }
}

/// Device fields and host series of every gauge
#[derive(Debug)]
pub struct GaugeRecorder {
    values: FieldHandle,
    pass: PreparedPass,
    series: Vec<GaugeSeries>,
}

impl GaugeRecorder {
    /// Allocate the gauge line fields, upload the locations and prepare the pass
    ///
    /// # Errors
    /// Propagates allocation and binding errors from the backend
    pub fn allocate(
        backend: &mut dyn ComputeBackend,
        domain: (u32, u32),
        gauges: &[GaugeLocation],
        state: FieldHandle,
        bottom: FieldHandle,
    ) -> CelerisResult<Self> {
        let count = gauges.len() as u32;
        let locations = backend.create_field(FieldDesc::line("gauge_locations", count))?;
        let values = backend.create_field(FieldDesc::line("gauge_values", count))?;

        let mut data = FieldData::new(count.max(1) as usize, 1);
        for (i, gauge) in gauges.iter().enumerate() {
            data.set(i, 0, [gauge.x as f32, gauge.y as f32, 0.0, 0.0]);
        }
        backend.upload_field(locations, &data)?;

        let pass = backend.prepare_pass(
            KernelId::SampleGauges,
            &[state, bottom, locations, values],
            domain,
        )?;
        let series = gauges
            .iter()
            .enumerate()
            .map(|(i, g)| GaugeSeries {
                name: if g.name.is_empty() {
                    format!("gauge_{i}")
                } else {
                    g.name.clone()
                },
                x: g.x,
                y: g.y,
                samples: Vec::new(),
            })
            .collect();
        Ok(Self {
            values,
            pass,
            series,
        })
    }

    /// Sample every gauge at simulation time `time`
    ///
    /// Blocks on the readback; a failed readback leaves the series unchanged.
    ///
    /// # Errors
    /// Returns [`crate::CelerisError::Readback`] if the values cannot be read
    pub fn sample(
        &mut self,
        backend: &mut dyn ComputeBackend,
        params: &ParamBuilder,
        time: f64,
    ) -> CelerisResult<()> {
        backend.run_pass(&self.pass, &UniformBlock::pack(&params.gauges()))?;
        let values = backend.read_field(self.values)?;
        for (series, value) in self.series.iter_mut().zip(&values.data) {
            series.samples.push(GaugeSample::new(time, *value));
        }
        Ok(())
    }

    #[must_use]
    pub fn series(&self) -> &[GaugeSeries] {
        &self.series
    }

    /// Drop all recorded samples
    pub fn clear(&mut self) {
        for series in &mut self.series {
            series.samples.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use crate::config::SimulationConfig;

    #[test]
    fn test_samples_follow_state() {
        let mut backend = CpuBackend::new();
        let config = SimulationConfig {
            width: 8,
            height: 8,
            ..SimulationConfig::default()
        };
        let state = backend.create_field(FieldDesc::grid("state", 8, 8)).unwrap();
        let bottom = backend.create_field(FieldDesc::grid("bottom", 8, 8)).unwrap();
        let mut field = FieldData::new(8, 8);
        field.set(2, 5, [0.3, 1.0, -1.0, 0.0]);
        backend.upload_field(state, &field).unwrap();
        backend
            .upload_field(bottom, &FieldData::with_value(8, 8, [-1.0, -1.0, -1.0, 99.0]))
            .unwrap();

        let gauges = [
            GaugeLocation {
                name: "harbour".into(),
                x: 2,
                y: 5,
            },
            GaugeLocation {
                name: String::new(),
                x: 0,
                y: 0,
            },
        ];
        let mut recorder = GaugeRecorder::allocate(&mut backend, (8, 8), &gauges, state, bottom).unwrap();
        recorder.sample(&mut backend, &ParamBuilder::new(&config), 1.5).unwrap();

        let series = recorder.series();
        assert_eq!(series[1].name, "gauge_1");
        let sample = series[0].samples[0];
        assert_eq!(sample.time, 1.5);
        assert_eq!((sample.bottom, sample.eta, sample.p, sample.q), (-1.0, 0.3, 1.0, -1.0));
        assert!((sample.depth() - 1.3).abs() < 1e-6);
        assert_eq!(series[1].samples[0].eta, 0.0);

        recorder.clear();
        assert!(recorder.series()[0].samples.is_empty());
    }
}
