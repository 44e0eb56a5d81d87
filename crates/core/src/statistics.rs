//! Running statistics of the free surface
//!
//! Means of (eta, P, Q, eta^2) and the wave-height field are accumulated online
//! on the device, one sample per full step. Each field is double-buffered and
//! has its own sample counter so either can be reset independently by copying
//! the zero field over it.

use crate::backend::{ComputeBackend, PreparedPass};
use crate::error::CelerisResult;
use crate::field::{DoubleBuffered, FieldDesc, FieldHandle};
use crate::kernel::KernelId;
use crate::params::{ParamBuilder, UniformBlock};
use tracing::debug;

/// Device-side running means and wave heights
#[derive(Debug)]
pub struct Statistics {
    means: DoubleBuffered,
    wave_stats: DoubleBuffered,
    zero: FieldHandle,
    means_pass: PreparedPass,
    wave_height_pass: PreparedPass,
    mean_samples: u32,
    height_samples: u32,
}

impl Statistics {
    /// Allocate the statistics fields and prepare their passes over `state`
    ///
    /// `zero` must be a grid field that is never written.
    ///
    /// # Errors
    /// Propagates allocation and binding errors from the backend
    pub fn allocate(
        backend: &mut dyn ComputeBackend,
        domain: (u32, u32),
        state: FieldHandle,
        zero: FieldHandle,
    ) -> CelerisResult<Self> {
        let (width, height) = domain;
        let means = DoubleBuffered::allocate(backend, &FieldDesc::grid("means", width, height))?;
        let wave_stats = DoubleBuffered::allocate(backend, &FieldDesc::grid("wave_stats", width, height))?;
        let means_pass = backend.prepare_pass(
            KernelId::CalcMeans,
            &[means.current(), state, means.scratch()],
            domain,
        )?;
        let wave_height_pass = backend.prepare_pass(
            KernelId::CalcWaveHeight,
            &[wave_stats.current(), state, means.current(), wave_stats.scratch()],
            domain,
        )?;
        Ok(Self {
            means,
            wave_stats,
            zero,
            means_pass,
            wave_height_pass,
            mean_samples: 0,
            height_samples: 0,
        })
    }

    /// Fold the current state into both fields
    ///
    /// Means are updated first so the wave height sees the new variance.
    ///
    /// # Errors
    /// Propagates backend errors
    pub fn accumulate(&mut self, backend: &mut dyn ComputeBackend, params: &ParamBuilder) -> CelerisResult<()> {
        backend.run_pass(
            &self.means_pass,
            &UniformBlock::pack(&params.statistics(self.mean_samples)),
        )?;
        self.means.rotate(backend)?;
        backend.run_pass(
            &self.wave_height_pass,
            &UniformBlock::pack(&params.statistics(self.height_samples)),
        )?;
        self.wave_stats.rotate(backend)?;
        self.mean_samples = self.mean_samples.saturating_add(1);
        self.height_samples = self.height_samples.saturating_add(1);
        Ok(())
    }

    /// Restart the running means
    ///
    /// # Errors
    /// Propagates copy errors
    pub fn reset_means(&mut self, backend: &mut dyn ComputeBackend) -> CelerisResult<()> {
        backend.copy_field(self.zero, self.means.current())?;
        self.mean_samples = 0;
        debug!("Running means reset");
        Ok(())
    }

    /// Restart the wave-height extremes
    ///
    /// # Errors
    /// Propagates copy errors
    pub fn reset_wave_height(&mut self, backend: &mut dyn ComputeBackend) -> CelerisResult<()> {
        backend.copy_field(self.zero, self.wave_stats.current())?;
        self.height_samples = 0;
        debug!("Wave height statistics reset");
        Ok(())
    }

    #[must_use]
    pub fn means(&self) -> FieldHandle {
        self.means.current()
    }

    #[must_use]
    pub fn wave_stats(&self) -> FieldHandle {
        self.wave_stats.current()
    }

    /// Samples folded into the means
    #[must_use]
    pub fn mean_samples(&self) -> u32 {
        self.mean_samples
    }

    /// Samples folded into the wave heights
    #[must_use]
    pub fn height_samples(&self) -> u32 {
        self.height_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use crate::config::SimulationConfig;
    use crate::field::FieldData;
    use approx::assert_relative_eq;

    fn setup(backend: &mut CpuBackend) -> (Statistics, FieldHandle, ParamBuilder) {
        let config = SimulationConfig {
            width: 8,
            height: 8,
            ..SimulationConfig::default()
        };
        let state = backend.create_field(FieldDesc::grid("state", 8, 8)).unwrap();
        let zero = backend.create_field(FieldDesc::grid("zero", 8, 8)).unwrap();
        let stats = Statistics::allocate(backend, (8, 8), state, zero).unwrap();
        (stats, state, ParamBuilder::new(&config))
    }

    #[test]
    fn test_wave_height_of_two_level_signal() {
        let mut backend = CpuBackend::new();
        let (mut stats, state, params) = setup(&mut backend);
        for eta in [0.5_f32, -0.5] {
            backend
                .upload_field(state, &FieldData::with_value(8, 8, [eta, 0.0, 0.0, 0.0]))
                .unwrap();
            stats.accumulate(&mut backend, &params).unwrap();
        }
        let heights = backend.read_field(stats.wave_stats()).unwrap().get(3, 3);
        assert_relative_eq!(heights[0], 0.5);
        assert_relative_eq!(heights[1], -0.5);
        // Variance 0.25, Hs = 4 * 0.5
        assert_relative_eq!(heights[2], 2.0, epsilon = 1e-5);
        assert_relative_eq!(heights[3], 1.0);
    }

    #[test]
    fn test_reset_restarts_counters() {
        let mut backend = CpuBackend::new();
        let (mut stats, state, params) = setup(&mut backend);
        backend
            .upload_field(state, &FieldData::with_value(8, 8, [2.0, 0.0, 0.0, 0.0]))
            .unwrap();
        stats.accumulate(&mut backend, &params).unwrap();
        stats.reset_means(&mut backend).unwrap();
        assert_eq!(stats.mean_samples(), 0);
        assert_eq!(stats.height_samples(), 1);
        assert!(backend
            .read_field(stats.means())
            .unwrap()
            .data
            .iter()
            .all(|t| *t == [0.0; 4]));
    }
}
