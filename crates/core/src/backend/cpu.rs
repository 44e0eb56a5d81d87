//! CPU reference backend
//!
//! Fields live in host memory and every pass runs the matching kernel from
//! [`crate::kernels`] immediately, parallelised over rows with rayon. Submission
//! is a no-op apart from bookkeeping, so results are visible as soon as a pass
//! returns. Optionally records a [`TraceEvent`] log of all work.

use super::{check_copy, dispatch_size, BackendStats, ComputeBackend, PreparedPass, TraceEvent};
use crate::error::{CelerisError, CelerisResult};
use crate::field::{FieldData, FieldDesc, FieldHandle, FieldRegistry};
use crate::kernel::KernelId;
use crate::kernels;
use crate::params::UniformBlock;
use tracing::trace;

struct CpuPass {
    kernel: KernelId,
    bindings: Vec<FieldHandle>,
}

/// Host-memory backend running the reference kernels
pub struct CpuBackend {
    fields: FieldRegistry<FieldData>,
    passes: Vec<CpuPass>,
    trace: Option<Vec<TraceEvent>>,
    stats: BackendStats,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            fields: FieldRegistry::new(),
            passes: Vec::new(),
            trace: None,
            stats: BackendStats::default(),
        }
    }

    /// A backend that records every dispatch, copy and submit
    #[must_use]
    pub fn with_trace() -> Self {
        Self {
            trace: Some(Vec::new()),
            ..Self::new()
        }
    }

    /// Recorded events, empty unless created with [`CpuBackend::with_trace`]
    #[must_use]
    pub fn trace(&self) -> &[TraceEvent] {
        self.trace.as_deref().unwrap_or(&[])
    }

    fn record(&mut self, event: TraceEvent) {
        if let Some(trace) = self.trace.as_mut() {
            trace.push(event);
        }
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> String {
        format!("CPU ({} threads)", rayon::current_num_threads())
    }

    fn is_gpu_accelerated(&self) -> bool {
        false
    }

    fn create_field(&mut self, desc: FieldDesc) -> CelerisResult<FieldHandle> {
        let data = FieldData::new_3d(desc.width as usize, desc.height as usize, desc.depth as usize);
        trace!("Allocating field '{}' {:?}", desc.name, desc.dims());
        Ok(self.fields.insert(desc, data))
    }

    fn field_desc(&self, field: FieldHandle) -> CelerisResult<FieldDesc> {
        self.fields.desc(field).cloned()
    }

    fn field_count(&self) -> usize {
        self.fields.len()
    }

    fn upload_field(&mut self, field: FieldHandle, data: &FieldData) -> CelerisResult<()> {
        let target = self.fields.get_mut(field)?;
        if target.dims() != data.dims() {
            return Err(CelerisError::DimensionMismatch {
                context: "upload_field",
                expected: target.dims(),
                actual: data.dims(),
            });
        }
        target.data.copy_from_slice(&data.data);
        Ok(())
    }

    fn prepare_pass(
        &mut self,
        kernel: KernelId,
        bindings: &[FieldHandle],
        domain: (u32, u32),
    ) -> CelerisResult<PreparedPass> {
        let descs = bindings
            .iter()
            .map(|&h| self.fields.desc(h))
            .collect::<CelerisResult<Vec<_>>>()?;
        let pairs: Vec<(FieldHandle, &FieldDesc)> = bindings.iter().copied().zip(descs.iter().copied()).collect();
        kernel.validate(&pairs, domain)?;

        let dispatch = dispatch_size(descs[kernel.first_write()]);
        let id = self.passes.len();
        self.passes.push(CpuPass {
            kernel,
            bindings: bindings.to_vec(),
        });
        Ok(PreparedPass {
            id,
            kernel,
            dispatch,
        })
    }

    fn run_pass(&mut self, pass: &PreparedPass, uniforms: &UniformBlock) -> CelerisResult<()> {
        let entry = self
            .passes
            .get(pass.id)
            .filter(|p| p.kernel == pass.kernel)
            .ok_or(CelerisError::UnknownPass(pass.id))?;
        let kernel = entry.kernel;
        let reads = kernel.read_count();
        let (read_handles, write_handles) = entry.bindings.split_at(reads);

        // Writes never alias reads, so they can be moved out for the dispatch
        let mut outputs = Vec::with_capacity(write_handles.len());
        for &handle in write_handles {
            outputs.push(std::mem::take(self.fields.get_mut(handle)?));
        }
        {
            let inputs = read_handles
                .iter()
                .map(|&h| self.fields.get(h))
                .collect::<CelerisResult<Vec<_>>>()?;
            kernels::dispatch(kernel, uniforms, &inputs, &mut outputs);
        }
        for (&handle, data) in write_handles.iter().zip(outputs) {
            *self.fields.get_mut(handle)? = data;
        }

        self.stats.dispatches += 1;
        self.record(TraceEvent::Dispatch {
            kernel,
            uniforms: *uniforms,
        });
        Ok(())
    }

    fn copy_field(&mut self, src: FieldHandle, dst: FieldHandle) -> CelerisResult<()> {
        check_copy(self.fields.desc(src)?, self.fields.desc(dst)?)?;
        if src != dst {
            let data = self.fields.get(src)?.data.clone();
            self.fields.get_mut(dst)?.data.copy_from_slice(&data);
        }
        self.stats.copies += 1;
        self.record(TraceEvent::Copy { src, dst });
        Ok(())
    }

    fn submit(&mut self) -> CelerisResult<()> {
        self.stats.submissions += 1;
        self.record(TraceEvent::Submit);
        Ok(())
    }

    fn read_field(&mut self, field: FieldHandle) -> CelerisResult<FieldData> {
        self.fields.get(field).cloned()
    }

    fn destroy_all(&mut self) {
        let released = self.fields.clear();
        trace!("Released {} fields", released.len());
        self.passes.clear();
    }

    fn stats(&self) -> BackendStats {
        self.stats
    }

    fn take_trace(&mut self) -> Vec<TraceEvent> {
        self.trace.as_mut().map(std::mem::take).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::params::ParamBuilder;

    fn grid(backend: &mut CpuBackend, name: &str) -> FieldHandle {
        backend.create_field(FieldDesc::grid(name, 20, 18)).unwrap()
    }

    #[test]
    fn test_prepare_computes_tile_dispatch() {
        let mut backend = CpuBackend::new();
        let state = grid(&mut backend, "state");
        let bottom = grid(&mut backend, "bottom");
        let near_dry = grid(&mut backend, "near_dry");
        let pass = backend
            .prepare_pass(KernelId::NearDry, &[state, bottom, near_dry], (20, 18))
            .unwrap();
        assert_eq!(pass.dispatch(), (2, 2));
        assert_eq!(pass.kernel(), KernelId::NearDry);
    }

    #[test]
    fn test_run_pass_writes_outputs() {
        let mut backend = CpuBackend::with_trace();
        let state = grid(&mut backend, "state");
        let bottom = grid(&mut backend, "bottom");
        let near_dry = grid(&mut backend, "near_dry");
        backend
            .upload_field(bottom, &FieldData::with_value(20, 18, [-2.0, -2.0, -2.0, 99.0]))
            .unwrap();
        let pass = backend
            .prepare_pass(KernelId::NearDry, &[state, bottom, near_dry], (20, 18))
            .unwrap();
        let config = SimulationConfig {
            width: 20,
            height: 18,
            ..SimulationConfig::default()
        };
        let uniforms = UniformBlock::pack(&ParamBuilder::new(&config).depth());
        backend.run_pass(&pass, &uniforms).unwrap();
        backend.submit().unwrap();

        let depth = backend.read_field_channel(near_dry, 0).unwrap();
        assert!(depth.iter().all(|&h| (h - 2.0).abs() < 1e-6));
        // Inputs survive the dispatch
        assert_eq!(backend.read_field(bottom).unwrap().get(3, 3)[2], -2.0);
        assert_eq!(backend.stats().dispatches, 1);
        assert!(matches!(backend.trace()[0], TraceEvent::Dispatch { kernel: KernelId::NearDry, .. }));
        assert_eq!(backend.trace()[1], TraceEvent::Submit);
    }

    #[test]
    fn test_copy_requires_equal_extent() {
        let mut backend = CpuBackend::new();
        let a = grid(&mut backend, "a");
        let b = backend.create_field(FieldDesc::grid("b", 4, 4)).unwrap();
        assert!(matches!(
            backend.copy_field(a, b),
            Err(CelerisError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_destroy_invalidates_handles_and_passes() {
        let mut backend = CpuBackend::new();
        let state = grid(&mut backend, "state");
        let bottom = grid(&mut backend, "bottom");
        let near_dry = grid(&mut backend, "near_dry");
        let pass = backend
            .prepare_pass(KernelId::NearDry, &[state, bottom, near_dry], (20, 18))
            .unwrap();
        backend.destroy_all();

        assert_eq!(backend.field_count(), 0);
        assert!(matches!(backend.read_field(state), Err(CelerisError::StaleHandle { .. })));
        assert!(matches!(
            backend.run_pass(&pass, &UniformBlock::default()),
            Err(CelerisError::UnknownPass(0))
        ));
    }

    #[test]
    fn test_channel_index_is_checked() {
        let mut backend = CpuBackend::new();
        let state = grid(&mut backend, "state");
        assert!(backend.read_field_channel(state, 4).is_err());
    }
}
