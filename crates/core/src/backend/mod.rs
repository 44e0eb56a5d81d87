//! Compute backends
//!
//! The orchestrator never touches a graphics API directly. Everything it needs
//! from the device goes through [`ComputeBackend`]: allocate fields, prepare
//! passes with their bindings validated up front, dispatch a pass with one
//! uniform block, copy fields, submit, and read fields back.
//!
//! # Feature Flags
//!
//! - `gpu` (default): Enables the wgpu backend. Disable with `--no-default-features`
//!   for environments without GPU access.
//!
//! # Backend Selection
//!
//! [`create_backend`] picks the best available backend:
//! 1. GPU, if the `gpu` feature is enabled, kernel sources were supplied and an
//!    adapter initialises
//! 2. The CPU reference backend otherwise (always available)

mod context;
mod cpu;
mod sources;

#[cfg(feature = "gpu")]
mod gpu;

pub use context::GpuInitResult;
pub use cpu::CpuBackend;
pub use sources::KernelSources;

#[cfg(feature = "gpu")]
pub use context::GpuContext;
#[cfg(feature = "gpu")]
pub use gpu::GpuBackend;

use crate::config::SimulationConfig;
use crate::error::{CelerisError, CelerisResult};
use crate::field::{FieldData, FieldDesc, FieldHandle};
use crate::kernel::KernelId;
use crate::params::UniformBlock;
use tracing::info;

#[cfg(feature = "gpu")]
use tracing::warn;

/// A validated pass ready for dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreparedPass {
    pub(crate) id: usize,
    pub(crate) kernel: KernelId,
    pub(crate) dispatch: (u32, u32),
}

impl PreparedPass {
    #[must_use]
    pub fn kernel(&self) -> KernelId {
        self.kernel
    }

    /// Workgroup counts in x and y
    #[must_use]
    pub fn dispatch(&self) -> (u32, u32) {
        self.dispatch
    }
}

/// Work recorded by a backend, in submission order
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    Dispatch {
        kernel: KernelId,
        uniforms: UniformBlock,
    },
    Copy {
        src: FieldHandle,
        dst: FieldHandle,
    },
    Submit,
}

/// Running totals of recorded work
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub dispatches: u64,
    pub copies: u64,
    pub submissions: u64,
}

/// Device-agnostic compute interface
///
/// Passes and copies are recorded in call order; `submit` hands the recorded
/// batch to the device. A readback flushes pending work first, so it always
/// observes every previously recorded pass.
pub trait ComputeBackend: Send {
    /// Backend name for logging
    fn name(&self) -> String;

    /// Whether passes run on a GPU
    fn is_gpu_accelerated(&self) -> bool;

    /// Allocate a zero-initialised field
    ///
    /// # Errors
    /// Returns an error if the device cannot allocate the field
    fn create_field(&mut self, desc: FieldDesc) -> CelerisResult<FieldHandle>;

    /// Descriptor of a live field
    ///
    /// # Errors
    /// Returns [`CelerisError::StaleHandle`] for handles of a torn-down field set
    fn field_desc(&self, field: FieldHandle) -> CelerisResult<FieldDesc>;

    /// Number of live fields
    fn field_count(&self) -> usize;

    /// Overwrite a field with host data of identical extent
    ///
    /// # Errors
    /// Returns [`CelerisError::DimensionMismatch`] if the extents differ
    fn upload_field(&mut self, field: FieldHandle, data: &FieldData) -> CelerisResult<()>;

    /// Validate `bindings` against `kernel` and build the pass
    ///
    /// `domain` is the simulation (width, height) that grid bindings must match.
    ///
    /// # Errors
    /// Returns [`CelerisError::Binding`] for a contract violation and
    /// [`CelerisError::MissingKernel`] if the backend has no code for `kernel`
    fn prepare_pass(
        &mut self,
        kernel: KernelId,
        bindings: &[FieldHandle],
        domain: (u32, u32),
    ) -> CelerisResult<PreparedPass>;

    /// Record one dispatch of `pass` with `uniforms` at binding 0
    ///
    /// # Errors
    /// Returns [`CelerisError::UnknownPass`] for passes of a torn-down field set
    fn run_pass(&mut self, pass: &PreparedPass, uniforms: &UniformBlock) -> CelerisResult<()>;

    /// Record a full copy of `src` into `dst`
    ///
    /// # Errors
    /// Returns [`CelerisError::DimensionMismatch`] if the extents differ
    fn copy_field(&mut self, src: FieldHandle, dst: FieldHandle) -> CelerisResult<()>;

    /// Submit everything recorded so far
    ///
    /// # Errors
    /// Returns [`CelerisError::DeviceLost`] if the device is gone
    fn submit(&mut self) -> CelerisResult<()>;

    /// Read a whole field back to the host
    ///
    /// # Errors
    /// Returns [`CelerisError::Readback`] if the copy does not complete in time
    fn read_field(&mut self, field: FieldHandle) -> CelerisResult<FieldData>;

    /// Read one channel of a field back as a flat row-major array
    ///
    /// # Errors
    /// Returns [`CelerisError::Readback`] for a channel index above 3 or a failed readback
    fn read_field_channel(&mut self, field: FieldHandle, channel: usize) -> CelerisResult<Vec<f32>> {
        if channel > 3 {
            return Err(CelerisError::Readback {
                field: field.to_string(),
                reason: format!("channel {channel} out of range"),
            });
        }
        Ok(self.read_field(field)?.channel(channel))
    }

    /// Release every field and pass; outstanding handles become stale
    fn destroy_all(&mut self);

    /// Fails once the device has been lost
    ///
    /// # Errors
    /// Returns [`CelerisError::DeviceLost`]
    fn check_device(&self) -> CelerisResult<()> {
        Ok(())
    }

    /// Work recorded since creation
    fn stats(&self) -> BackendStats;

    /// Drain the recorded work log; backends that do not record return nothing
    fn take_trace(&mut self) -> Vec<TraceEvent> {
        Vec::new()
    }
}

/// Dispatch size of a pass: the first write binding's extent in 16×16 tiles
pub(crate) fn dispatch_size(desc: &FieldDesc) -> (u32, u32) {
    (
        desc.width.div_ceil(crate::TILE_SIZE),
        desc.height.div_ceil(crate::TILE_SIZE),
    )
}

/// Check that two fields can be copied into each other
pub(crate) fn check_copy(src: &FieldDesc, dst: &FieldDesc) -> CelerisResult<()> {
    if src.dims() == dst.dims() {
        Ok(())
    } else {
        Err(CelerisError::DimensionMismatch {
            context: "copy_field",
            expected: dst.dims(),
            actual: src.dims(),
        })
    }
}

/// Create a compute backend with automatic selection
///
/// Tries the GPU when the `gpu` feature is enabled and kernel sources are
/// available, falling back to the CPU reference backend otherwise.
///
/// # Arguments
///
/// * `config` - Simulation configuration (domain size, readback timeout)
/// * `sources` - WGSL sources of the kernels; `None` forces the CPU backend
pub fn create_backend(
    config: &SimulationConfig,
    sources: Option<KernelSources>,
) -> Box<dyn ComputeBackend> {
    #[cfg(feature = "gpu")]
    {
        let missing = sources.as_ref().map(KernelSources::missing).unwrap_or_default();
        if !missing.is_empty() {
            warn!(
                "No shader source for {} kernels (first: {}), using CPU backend",
                missing.len(),
                missing[0].file_name()
            );
        } else if let Some(sources) = sources {
            match GpuContext::new() {
                GpuInitResult::Success(context) => {
                    if let Some(shortfall) = context.domain_shortfall(config) {
                        warn!(
                            "GPU '{}' cannot hold the {}x{} grid ({}), falling back to CPU",
                            context.adapter_name(),
                            config.width,
                            config.height,
                            shortfall
                        );
                    } else {
                        info!(
                            "Using GPU backend: {} ({}x{} grid)",
                            context.adapter_name(),
                            config.width,
                            config.height
                        );
                        return Box::new(GpuBackend::new(
                            context,
                            sources,
                            std::time::Duration::from_millis(config.readback_timeout_ms),
                        ));
                    }
                }
                GpuInitResult::NoGpuFound => {
                    info!("No GPU found, using CPU backend");
                }
                GpuInitResult::InitFailed {
                    adapter_name,
                    error,
                } => {
                    warn!(
                        "GPU '{}' found but failed to initialize: {}. Falling back to CPU.",
                        adapter_name, error
                    );
                }
            }
        } else {
            info!("No kernel sources supplied, using CPU backend");
        }
    }

    #[cfg(not(feature = "gpu"))]
    {
        let _ = sources;
        info!("GPU feature disabled, using CPU backend");
    }

    info!(
        "CPU backend for {}x{} grid",
        config.width, config.height
    );
    Box::new(CpuBackend::new())
}
