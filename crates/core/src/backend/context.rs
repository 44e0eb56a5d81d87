//! wgpu device acquisition
//!
//! A device is only useful to the solver if it can bind the widest kernel
//! contract, counting both write-only storage textures and sampled ones in a
//! single compute stage. [`GpuContext::new`] requests exactly those limits and reports
//! "no adapter" separately from "adapter present but unusable", so the caller can
//! stay quiet about the first and warn about the second.

/// Outcome of acquiring a device
#[derive(Debug)]
pub enum GpuInitResult {
    /// Device ready for the wgpu backend
    #[cfg(feature = "gpu")]
    Success(GpuContext),
    /// No adapter at all, normal on headless machines
    NoGpuFound,
    /// Adapter present but the device request failed or limits are too low
    InitFailed {
        /// Name of the adapter that failed
        adapter_name: String,
        /// Error message
        error: String,
    },
}

#[cfg(feature = "gpu")]
mod gpu_impl {
    use super::GpuInitResult;
    use crate::config::SimulationConfig;
    use crate::field::BYTES_PER_TEXEL;
    use crate::kernel::{KernelId, DISPERSION_LAYERS};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tracing::{debug, error, info};

    /// Full-size grid fields of the largest layout (fully nonlinear mode, breaking,
    /// sediment, statistics)
    const MAX_GRID_FIELDS: u64 = 56;

    /// Sampled and storage texture counts of the widest kernel contract
    fn binding_demand() -> (u32, u32) {
        KernelId::ALL.iter().fold((0, 0), |(reads, writes), &kernel| {
            let r = u32::try_from(kernel.read_count()).unwrap_or(u32::MAX);
            let w = u32::try_from(kernel.layout().len() - kernel.read_count()).unwrap_or(u32::MAX);
            (reads.max(r), writes.max(w))
        })
    }

    /// Device, queue and a device-lost flag
    #[derive(Debug)]
    pub struct GpuContext {
        device: wgpu::Device,
        queue: wgpu::Queue,
        adapter_name: String,
        lost: Arc<AtomicBool>,
    }

    impl GpuContext {
        /// Acquire a high-performance adapter and a device that fits every kernel
        #[allow(clippy::new_ret_no_self)]
        #[must_use]
        pub fn new() -> GpuInitResult {
            let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });

            let Some(adapter) = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })) else {
                debug!("No GPU adapter found");
                return GpuInitResult::NoGpuFound;
            };
            let adapter_name = adapter.get_info().name;

            let (reads, writes) = binding_demand();
            let supported = adapter.limits();
            if supported.max_storage_textures_per_shader_stage < writes
                || supported.max_sampled_textures_per_shader_stage < reads
            {
                return GpuInitResult::InitFailed {
                    adapter_name,
                    error: format!(
                        "needs {writes} storage and {reads} sampled textures per stage, adapter offers {} and {}",
                        supported.max_storage_textures_per_shader_stage,
                        supported.max_sampled_textures_per_shader_stage
                    ),
                };
            }
            let required_limits = wgpu::Limits {
                max_storage_textures_per_shader_stage: writes,
                max_sampled_textures_per_shader_stage: reads.max(16),
                ..wgpu::Limits::default()
            }
            .using_resolution(supported.clone());

            let (device, queue) = match pollster::block_on(adapter.request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Celeris Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits,
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )) {
                Ok(pair) => pair,
                Err(e) => {
                    return GpuInitResult::InitFailed {
                        adapter_name,
                        error: e.to_string(),
                    };
                }
            };

            let lost = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&lost);
            device.set_device_lost_callback(move |reason, message| {
                error!("GPU device lost ({:?}): {}", reason, message);
                flag.store(true, Ordering::SeqCst);
            });

            info!("GPU device ready on {}", adapter_name);
            GpuInitResult::Success(Self {
                device,
                queue,
                adapter_name,
                lost,
            })
        }

        #[must_use]
        pub fn adapter_name(&self) -> &str {
            &self.adapter_name
        }

        /// Why the device cannot hold the fields of `config`, if it cannot
        ///
        /// Checks texture extents and estimates field memory against half the
        /// buffer limit.
        #[must_use]
        pub fn domain_shortfall(&self, config: &SimulationConfig) -> Option<String> {
            let limits = self.device.limits();
            let largest = config.width.max(config.height);
            if largest > limits.max_texture_dimension_2d {
                return Some(format!(
                    "{largest} cells exceed the {} texel texture limit",
                    limits.max_texture_dimension_2d
                ));
            }
            if largest > limits.max_texture_dimension_3d || DISPERSION_LAYERS > limits.max_texture_dimension_3d {
                return Some(format!(
                    "the dispersion volume exceeds the {} texel 3D limit",
                    limits.max_texture_dimension_3d
                ));
            }
            let cells = u64::from(config.width) * u64::from(config.height);
            let texels = cells * (MAX_GRID_FIELDS + u64::from(DISPERSION_LAYERS));
            let bytes = texels * u64::from(BYTES_PER_TEXEL);
            if bytes >= limits.max_buffer_size / 2 {
                return Some(format!("about {} MiB of fields", bytes >> 20));
            }
            None
        }

        /// Split into device, queue, adapter name and the device-lost flag
        #[must_use]
        pub fn into_parts(self) -> (wgpu::Device, wgpu::Queue, String, Arc<AtomicBool>) {
            (self.device, self.queue, self.adapter_name, self.lost)
        }
    }

}

#[cfg(feature = "gpu")]
pub use gpu_impl::GpuContext;
