//! wgpu compute backend
//!
//! Fields are RGBA32F textures (3D for volume fields). Every kernel gets one
//! bind group layout derived from its binding contract: binding 0 is a slot of
//! a shared uniform ring buffer selected with a dynamic offset, reads are
//! non-filterable sampled textures and writes are write-only storage textures.
//!
//! Dispatches and copies are recorded into one open command encoder. Each
//! dispatch writes its uniform block into the next free ring slot, so any number
//! of dispatches of the same kernel with different parameters can share a
//! submission. The encoder is submitted when the orchestrator calls `submit`,
//! before a readback, or when the ring runs out of slots.
//!
//! This backend is only available when the `gpu` feature is enabled.

use super::context::GpuContext;
use super::{check_copy, dispatch_size, BackendStats, ComputeBackend, KernelSources, PreparedPass};
use crate::error::{CelerisError, CelerisResult};
use crate::field::{padded_bytes_per_row, FieldData, FieldDesc, FieldHandle, FieldKind, FieldRegistry};
use crate::kernel::{Access, KernelId, Shape};
use crate::params::{UniformBlock, UNIFORM_BLOCK_SIZE};
use rustc_hash::FxHashMap;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Uniform ring capacity in 256-byte slots
const RING_SLOTS: u32 = 4096;

const FIELD_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

struct GpuField {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct KernelPipeline {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

struct GpuPass {
    kernel: KernelId,
    bind_group: wgpu::BindGroup,
}

/// Compute backend running WGSL kernels through wgpu
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    sources: KernelSources,
    fields: FieldRegistry<GpuField>,
    pipelines: FxHashMap<KernelId, KernelPipeline>,
    passes: Vec<GpuPass>,
    uniform_ring: wgpu::Buffer,
    ring_slot: u32,
    encoder: Option<wgpu::CommandEncoder>,
    device_lost: Arc<AtomicBool>,
    readback_timeout: Duration,
    stats: BackendStats,
}

fn extent(desc: &FieldDesc) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: desc.width,
        height: desc.height,
        depth_or_array_layers: desc.depth,
    }
}

fn view_dimension(shape: Shape) -> wgpu::TextureViewDimension {
    match shape {
        Shape::Volume(_) => wgpu::TextureViewDimension::D3,
        Shape::Grid | Shape::Line => wgpu::TextureViewDimension::D2,
    }
}

fn copy_target(texture: &wgpu::Texture) -> wgpu::ImageCopyTexture<'_> {
    wgpu::ImageCopyTexture {
        texture,
        mip_level: 0,
        origin: wgpu::Origin3d::ZERO,
        aspect: wgpu::TextureAspect::All,
    }
}

/// Drive `poll` until `rx` yields or `timeout` elapses
///
/// Returns `None` on timeout or when the sender is gone.
fn poll_until<T>(mut poll: impl FnMut(), rx: &mpsc::Receiver<T>, timeout: Duration) -> Option<T> {
    let deadline = Instant::now() + timeout;
    loop {
        poll();
        match rx.try_recv() {
            Ok(value) => return Some(value),
            Err(mpsc::TryRecvError::Disconnected) => return None,
            Err(mpsc::TryRecvError::Empty) => {}
        }
        if Instant::now() >= deadline {
            return None;
        }
        thread::yield_now();
    }
}

impl GpuBackend {
    /// Create a backend on an initialised device
    ///
    /// # Arguments
    ///
    /// * `context` - GPU context with device and queue
    /// * `sources` - WGSL sources, compiled when a pass first needs them
    /// * `readback_timeout` - Upper bound on waiting for a mapped readback
    #[must_use]
    pub fn new(context: GpuContext, sources: KernelSources, readback_timeout: Duration) -> Self {
        let (device, queue, adapter_name, device_lost) = context.into_parts();

        let uniform_ring = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Uniform Ring"),
            size: u64::from(RING_SLOTS) * UNIFORM_BLOCK_SIZE as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            device,
            queue,
            adapter_name,
            sources,
            fields: FieldRegistry::new(),
            pipelines: FxHashMap::default(),
            passes: Vec::new(),
            uniform_ring,
            ring_slot: 0,
            encoder: None,
            device_lost,
            readback_timeout,
            stats: BackendStats::default(),
        }
    }

    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let device = &self.device;
        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Celeris Step Encoder"),
            })
        })
    }

    /// Submit the open encoder, if any, and recycle the uniform ring
    fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        self.ring_slot = 0;
    }

    /// Compile the pipeline of `kernel` on first use
    fn pipeline(&mut self, kernel: KernelId) -> CelerisResult<&KernelPipeline> {
        if !self.pipelines.contains_key(&kernel) {
            let source = self.sources.require(kernel)?;
            let built = build_pipeline(&self.device, kernel, source);
            debug!("Compiled kernel {}", kernel.name());
            self.pipelines.insert(kernel, built);
        }
        self.pipelines
            .get(&kernel)
            .ok_or_else(|| CelerisError::MissingKernel {
                kernel: kernel.name(),
                file: kernel.file_name().into(),
            })
    }
}

fn build_pipeline(device: &wgpu::Device, kernel: KernelId, source: &str) -> KernelPipeline {
    let mut entries = vec![wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: true,
            min_binding_size: NonZeroU64::new(UNIFORM_BLOCK_SIZE as u64),
        },
        count: None,
    }];
    for (slot, decl) in kernel.layout().iter().enumerate() {
        let ty = match decl.access {
            Access::Read => wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: view_dimension(decl.shape),
                multisampled: false,
            },
            Access::Write => wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format: FIELD_FORMAT,
                view_dimension: view_dimension(decl.shape),
            },
        };
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: slot as u32 + 1,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty,
            count: None,
        });
    }

    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(kernel.name()),
        entries: &entries,
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(kernel.name()),
        bind_group_layouts: &[&layout],
        push_constant_ranges: &[],
    });
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(kernel.name()),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(kernel.name()),
        layout: Some(&pipeline_layout),
        module: &module,
        entry_point: "main",
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    });
    KernelPipeline { pipeline, layout }
}

impl ComputeBackend for GpuBackend {
    fn name(&self) -> String {
        format!("GPU ({})", self.adapter_name)
    }

    fn is_gpu_accelerated(&self) -> bool {
        true
    }

    fn create_field(&mut self, desc: FieldDesc) -> CelerisResult<FieldHandle> {
        let dimension = if desc.kind == FieldKind::Volume {
            wgpu::TextureDimension::D3
        } else {
            wgpu::TextureDimension::D2
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.name),
            size: extent(&desc),
            mip_level_count: 1,
            sample_count: 1,
            dimension,
            format: FIELD_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        trace!("Allocated texture '{}' {:?}", desc.name, desc.dims());
        Ok(self.fields.insert(desc, GpuField { texture, view }))
    }

    fn field_desc(&self, field: FieldHandle) -> CelerisResult<FieldDesc> {
        self.fields.desc(field).cloned()
    }

    fn field_count(&self) -> usize {
        self.fields.len()
    }

    fn upload_field(&mut self, field: FieldHandle, data: &FieldData) -> CelerisResult<()> {
        let desc = self.fields.desc(field)?;
        if desc.dims() != data.dims() {
            return Err(CelerisError::DimensionMismatch {
                context: "upload_field",
                expected: desc.dims(),
                actual: data.dims(),
            });
        }
        let size = extent(desc);
        let target = self.fields.get(field)?;
        // Queue writes land before any later submission, so keep program order
        // by flushing work recorded so far
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
            self.ring_slot = 0;
        }
        self.queue.write_texture(
            copy_target(&target.texture),
            bytemuck::cast_slice(&data.data),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(size.width * crate::field::BYTES_PER_TEXEL),
                rows_per_image: Some(size.height),
            },
            size,
        );
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
            .map(|&h| self.fields.desc(h).cloned())
            .collect::<CelerisResult<Vec<_>>>()?;
        let pairs: Vec<(FieldHandle, &FieldDesc)> = bindings.iter().copied().zip(descs.iter()).collect();
        kernel.validate(&pairs, domain)?;
        let dispatch = dispatch_size(&descs[kernel.first_write()]);

        self.pipeline(kernel)?;
        let layout = &self
            .pipelines
            .get(&kernel)
            .ok_or(CelerisError::UnknownPass(self.passes.len()))?
            .layout;

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &self.uniform_ring,
                offset: 0,
                size: NonZeroU64::new(UNIFORM_BLOCK_SIZE as u64),
            }),
        }];
        for (slot, &handle) in bindings.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: slot as u32 + 1,
                resource: wgpu::BindingResource::TextureView(&self.fields.get(handle)?.view),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel.name()),
            layout,
            entries: &entries,
        });

        let id = self.passes.len();
        self.passes.push(GpuPass { kernel, bind_group });
        Ok(PreparedPass {
            id,
            kernel,
            dispatch,
        })
    }

    fn run_pass(&mut self, pass: &PreparedPass, uniforms: &UniformBlock) -> CelerisResult<()> {
        if self.ring_slot >= RING_SLOTS {
            trace!("Uniform ring full, flushing");
            self.flush();
            self.stats.submissions += 1;
        }
        let offset = self.ring_slot * UNIFORM_BLOCK_SIZE as u32;
        self.queue
            .write_buffer(&self.uniform_ring, u64::from(offset), uniforms.as_bytes());
        self.ring_slot += 1;

        self.encoder();
        let (Some(encoder), Some(entry)) = (self.encoder.as_mut(), self.passes.get(pass.id)) else {
            return Err(CelerisError::UnknownPass(pass.id));
        };
        if entry.kernel != pass.kernel {
            return Err(CelerisError::UnknownPass(pass.id));
        }
        let pipeline = self
            .pipelines
            .get(&entry.kernel)
            .ok_or(CelerisError::UnknownPass(pass.id))?;
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(entry.kernel.name()),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&pipeline.pipeline);
            compute_pass.set_bind_group(0, &entry.bind_group, &[offset]);
            compute_pass.dispatch_workgroups(pass.dispatch.0, pass.dispatch.1, 1);
        }
        self.stats.dispatches += 1;
        Ok(())
    }

    fn copy_field(&mut self, src: FieldHandle, dst: FieldHandle) -> CelerisResult<()> {
        let src_desc = self.fields.desc(src)?;
        check_copy(src_desc, self.fields.desc(dst)?)?;
        let size = extent(src_desc);
        if src != dst {
            self.encoder();
            let (Some(encoder), Ok(from), Ok(to)) =
                (self.encoder.as_mut(), self.fields.get(src), self.fields.get(dst))
            else {
                return Err(CelerisError::StaleHandle {
                    index: src.index,
                    generation: src.generation,
                });
            };
            encoder.copy_texture_to_texture(copy_target(&from.texture), copy_target(&to.texture), size);
        }
        self.stats.copies += 1;
        Ok(())
    }

    fn submit(&mut self) -> CelerisResult<()> {
        self.check_device()?;
        self.flush();
        self.stats.submissions += 1;
        Ok(())
    }

    fn read_field(&mut self, field: FieldHandle) -> CelerisResult<FieldData> {
        self.check_device()?;
        let desc = self.fields.desc(field)?.clone();
        let pitch = padded_bytes_per_row(desc.width);
        let size = u64::from(pitch) * u64::from(desc.height) * u64::from(desc.depth);
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        self.encoder();
        let (Some(encoder), Ok(source)) = (self.encoder.as_mut(), self.fields.get(field)) else {
            return Err(CelerisError::StaleHandle {
                index: field.index,
                generation: field.generation,
            });
        };
        encoder.copy_texture_to_buffer(
            copy_target(&source.texture),
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(pitch),
                    rows_per_image: Some(desc.height),
                },
            },
            extent(&desc),
        );
        self.flush();

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        let readback_error = |reason: String| CelerisError::Readback {
            field: desc.name.clone(),
            reason,
        };
        let device = &self.device;
        let poll = || {
            device.poll(wgpu::Maintain::Poll);
        };
        match poll_until(poll, &rx, self.readback_timeout) {
            Some(Ok(())) => {}
            Some(Err(e)) => return Err(readback_error(e.to_string())),
            None => {
                return Err(readback_error(format!(
                    "map did not complete within {} ms",
                    self.readback_timeout.as_millis()
                )))
            }
        }

        let result = {
            let mapped = slice.get_mapped_range();
            FieldData::from_padded_bytes(
                desc.width as usize,
                desc.height as usize,
                desc.depth as usize,
                &mapped,
            )
        };
        staging.unmap();
        result
    }

    fn destroy_all(&mut self) {
        self.flush();
        self.passes.clear();
        for field in self.fields.clear() {
            field.texture.destroy();
        }
        debug!("Released all GPU fields");
    }

    fn check_device(&self) -> CelerisResult<()> {
        if self.device_lost.load(Ordering::SeqCst) {
            Err(CelerisError::DeviceLost(format!(
                "adapter '{}' is no longer available",
                self.adapter_name
            )))
        } else {
            Ok(())
        }
    }

    fn stats(&self) -> BackendStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GpuInitResult;

    #[test]
    fn test_poll_until_returns_once_the_map_completes() {
        let (tx, rx) = mpsc::channel();
        let mut polls = 0;
        let value = poll_until(
            || {
                polls += 1;
                if polls == 3 {
                    tx.send(7).unwrap();
                }
            },
            &rx,
            Duration::from_secs(5),
        );
        assert_eq!(value, Some(7));
        assert_eq!(polls, 3);
    }

    #[test]
    fn test_poll_until_gives_up_at_the_deadline() {
        let (_tx, rx) = mpsc::channel::<()>();
        let started = Instant::now();
        let value = poll_until(|| {}, &rx, Duration::from_millis(20));
        assert!(value.is_none());
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(20));
        assert!(waited < Duration::from_secs(2), "waited {waited:?}");
    }

    #[test]
    fn test_missing_source_fails_at_prepare() {
        // Skip on machines without a GPU
        let GpuInitResult::Success(context) = GpuContext::new() else {
            return;
        };
        let mut backend = GpuBackend::new(context, KernelSources::new(), Duration::from_secs(2));
        let state = backend.create_field(FieldDesc::grid("state", 16, 16)).unwrap();
        let bottom = backend.create_field(FieldDesc::grid("bottom", 16, 16)).unwrap();
        let out = backend.create_field(FieldDesc::grid("near_dry", 16, 16)).unwrap();
        assert!(matches!(
            backend.prepare_pass(KernelId::NearDry, &[state, bottom, out], (16, 16)),
            Err(CelerisError::MissingKernel { kernel: "Pass0", .. })
        ));
    }

    #[test]
    fn test_upload_and_read_back() {
        let GpuInitResult::Success(context) = GpuContext::new() else {
            return;
        };
        let mut backend = GpuBackend::new(context, KernelSources::new(), Duration::from_secs(2));
        let field = backend.create_field(FieldDesc::grid("state", 20, 3)).unwrap();
        let mut data = FieldData::new(20, 3);
        data.set(19, 2, [1.0, 2.0, 3.0, 4.0]);
        backend.upload_field(field, &data).unwrap();
        assert_eq!(backend.read_field(field).unwrap(), data);
    }
}
