use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use fxhash::FxHashMap;
use log::debug;

use crate::gpu::DeviceKernel;
use crate::{
    BufferHandle, DeviceQueue, IntegratorState, KernelArg, KernelArgs,
    StateLayoutKind,
};

const WORKGROUP_SIZE: u32 = 64;

/// Bindings of group 0 that precede the state buffers.
const SORTED_KERNELS: [DeviceKernel; 3] = [
    DeviceKernel::IntegratorShadeSurface,
    DeviceKernel::IntegratorShadeSurfaceRaytrace,
    DeviceKernel::IntegratorShadeSurfaceMnee,
];

/// Device queue backed by wgpu compute pipelines.
///
/// Kernels are compute shaders registered by the caller through
/// [`Self::with_kernel()`]; each one is dispatched in workgroups of 64
/// invocations, with the following interface:
///
/// - bind group 0 holds the integrator state: queue counter, next shadow path
///   index, next main path index, sort key counters of the three sorted
///   shading kernels, followed by the state layout's buffers,
/// - bind group 1 holds the launch's buffer arguments, in order (absent
///   optional buffers are bound to a placeholder),
/// - the launch's int arguments are passed as push constants, in order.
///
/// The device must support [`wgpu::Features::PUSH_CONSTANTS`].
pub struct WgpuQueue {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    buffers: FxHashMap<BufferHandle, WgpuBuffer>,
    next_buffer_id: u32,
    placeholder: wgpu::Buffer,
    kernels: FxHashMap<DeviceKernel, KernelSource>,
    pipelines: FxHashMap<PipelineKey, Pipeline>,
    state: Option<StateBindings>,
    encoder: Option<wgpu::CommandEncoder>,
    failed: Arc<AtomicBool>,
}

struct WgpuBuffer {
    buffer: wgpu::Buffer,
    size: u64,
}

#[derive(Clone)]
struct KernelSource {
    module: Arc<wgpu::ShaderModule>,
    entry_point: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    kernel: DeviceKernel,
    num_buffers: usize,
    num_ints: usize,
}

struct Pipeline {
    pipeline: wgpu::ComputePipeline,
    args_layout: Option<wgpu::BindGroupLayout>,
}

struct StateBindings {
    layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
}

impl WgpuQueue {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        if !device.features().contains(wgpu::Features::PUSH_CONSTANTS) {
            log::warn!(
                "Device doesn't support push constants; kernel launches will \
                 fail"
            );
        }

        let failed = Arc::new(AtomicBool::new(false));

        device.on_uncaptured_error(Box::new({
            let failed = Arc::clone(&failed);

            move |err| {
                log::error!("Device failed: {err}");
                failed.store(true, Ordering::SeqCst);
            }
        }));

        let placeholder = Self::create_buffer(&device, "wavefront_null", 4);

        Self {
            device,
            queue,
            buffers: Default::default(),
            next_buffer_id: 0,
            placeholder,
            kernels: Default::default(),
            pipelines: Default::default(),
            state: None,
            encoder: None,
            failed,
        }
    }

    pub fn with_kernel(
        mut self,
        kernel: DeviceKernel,
        module: Arc<wgpu::ShaderModule>,
        entry_point: &'static str,
    ) -> Self {
        self.register_kernel(kernel, module, entry_point);
        self
    }

    pub fn register_kernel(
        &mut self,
        kernel: DeviceKernel,
        module: Arc<wgpu::ShaderModule>,
        entry_point: &'static str,
    ) {
        self.kernels.insert(
            kernel,
            KernelSource {
                module,
                entry_point,
            },
        );

        self.pipelines.retain(|key, _| key.kernel != kernel);
    }

    fn create_buffer(
        device: &wgpu::Device,
        label: &str,
        size: u64,
    ) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            // Bindings and copies must be non-empty and word-aligned
            size: align(size).max(4),
            mapped_at_creation: false,
        })
    }

    fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }
    }

    fn buffer(&self, handle: BufferHandle) -> Option<&wgpu::Buffer> {
        match self.buffers.get(&handle) {
            Some(buffer) => Some(&buffer.buffer),
            None => {
                log::error!("Unknown {handle:?}");
                self.failed.store(true, Ordering::SeqCst);
                None
            }
        }
    }

    fn fail(&self, message: impl AsRef<str>) {
        log::error!("{}", message.as_ref());
        self.failed.store(true, Ordering::SeqCst);
    }

    /// Submits everything recorded so far.
    fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit([encoder.finish()]);
        }
    }

    fn pipeline(&mut self, key: PipelineKey) -> Option<&Pipeline> {
        if !self.pipelines.contains_key(&key) {
            let pipeline = self.create_pipeline(key)?;

            self.pipelines.insert(key, pipeline);
        }

        self.pipelines.get(&key)
    }

    fn create_pipeline(&self, key: PipelineKey) -> Option<Pipeline> {
        let Some(source) = self.kernels.get(&key.kernel) else {
            self.fail(format!("Kernel `{}` is not registered", key.kernel));
            return None;
        };

        let Some(state) = &self.state else {
            self.fail("Device has no integrator state yet");
            return None;
        };

        debug!("Initializing kernel: {}:{}", key.kernel, source.entry_point);

        let args_layout = (key.num_buffers > 0).then(|| {
            let entries: Vec<_> = (0..key.num_buffers)
                .map(|binding| Self::storage_entry(binding as u32))
                .collect();

            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&format!("wavefront_{}_args", key.kernel)),
                    entries: &entries,
                })
        });

        let mut bind_group_layouts = vec![&state.layout];

        bind_group_layouts.extend(args_layout.as_ref());

        let push_constant_ranges = if key.num_ints > 0 {
            vec![wgpu::PushConstantRange {
                stages: wgpu::ShaderStages::COMPUTE,
                range: Range {
                    start: 0,
                    end: (key.num_ints * 4) as u32,
                },
            }]
        } else {
            vec![]
        };

        let pipeline_layout_label =
            format!("wavefront_{}_pipeline_layout", key.kernel);

        let pipeline_layout = self.device.create_pipeline_layout(
            &wgpu::PipelineLayoutDescriptor {
                label: Some(&pipeline_layout_label),
                bind_group_layouts: &bind_group_layouts,
                push_constant_ranges: &push_constant_ranges,
            },
        );

        let pipeline_label = format!("wavefront_{}_pipeline", key.kernel);

        let pipeline = self.device.create_compute_pipeline(
            &wgpu::ComputePipelineDescriptor {
                label: Some(&pipeline_label),
                layout: Some(&pipeline_layout),
                module: &source.module,
                entry_point: source.entry_point,
            },
        );

        Some(Pipeline {
            pipeline,
            args_layout,
        })
    }
}

impl DeviceQueue for WgpuQueue {
    fn alloc(&mut self, label: &str, size: usize) -> BufferHandle {
        let handle = BufferHandle::new(self.next_buffer_id);

        self.next_buffer_id += 1;

        debug!("Allocating buffer `{label}`; size={size}");

        self.buffers.insert(
            handle,
            WgpuBuffer {
                buffer: Self::create_buffer(&self.device, label, size as u64),
                size: size as u64,
            },
        );

        handle
    }

    fn free(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer).is_none() {
            log::warn!("Tried to free unknown {buffer:?}");
        }
    }

    fn init_execution(&mut self, state: &IntegratorState) {
        let mut handles = vec![
            Some(state.queue_counter),
            Some(state.next_shadow_path_index),
            Some(state.next_main_path_index),
        ];

        handles.extend(
            SORTED_KERNELS
                .iter()
                .map(|&kernel| state.sort_key_counter(kernel)),
        );

        handles.extend(
            state
                .layout
                .buffers()
                .iter()
                .map(|buffer| Some(buffer.handle)),
        );

        let mut buffers = Vec::with_capacity(handles.len());

        for handle in handles {
            match handle {
                Some(handle) => match self.buffer(handle) {
                    Some(buffer) => buffers.push(buffer),
                    None => return,
                },
                None => buffers.push(&self.placeholder),
            }
        }

        let entries: Vec<_> = (0..buffers.len())
            .map(|binding| Self::storage_entry(binding as u32))
            .collect();

        let layout = self.device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("wavefront_state"),
                entries: &entries,
            },
        );

        let entries: Vec<_> = buffers
            .iter()
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        let bind_group =
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("wavefront_state"),
                layout: &layout,
                entries: &entries,
            });

        self.state = Some(StateBindings { layout, bind_group });
        self.pipelines.clear();
        self.failed.store(false, Ordering::SeqCst);
    }

    fn enqueue(
        &mut self,
        kernel: DeviceKernel,
        work_size: u32,
        args: &KernelArgs,
    ) {
        if work_size == 0 {
            return;
        }

        let mut handles = Vec::new();
        let mut ints = Vec::new();

        for arg in args.iter() {
            match *arg {
                KernelArg::Buffer(handle) => handles.push(Some(handle)),
                KernelArg::Null => handles.push(None),
                KernelArg::Int(value) => ints.push(value),
            }
        }

        let key = PipelineKey {
            kernel,
            num_buffers: handles.len(),
            num_ints: ints.len(),
        };

        if self.pipeline(key).is_none() {
            return;
        }

        let args_bind_group = {
            let mut entries = Vec::with_capacity(handles.len());

            for (binding, handle) in handles.into_iter().enumerate() {
                let buffer = match handle {
                    Some(handle) => match self.buffer(handle) {
                        Some(buffer) => buffer,
                        None => return,
                    },
                    None => &self.placeholder,
                };

                entries.push(wgpu::BindGroupEntry {
                    binding: binding as u32,
                    resource: buffer.as_entire_binding(),
                });
            }

            self.pipelines[&key].args_layout.as_ref().map(|layout| {
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("wavefront_{kernel}_args")),
                    layout,
                    entries: &entries,
                })
            })
        };

        let num_workgroups = (work_size + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE;

        log::trace!(
            "Dispatching `{kernel}`; work_size={work_size}, \
             workgroups={num_workgroups}"
        );

        let encoder = self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("wavefront_commands"),
                })
        });

        let (Some(state), Some(pipeline)) =
            (&self.state, self.pipelines.get(&key))
        else {
            return;
        };

        let label = format!("wavefront_{kernel}_pass");

        let mut pass =
            encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&label),
            });

        pass.set_pipeline(&pipeline.pipeline);
        pass.set_bind_group(0, &state.bind_group, &[]);

        if let Some(args_bind_group) = &args_bind_group {
            pass.set_bind_group(1, args_bind_group, &[]);
        }

        if !ints.is_empty() {
            pass.set_push_constants(0, bytemuck::cast_slice(&ints));
        }

        pass.dispatch_workgroups(num_workgroups, 1, 1);
    }

    fn copy_to_device(&mut self, buffer: BufferHandle, data: &[u8]) {
        // Buffer writes are executed before commands that are still being
        // recorded, so those have to be submitted first
        self.flush();

        let Some(target) = self.buffer(buffer) else {
            return;
        };

        if data.len() % 4 == 0 {
            self.queue.write_buffer(target, 0, data);
        } else {
            let mut padded = data.to_vec();

            padded.resize(align(data.len() as u64) as usize, 0);
            self.queue.write_buffer(target, 0, &padded);
        }
    }

    fn copy_from_device(&mut self, buffer: BufferHandle, data: &mut [u8]) {
        if data.is_empty() {
            return;
        }

        let size = align(data.len() as u64);

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("wavefront_staging"),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            size,
            mapped_at_creation: false,
        });

        let Some(source) = self.buffers.get(&buffer) else {
            self.fail(format!("Unknown {buffer:?}"));
            return;
        };

        if source.size < data.len() as u64 {
            self.fail(format!("{buffer:?} is too small"));
            return;
        }

        let mut encoder = self.encoder.take().unwrap_or_else(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("wavefront_commands"),
                })
        });

        encoder.copy_buffer_to_buffer(&source.buffer, 0, &staging, 0, size);
        self.queue.submit([encoder.finish()]);

        let (tx, rx) = mpsc::channel();

        staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                _ = tx.send(result);
            });

        self.device.poll(wgpu::Maintain::Wait);

        match rx.recv() {
            Ok(Ok(())) => {
                let mapped = staging.slice(..).get_mapped_range();

                data.copy_from_slice(&mapped[..data.len()]);
            }

            result => {
                self.fail(format!("Couldn't read {buffer:?}: {result:?}"));
                return;
            }
        }

        staging.unmap();
    }

    fn zero_to_device(&mut self, buffer: BufferHandle) {
        let Some(target) = self.buffers.get(&buffer) else {
            self.fail(format!("Unknown {buffer:?}"));
            return;
        };

        let target = &target.buffer;
        let encoder = self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("wavefront_commands"),
                })
        });

        encoder.clear_buffer(target, 0, None);
    }

    fn synchronize(&mut self) -> bool {
        self.flush();
        self.device.poll(wgpu::Maintain::Wait);

        !self.failed.load(Ordering::SeqCst)
    }

    fn num_concurrent_states(&self, state_size: usize) -> u32 {
        let limits = self.device.limits();

        let max_binding = (limits.max_storage_buffer_binding_size as u64)
            .min(limits.max_buffer_size);

        (max_binding / state_size.max(1) as u64).min(1 << 20) as u32
    }

    fn num_concurrent_busy_states(&self, state_size: usize) -> u32 {
        self.num_concurrent_states(state_size) / 4
    }

    fn preferred_state_layout(&self) -> StateLayoutKind {
        // Per-field buffers would quickly exceed the per-stage limit of
        // storage bindings
        StateLayoutKind::Aos
    }
}

fn align(size: u64) -> u64 {
    (size + 3) & !3
}
