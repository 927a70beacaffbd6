use std::fmt;
use std::sync::Arc;

use crate::gpu::{DeviceKernel, KernelFeatures};
use crate::{KernelFault, StateLayout, StateLayoutKind};

/// Opaque handle of a buffer allocated through [`DeviceQueue::alloc()`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(u32);

impl BufferHandle {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelArg {
    Buffer(BufferHandle),

    /// Absent optional buffer (e.g. no path-index array, meaning that the
    /// kernel runs densely over the first `work_size` states).
    Null,

    Int(i32),
}

/// Positional arguments of a kernel launch.
///
/// Each kernel expects a fixed sequence:
///
/// - init kernels: `[work_tiles, num_tiles, render_buffer, max_tile_work]`,
/// - intersect kernels: `[path_index?, work_size]`,
/// - shading kernels: `[path_index?, render_buffer, work_size]`,
/// - queued arrays: `[num_states, indices, num_indices, queued_kernel]`,
/// - terminated arrays: `[num_states, indices, num_indices, offset]`,
/// - compact arrays: `[num_states, indices, num_indices, num_active]`,
/// - compact states: `[indices, active_offset, terminated_offset, size]`,
/// - sorted array: `[num_states, limit, indices, num_indices, key_counter,
///   prefix_sum, queued_kernel]`,
/// - prefix sum: `[counter, prefix_sum, num_values]`,
/// - reset: `[num_states]`,
/// - possible splits: `[num_states, num_possible_splits]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KernelArgs {
    args: Vec<KernelArg>,
}

impl KernelArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(mut self, buffer: BufferHandle) -> Self {
        self.args.push(KernelArg::Buffer(buffer));
        self
    }

    pub fn opt_buffer(mut self, buffer: Option<BufferHandle>) -> Self {
        self.args.push(buffer.map_or(KernelArg::Null, KernelArg::Buffer));
        self
    }

    pub fn int(mut self, value: i32) -> Self {
        self.args.push(KernelArg::Int(value));
        self
    }

    /// Int argument holding a number of states or indices; those are bounded
    /// by the capacity, which always fits in an `i32`.
    pub fn count(self, value: u32) -> Self {
        self.int(value.min(i32::MAX as u32) as i32)
    }

    pub fn iter(&self) -> impl Iterator<Item = &KernelArg> + '_ {
        self.args.iter()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn get_buffer(&self, idx: usize) -> Result<BufferHandle, KernelFault> {
        match self.get_opt_buffer(idx)? {
            Some(buffer) => Ok(buffer),
            None => Err(KernelFault::new(format!(
                "argument #{idx} must not be null"
            ))),
        }
    }

    pub fn get_opt_buffer(
        &self,
        idx: usize,
    ) -> Result<Option<BufferHandle>, KernelFault> {
        match self.args.get(idx) {
            Some(KernelArg::Buffer(buffer)) => Ok(Some(*buffer)),
            Some(KernelArg::Null) => Ok(None),
            arg => Err(KernelFault::new(format!(
                "argument #{idx} should be a buffer, got {arg:?}"
            ))),
        }
    }

    pub fn get_int(&self, idx: usize) -> Result<i32, KernelFault> {
        match self.args.get(idx) {
            Some(KernelArg::Int(value)) => Ok(*value),
            arg => Err(KernelFault::new(format!(
                "argument #{idx} should be an int, got {arg:?}"
            ))),
        }
    }

    /// Like [`Self::get_int()`], but rejects negative values.
    pub fn get_count(&self, idx: usize) -> Result<u32, KernelFault> {
        let value = self.get_int(idx)?;

        u32::try_from(value).map_err(|_| {
            KernelFault::new(format!(
                "argument #{idx} should be non-negative, got {value}"
            ))
        })
    }
}

/// Everything kernels need to know about the path states, handed to the
/// device once per allocation.
#[derive(Clone, Debug)]
pub struct IntegratorState {
    pub layout: Arc<dyn StateLayout>,
    pub queue_counter: BufferHandle,
    pub next_shadow_path_index: BufferHandle,

    /// Allocator of shadow-catcher split states.
    pub next_main_path_index: BufferHandle,

    /// Per-kernel (shader, partition) counters for kernels that run in
    /// shader-sorted order; empty when sorting is disabled.
    pub sort_key_counters: Vec<(DeviceKernel, BufferHandle)>,

    pub sort_partition_divisor: u32,
    pub max_shaders: u32,
    pub features: KernelFeatures,
    pub seed: u32,
}

impl IntegratorState {
    pub fn capacity(&self) -> u32 {
        self.layout.capacity()
    }

    pub fn sort_key_counter(
        &self,
        kernel: DeviceKernel,
    ) -> Option<BufferHandle> {
        self.sort_key_counters
            .iter()
            .find(|(k, _)| *k == kernel)
            .map(|(_, buffer)| *buffer)
    }
}

/// Single in-order command stream of a compute device.
///
/// Kernel launches and buffer transfers execute in submission order; nothing
/// is guaranteed to have happened until [`Self::synchronize()`] returns.
pub trait DeviceQueue {
    fn alloc(&mut self, label: &str, size: usize) -> BufferHandle;

    fn free(&mut self, buffer: BufferHandle);

    /// Makes given integrator state available to subsequently launched
    /// kernels.
    fn init_execution(&mut self, state: &IntegratorState);

    fn enqueue(
        &mut self,
        kernel: DeviceKernel,
        work_size: u32,
        args: &KernelArgs,
    );

    fn copy_to_device(&mut self, buffer: BufferHandle, data: &[u8]);

    /// Reads buffer back to the host; blocks until all previously enqueued
    /// work is done.
    fn copy_from_device(&mut self, buffer: BufferHandle, data: &mut [u8]);

    fn zero_to_device(&mut self, buffer: BufferHandle);

    /// Waits for all enqueued work; returns `false` if the device failed at
    /// any point since the last [`Self::init_execution()`].
    fn synchronize(&mut self) -> bool;

    /// Number of path states this device can hold at once.
    fn num_concurrent_states(&self, state_size: usize) -> u32;

    /// Number of active path states below which the device is considered
    /// under-occupied.
    fn num_concurrent_busy_states(&self, state_size: usize) -> u32;

    /// Number of states per shader-sorting partition.
    fn num_sort_partition_elements(&self) -> u32 {
        65536
    }

    fn preferred_state_layout(&self) -> StateLayoutKind {
        StateLayoutKind::Soa
    }
}
