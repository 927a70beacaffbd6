mod context;
mod integrator;
mod kernels;
mod memory;

use derivative::Derivative;

pub use self::context::*;
pub use self::integrator::*;
pub use self::memory::*;
use crate::gpu::{DeviceKernel, PathIndex};
use crate::{
    BufferHandle, DeviceQueue, IntegratorState, KernelArgs, KernelFault,
    StateLayoutKind,
};

/// Device that executes kernels right away, on the calling thread.
///
/// It's the reference implementation of the device-side half of the
/// scheduling protocol: bookkeeping kernels are built-in, while integrator
/// kernels are provided by the caller through [`IntegratorKernels`].
///
/// The first kernel fault stops the device: all later launches are skipped
/// and [`DeviceQueue::synchronize()`] reports failure until the next
/// [`DeviceQueue::init_execution()`].
#[derive(Derivative)]
#[derivative(Debug)]
pub struct HostQueue<K> {
    #[derivative(Debug = "ignore")]
    kernels: K,
    memory: HostMemory,
    state: Option<IntegratorState>,
    max_states: Option<u32>,
    busy_states: Option<u32>,
    memory_budget: usize,
    sort_partition_elements: u32,
    layout: StateLayoutKind,
    fault: Option<KernelFault>,
    trace: Option<Vec<Dispatch>>,
}

/// Integrator kernel launch, as recorded by [`HostQueue`]'s trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dispatch {
    pub kernel: DeviceKernel,

    /// States the kernel actually ran for.
    pub states: Vec<PathIndex>,
}

impl<K> HostQueue<K>
where
    K: IntegratorKernels,
{
    pub fn builder(kernels: K) -> HostQueueBuilder<K> {
        HostQueueBuilder {
            kernels,
            max_states: None,
            busy_states: None,
            memory_budget: 256 * 1024 * 1024,
            sort_partition_elements: 65536,
            layout: StateLayoutKind::Soa,
            trace: false,
        }
    }

    pub fn kernels(&self) -> &K {
        &self.kernels
    }

    pub fn kernels_mut(&mut self) -> &mut K {
        &mut self.kernels
    }

    pub fn memory(&self) -> &HostMemory {
        &self.memory
    }

    pub fn into_memory(self) -> HostMemory {
        self.memory
    }

    pub fn num_buffers(&self) -> usize {
        self.memory.num_buffers()
    }

    pub fn fault(&self) -> Option<&KernelFault> {
        self.fault.as_ref()
    }

    /// Runs `f` as if it was a kernel; mostly useful for preparing and
    /// inspecting states in tests.
    pub fn with_context<R>(
        &mut self,
        f: impl FnOnce(&mut KernelContext<'_>) -> Result<R, KernelFault>,
    ) -> Result<R, KernelFault> {
        let state = self.state.as_ref().ok_or_else(|| {
            KernelFault::new("device has no integrator state yet")
        })?;

        f(&mut KernelContext::new(&mut self.memory, state, None))
    }

    /// Returns launches recorded since the last call; empty if tracing is
    /// disabled.
    pub fn take_trace(&mut self) -> Vec<Dispatch> {
        self.trace.as_mut().map(std::mem::take).unwrap_or_default()
    }

    fn run(
        &mut self,
        kernel: DeviceKernel,
        work_size: u32,
        args: &KernelArgs,
    ) -> Result<(), KernelFault> {
        let Self {
            kernels,
            memory,
            state,
            trace,
            ..
        } = self;

        let state = state.as_ref().ok_or_else(|| {
            KernelFault::new("device has no integrator state yet")
        })?;

        if kernel.is_init() {
            let render_buffer = args.get_opt_buffer(2)?;
            let mut ctx = KernelContext::new(memory, state, render_buffer);

            integrator::init_paths(
                kernels,
                &mut ctx,
                kernel,
                work_size,
                args,
                trace.as_mut(),
            )
        } else if kernel.is_integrator() {
            integrator::run_kernel(
                kernels,
                memory,
                state,
                kernel,
                work_size,
                args,
                trace.as_mut(),
            )
        } else {
            let mut ctx = KernelContext::new(memory, state, None);

            kernels::run_kernel(&mut ctx, kernel, work_size, args)
        }
    }

    fn fail(&mut self, fault: KernelFault) {
        if self.fault.is_none() {
            log::error!("Host device failed: {fault}");

            self.fault = Some(fault);
        }
    }
}

impl<K> DeviceQueue for HostQueue<K>
where
    K: IntegratorKernels,
{
    fn alloc(&mut self, label: &str, size: usize) -> BufferHandle {
        self.memory.alloc(label, size)
    }

    fn free(&mut self, buffer: BufferHandle) {
        if !self.memory.free(buffer) {
            log::warn!("Tried to free unknown {buffer:?}");
        }
    }

    fn init_execution(&mut self, state: &IntegratorState) {
        self.state = Some(state.clone());
        self.fault = None;
    }

    fn enqueue(
        &mut self,
        kernel: DeviceKernel,
        work_size: u32,
        args: &KernelArgs,
    ) {
        if self.fault.is_some() {
            return;
        }

        if let Err(err) = self.run(kernel, work_size, args) {
            self.fail(KernelFault::new(format!("`{kernel}`: {err}")));
        }
    }

    fn copy_to_device(&mut self, buffer: BufferHandle, data: &[u8]) {
        let result = self.memory.bytes_mut(buffer).and_then(|bytes| {
            bytes
                .get_mut(..data.len())
                .ok_or_else(|| {
                    KernelFault::new(format!("{buffer:?} is too small"))
                })
                .map(|bytes| bytes.copy_from_slice(data))
        });

        if let Err(err) = result {
            self.fail(err);
        }
    }

    fn copy_from_device(&mut self, buffer: BufferHandle, data: &mut [u8]) {
        let result = self.memory.bytes(buffer).and_then(|bytes| {
            bytes
                .get(..data.len())
                .ok_or_else(|| {
                    KernelFault::new(format!("{buffer:?} is too small"))
                })
                .map(|bytes| data.copy_from_slice(bytes))
        });

        if let Err(err) = result {
            self.fail(err);
        }
    }

    fn zero_to_device(&mut self, buffer: BufferHandle) {
        match self.memory.bytes_mut(buffer) {
            Ok(bytes) => bytes.fill(0),
            Err(err) => self.fail(err),
        }
    }

    fn synchronize(&mut self) -> bool {
        self.fault.is_none()
    }

    fn num_concurrent_states(&self, state_size: usize) -> u32 {
        self.max_states.unwrap_or_else(|| {
            (self.memory_budget / state_size.max(1)).min(1 << 20) as u32
        })
    }

    fn num_concurrent_busy_states(&self, state_size: usize) -> u32 {
        self.busy_states
            .unwrap_or_else(|| self.num_concurrent_states(state_size) / 4)
    }

    fn num_sort_partition_elements(&self) -> u32 {
        self.sort_partition_elements
    }

    fn preferred_state_layout(&self) -> StateLayoutKind {
        self.layout
    }
}

pub struct HostQueueBuilder<K> {
    kernels: K,
    max_states: Option<u32>,
    busy_states: Option<u32>,
    memory_budget: usize,
    sort_partition_elements: u32,
    layout: StateLayoutKind,
    trace: bool,
}

impl<K> HostQueueBuilder<K>
where
    K: IntegratorKernels,
{
    /// Overrides the number of path states, which is otherwise derived from
    /// the memory budget.
    pub fn with_capacity(mut self, max_states: u32) -> Self {
        self.max_states = Some(max_states);
        self
    }

    pub fn with_busy_states(mut self, busy_states: u32) -> Self {
        self.busy_states = Some(busy_states);
        self
    }

    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = bytes;
        self
    }

    pub fn with_sort_partition_elements(mut self, elements: u32) -> Self {
        self.sort_partition_elements = elements;
        self
    }

    pub fn with_layout(mut self, layout: StateLayoutKind) -> Self {
        self.layout = layout;
        self
    }

    /// Records every integrator kernel launch; see
    /// [`HostQueue::take_trace()`].
    pub fn with_trace(mut self) -> Self {
        self.trace = true;
        self
    }

    pub fn build(self) -> HostQueue<K> {
        HostQueue {
            kernels: self.kernels,
            memory: Default::default(),
            state: None,
            max_states: self.max_states,
            busy_states: self.busy_states,
            memory_budget: self.memory_budget,
            sort_partition_elements: self.sort_partition_elements,
            layout: self.layout,
            fault: None,
            trace: self.trace.then(Vec::new),
        }
    }
}
