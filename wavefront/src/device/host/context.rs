use std::sync::Arc;

use bytemuck::Pod;

use crate::gpu::{
    DeviceKernel, Field, IndexSpace, MainPathIndex, PathFlags, PathIndex,
    QueueCounter, ShadowPathIndex, SplitPathIndex, StateField, StateGroup,
    StateIndex, PATH_FLAG, PATH_QUEUED_KERNEL, PATH_SHADER_SORT_KEY, SCHEMA,
    SHADOW_PATH_QUEUED_KERNEL,
};
use crate::{
    BufferHandle, HostMemory, IntegratorState, KernelFault, Location,
    StateLayout,
};

/// View of the device that kernels running on the host get.
///
/// Besides typed access to path-state fields, it provides the state
/// transitions kernels use to hand states over to each other; these keep
/// the queue counters in sync with the states' `queued_kernel` fields, so
/// kernels should never write those fields directly.
pub struct KernelContext<'a> {
    memory: &'a mut HostMemory,
    state: &'a IntegratorState,
    render_buffer: Option<BufferHandle>,
}

impl<'a> KernelContext<'a> {
    pub(crate) fn new(
        memory: &'a mut HostMemory,
        state: &'a IntegratorState,
        render_buffer: Option<BufferHandle>,
    ) -> Self {
        Self {
            memory,
            state,
            render_buffer,
        }
    }

    pub fn state(&self) -> &IntegratorState {
        self.state
    }

    pub fn capacity(&self) -> u32 {
        self.state.capacity()
    }

    pub fn memory(&self) -> &HostMemory {
        self.memory
    }

    pub fn memory_mut(&mut self) -> &mut HostMemory {
        self.memory
    }

    pub fn read<T, S>(
        &self,
        field: Field<T, S>,
        index: StateIndex<S>,
    ) -> Result<T, KernelFault>
    where
        T: Pod,
        S: IndexSpace,
    {
        self.read_slot(field, index, 0)
    }

    pub fn read_slot<T, S>(
        &self,
        field: Field<T, S>,
        index: StateIndex<S>,
        slot: u32,
    ) -> Result<T, KernelFault>
    where
        T: Pod,
        S: IndexSpace,
    {
        let loc = self.locate(field, index, slot)?;

        self.memory.read(loc.buffer, loc.offset)
    }

    pub fn write<T, S>(
        &mut self,
        field: Field<T, S>,
        index: StateIndex<S>,
        value: T,
    ) -> Result<(), KernelFault>
    where
        T: Pod,
        S: IndexSpace,
    {
        self.write_slot(field, index, 0, value)
    }

    pub fn write_slot<T, S>(
        &mut self,
        field: Field<T, S>,
        index: StateIndex<S>,
        slot: u32,
        value: T,
    ) -> Result<(), KernelFault>
    where
        T: Pod,
        S: IndexSpace,
    {
        let loc = self.locate(field, index, slot)?;

        self.memory.write(loc.buffer, loc.offset, value)
    }

    /// Kernel given state is waiting for, if any.
    pub fn queued_kernel(
        &self,
        path: PathIndex,
    ) -> Result<Option<DeviceKernel>, KernelFault> {
        Ok(DeviceKernel::from_queued(self.queued_raw(path)?))
    }

    pub fn path_flags(
        &self,
        path: MainPathIndex,
    ) -> Result<PathFlags, KernelFault> {
        Ok(PathFlags::from_bits_retain(self.read(PATH_FLAG, path)?))
    }

    pub fn set_path_flags(
        &mut self,
        path: MainPathIndex,
        flags: PathFlags,
    ) -> Result<(), KernelFault> {
        self.write(PATH_FLAG, path, flags.bits())
    }

    /// Queues a free main state for `next`.
    pub fn path_init(
        &mut self,
        path: MainPathIndex,
        next: DeviceKernel,
    ) -> Result<(), KernelFault> {
        Self::ensure_kernel(next, false)?;

        let current = self.read(PATH_QUEUED_KERNEL, path)?;

        if current != 0 {
            return Err(KernelFault::new(format!(
                "{path:?} is already queued (for #{current})"
            )));
        }

        self.write(PATH_QUEUED_KERNEL, path, next.queued())?;
        self.add_queued(next, 1)
    }

    /// Like [`Self::path_init()`], but makes `next` run it in shader-sorted
    /// order.
    pub fn path_init_sorted(
        &mut self,
        path: MainPathIndex,
        next: DeviceKernel,
        shader: u32,
    ) -> Result<(), KernelFault> {
        self.path_init(path, next)?;
        self.sort_key(path, next, shader)
    }

    /// Hands a main state over from `current` to `next`.
    pub fn path_next(
        &mut self,
        path: MainPathIndex,
        current: DeviceKernel,
        next: DeviceKernel,
    ) -> Result<(), KernelFault> {
        Self::ensure_kernel(next, false)?;
        self.ensure_owner(path.into(), current)?;
        self.write(PATH_QUEUED_KERNEL, path, next.queued())?;
        self.add_queued(current, -1)?;
        self.add_queued(next, 1)
    }

    pub fn path_next_sorted(
        &mut self,
        path: MainPathIndex,
        current: DeviceKernel,
        next: DeviceKernel,
        shader: u32,
    ) -> Result<(), KernelFault> {
        self.path_next(path, current, next)?;
        self.sort_key(path, next, shader)
    }

    /// Frees a main state owned by `current`.
    pub fn path_terminate(
        &mut self,
        path: MainPathIndex,
        current: DeviceKernel,
    ) -> Result<(), KernelFault> {
        self.ensure_owner(path.into(), current)?;
        self.write(PATH_QUEUED_KERNEL, path, 0)?;
        self.add_queued(current, -1)
    }

    /// Claims the next shadow state and queues it for `next`; the caller
    /// is responsible for filling the rest of its fields.
    pub fn shadow_path_init(
        &mut self,
        next: DeviceKernel,
    ) -> Result<ShadowPathIndex, KernelFault> {
        Self::ensure_kernel(next, true)?;

        let index = self.claim(self.state.next_shadow_path_index, "shadow")?;
        let path = ShadowPathIndex::new(index);

        if self.read(SHADOW_PATH_QUEUED_KERNEL, path)? != 0 {
            return Err(KernelFault::new(format!(
                "{path:?} is still in use"
            )));
        }

        self.write(SHADOW_PATH_QUEUED_KERNEL, path, next.queued())?;
        self.add_queued(next, 1)?;

        Ok(path)
    }

    pub fn shadow_path_next(
        &mut self,
        path: ShadowPathIndex,
        current: DeviceKernel,
        next: DeviceKernel,
    ) -> Result<(), KernelFault> {
        Self::ensure_kernel(next, true)?;
        self.ensure_owner(path.into(), current)?;
        self.write(SHADOW_PATH_QUEUED_KERNEL, path, next.queued())?;
        self.add_queued(current, -1)?;
        self.add_queued(next, 1)
    }

    pub fn shadow_path_terminate(
        &mut self,
        path: ShadowPathIndex,
        current: DeviceKernel,
    ) -> Result<(), KernelFault> {
        self.ensure_owner(path.into(), current)?;
        self.write(SHADOW_PATH_QUEUED_KERNEL, path, 0)?;
        self.add_queued(current, -1)
    }

    /// Splits a path that hit a shadow catcher.
    ///
    /// The parent gets marked as having hit the catcher and continues as it
    /// was; the returned state is a copy of the parent's main fields, marked
    /// as rendering the catcher pass, and must be queued through
    /// [`Self::split_path_init()`].
    pub fn split_path(
        &mut self,
        path: MainPathIndex,
    ) -> Result<SplitPathIndex, KernelFault> {
        let flags = self.path_flags(path)?;

        if !flags.can_split() {
            return Err(KernelFault::new(format!("{path:?} can't split")));
        }

        let index = self.claim(self.state.next_main_path_index, "split")?;

        if self.read(PATH_QUEUED_KERNEL, MainPathIndex::new(index))? != 0 {
            return Err(KernelFault::new(format!(
                "split state #{index} overlaps a live state"
            )));
        }

        self.set_path_flags(path, flags | PathFlags::SHADOW_CATCHER_HIT)?;
        self.copy_state(path.get(), index, StateGroup::is_copied_on_split)?;

        let split = MainPathIndex::new(index);

        self.write(PATH_QUEUED_KERNEL, split, 0)?;

        self.set_path_flags(
            split,
            flags
                | PathFlags::SHADOW_CATCHER_HIT
                | PathFlags::SHADOW_CATCHER_PASS,
        )?;

        Ok(SplitPathIndex::new(index))
    }

    pub fn split_path_init(
        &mut self,
        split: SplitPathIndex,
        next: DeviceKernel,
    ) -> Result<MainPathIndex, KernelFault> {
        let path = split.into_main();

        self.path_init(path, next)?;

        Ok(path)
    }

    /// Render buffer passed to the current shading kernel.
    pub fn render_buffer<T>(&mut self) -> Result<&mut [T], KernelFault>
    where
        T: Pod,
    {
        let buffer = self.render_buffer.ok_or_else(|| {
            KernelFault::new("kernel didn't receive a render buffer")
        })?;

        self.memory.slice_mut(buffer)
    }

    pub(crate) fn queued_raw(
        &self,
        path: PathIndex,
    ) -> Result<u32, KernelFault> {
        match path {
            PathIndex::Main(path) => self.read(PATH_QUEUED_KERNEL, path),
            PathIndex::Shadow(path) => {
                self.read(SHADOW_PATH_QUEUED_KERNEL, path)
            }
        }
    }

    pub(crate) fn clear_queued(
        &mut self,
        path: PathIndex,
    ) -> Result<(), KernelFault> {
        match path {
            PathIndex::Main(path) => self.write(PATH_QUEUED_KERNEL, path, 0),
            PathIndex::Shadow(path) => {
                self.write(SHADOW_PATH_QUEUED_KERNEL, path, 0)
            }
        }
    }

    /// Copies every allocated field of groups matching `groups` from one
    /// state into another.
    pub(crate) fn copy_state(
        &mut self,
        from: u32,
        to: u32,
        groups: impl Fn(StateGroup) -> bool,
    ) -> Result<(), KernelFault> {
        let layout = &self.state.layout;

        for desc in SCHEMA {
            if !groups(desc.group) || !layout.contains(desc.field) {
                continue;
            }

            for slot in 0..layout.slots(desc.field) {
                let src = Self::locate_raw(layout, desc.field, from, slot)?;
                let dst = Self::locate_raw(layout, desc.field, to, slot)?;

                self.memory.copy(src, dst, desc.size)?;
            }
        }

        Ok(())
    }

    fn locate<T, S>(
        &self,
        field: Field<T, S>,
        index: StateIndex<S>,
        slot: u32,
    ) -> Result<Location, KernelFault>
    where
        S: IndexSpace,
    {
        Self::locate_raw(&self.state.layout, field.id(), index.get(), slot)
    }

    fn locate_raw(
        layout: &Arc<dyn StateLayout>,
        field: StateField,
        index: u32,
        slot: u32,
    ) -> Result<Location, KernelFault> {
        layout.locate(field, index, slot).ok_or_else(|| {
            KernelFault::new(format!(
                "`{}` has no slot #{slot} for state #{index}",
                field.desc().name
            ))
        })
    }

    fn ensure_kernel(
        kernel: DeviceKernel,
        shadow: bool,
    ) -> Result<(), KernelFault> {
        if kernel.is_integrator()
            && !kernel.is_init()
            && kernel.is_shadow_path() == shadow
        {
            Ok(())
        } else {
            Err(KernelFault::new(format!(
                "states can't be queued for `{kernel}` here"
            )))
        }
    }

    fn ensure_owner(
        &self,
        path: PathIndex,
        kernel: DeviceKernel,
    ) -> Result<(), KernelFault> {
        let queued = self.queued_raw(path)?;

        if queued == kernel as u32 {
            Ok(())
        } else {
            Err(KernelFault::new(format!(
                "{path:?} is owned by #{queued}, not by `{kernel}`"
            )))
        }
    }

    fn add_queued(
        &mut self,
        kernel: DeviceKernel,
        delta: i32,
    ) -> Result<(), KernelFault> {
        let buffer = self.state.queue_counter;
        let offset = QueueCounter::offset_of(kernel);
        let count: i32 = self.memory.read(buffer, offset)?;

        self.memory.write(buffer, offset, count + delta)
    }

    /// Bumps an index allocator, failing once it runs past the capacity.
    fn claim(
        &mut self,
        allocator: BufferHandle,
        what: &str,
    ) -> Result<u32, KernelFault> {
        let index: u32 = self.memory.read(allocator, 0)?;

        if index >= self.capacity() {
            return Err(KernelFault::new(format!(
                "{what} state #{index} exceeds capacity of {}",
                self.capacity()
            )));
        }

        self.memory.write(allocator, 0, index + 1)?;

        Ok(index)
    }

    fn sort_key(
        &mut self,
        path: MainPathIndex,
        kernel: DeviceKernel,
        shader: u32,
    ) -> Result<(), KernelFault> {
        let max_shaders = self.state.max_shaders;

        if shader >= max_shaders {
            return Err(KernelFault::new(format!(
                "shader #{shader} is out of range (max_shaders={max_shaders})"
            )));
        }

        let partition = path.get() / self.state.sort_partition_divisor.max(1);
        let key = shader + max_shaders * partition;

        self.write(PATH_SHADER_SORT_KEY, path, key)?;

        if let Some(counter) = self.state.sort_key_counter(kernel) {
            let count: u32 = self.memory.read_at(counter, key)?;

            self.memory.write_at(counter, key, count + 1)?;
        }

        Ok(())
    }
}
