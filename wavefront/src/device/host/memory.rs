use std::mem;

use bytemuck::Pod;
use fxhash::FxHashMap;

use crate::{BufferHandle, KernelFault, Location};

/// Buffers of the host-emulated device.
///
/// Buffers are backed by words, so that every value of up to 4-byte
/// alignment can be viewed in-place.
#[derive(Debug, Default)]
pub struct HostMemory {
    buffers: FxHashMap<BufferHandle, HostBuffer>,
    next_id: u32,
}

#[derive(Debug)]
struct HostBuffer {
    label: String,
    len: usize,
    words: Vec<u32>,
}

impl HostMemory {
    pub fn alloc(&mut self, label: &str, size: usize) -> BufferHandle {
        let handle = BufferHandle::new(self.next_id);

        self.next_id += 1;

        self.buffers.insert(
            handle,
            HostBuffer {
                label: label.to_owned(),
                len: size,
                words: vec![0; (size + 3) / 4],
            },
        );

        handle
    }

    pub fn free(&mut self, buffer: BufferHandle) -> bool {
        self.buffers.remove(&buffer).is_some()
    }

    pub fn num_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn label(&self, buffer: BufferHandle) -> Option<&str> {
        self.buffers.get(&buffer).map(|buffer| buffer.label.as_str())
    }

    pub fn bytes(&self, buffer: BufferHandle) -> Result<&[u8], KernelFault> {
        let buffer = self.get(buffer)?;

        Ok(&bytemuck::cast_slice::<u32, u8>(&buffer.words)[..buffer.len])
    }

    pub fn bytes_mut(
        &mut self,
        buffer: BufferHandle,
    ) -> Result<&mut [u8], KernelFault> {
        let buffer = self.get_mut(buffer)?;

        Ok(&mut bytemuck::cast_slice_mut::<u32, u8>(&mut buffer.words)
            [..buffer.len])
    }

    pub fn slice<T>(&self, buffer: BufferHandle) -> Result<&[T], KernelFault>
    where
        T: Pod,
    {
        bytemuck::try_cast_slice(self.bytes(buffer)?).map_err(|err| {
            KernelFault::new(format!("can't view {buffer:?} as slice: {err}"))
        })
    }

    pub fn slice_mut<T>(
        &mut self,
        buffer: BufferHandle,
    ) -> Result<&mut [T], KernelFault>
    where
        T: Pod,
    {
        bytemuck::try_cast_slice_mut(self.bytes_mut(buffer)?).map_err(|err| {
            KernelFault::new(format!("can't view {buffer:?} as slice: {err}"))
        })
    }

    /// Reads value at given byte offset.
    pub fn read<T>(
        &self,
        buffer: BufferHandle,
        offset: usize,
    ) -> Result<T, KernelFault>
    where
        T: Pod,
    {
        self.bytes(buffer)?
            .get(offset..offset + mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .ok_or_else(|| Self::out_of_bounds(buffer, offset))
    }

    /// Writes value at given byte offset.
    pub fn write<T>(
        &mut self,
        buffer: BufferHandle,
        offset: usize,
        value: T,
    ) -> Result<(), KernelFault>
    where
        T: Pod,
    {
        self.bytes_mut(buffer)?
            .get_mut(offset..offset + mem::size_of::<T>())
            .ok_or_else(|| Self::out_of_bounds(buffer, offset))?
            .copy_from_slice(bytemuck::bytes_of(&value));

        Ok(())
    }

    /// Reads `idx`-th element of an array of `T`.
    pub fn read_at<T>(
        &self,
        buffer: BufferHandle,
        idx: u32,
    ) -> Result<T, KernelFault>
    where
        T: Pod,
    {
        self.read(buffer, idx as usize * mem::size_of::<T>())
    }

    /// Writes `idx`-th element of an array of `T`.
    pub fn write_at<T>(
        &mut self,
        buffer: BufferHandle,
        idx: u32,
        value: T,
    ) -> Result<(), KernelFault>
    where
        T: Pod,
    {
        self.write(buffer, idx as usize * mem::size_of::<T>(), value)
    }

    /// Copies `size` bytes between two (possibly the same) buffers.
    pub fn copy(
        &mut self,
        src: Location,
        dst: Location,
        size: usize,
    ) -> Result<(), KernelFault> {
        let data = self
            .bytes(src.buffer)?
            .get(src.offset..src.offset + size)
            .ok_or_else(|| Self::out_of_bounds(src.buffer, src.offset))?
            .to_vec();

        self.bytes_mut(dst.buffer)?
            .get_mut(dst.offset..dst.offset + size)
            .ok_or_else(|| Self::out_of_bounds(dst.buffer, dst.offset))?
            .copy_from_slice(&data);

        Ok(())
    }

    fn get(&self, buffer: BufferHandle) -> Result<&HostBuffer, KernelFault> {
        self.buffers
            .get(&buffer)
            .ok_or_else(|| Self::unknown(buffer))
    }

    fn get_mut(
        &mut self,
        buffer: BufferHandle,
    ) -> Result<&mut HostBuffer, KernelFault> {
        self.buffers
            .get_mut(&buffer)
            .ok_or_else(|| Self::unknown(buffer))
    }

    fn unknown(buffer: BufferHandle) -> KernelFault {
        KernelFault::new(format!("{buffer:?} is not allocated"))
    }

    fn out_of_bounds(buffer: BufferHandle, offset: usize) -> KernelFault {
        KernelFault::new(format!(
            "access at offset {offset} is out of bounds of {buffer:?}"
        ))
    }
}
