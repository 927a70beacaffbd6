use std::ops::{Deref, DerefMut};
use std::{any, mem};

use bytemuck::Pod;

use crate::{BufferHandle, DeviceQueue};

/// Array that exists both on the host machine and on the device.
///
/// The two copies are synchronized only explicitly, through
/// [`Self::copy_to_device()`] and [`Self::copy_from_device()`].
#[derive(Debug)]
pub struct DeviceVector<T> {
    label: String,
    buffer: BufferHandle,
    data: Vec<T>,
}

impl<T> DeviceVector<T>
where
    T: Pod,
{
    pub fn new(
        queue: &mut (impl DeviceQueue + ?Sized),
        label: impl AsRef<str>,
        len: usize,
    ) -> Self {
        let label = label.as_ref();

        log::debug!(
            "Allocating device vector `{label}`; ty={}, len={len}",
            any::type_name::<T>(),
        );

        let buffer = queue.alloc(label, Self::size_of(len));

        Self {
            label: label.to_owned(),
            buffer,
            data: vec![T::zeroed(); len],
        }
    }

    pub fn handle(&self) -> BufferHandle {
        self.buffer
    }

    pub fn copy_to_device(&self, queue: &mut (impl DeviceQueue + ?Sized)) {
        queue.copy_to_device(self.buffer, bytemuck::cast_slice(&self.data));
    }

    pub fn copy_from_device(
        &mut self,
        queue: &mut (impl DeviceQueue + ?Sized),
    ) {
        queue.copy_from_device(
            self.buffer,
            bytemuck::cast_slice_mut(&mut self.data),
        );
    }

    /// Zeroes the device copy; the host copy stays as it is.
    pub fn zero_to_device(&self, queue: &mut (impl DeviceQueue + ?Sized)) {
        queue.zero_to_device(self.buffer);
    }

    /// Re-allocates both copies if the length changes; contents are zeroed
    /// then.
    pub fn resize(
        &mut self,
        queue: &mut (impl DeviceQueue + ?Sized),
        len: usize,
    ) {
        if self.data.len() == len {
            return;
        }

        log::debug!(
            "Resizing device vector `{}`; len={} -> {len}",
            self.label,
            self.data.len(),
        );

        queue.free(self.buffer);

        self.buffer = queue.alloc(&self.label, Self::size_of(len));
        self.data = vec![T::zeroed(); len];
    }

    pub fn free(self, queue: &mut (impl DeviceQueue + ?Sized)) {
        queue.free(self.buffer);
    }

    fn size_of(len: usize) -> usize {
        len * mem::size_of::<T>()
    }
}

impl<T> Deref for DeviceVector<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl<T> DerefMut for DeviceVector<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}
