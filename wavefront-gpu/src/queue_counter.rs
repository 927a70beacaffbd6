use bytemuck::{Pod, Zeroable};

use crate::{DeviceKernel, INTEGRATOR_KERNEL_COUNT};

/// Number of path states currently waiting for each integrator kernel.
///
/// Kernels update these counters atomically whenever they hand a state over
/// to another kernel; the host reads them back to decide what to run next.
/// Counters are signed so that an accounting bug shows up as a negative value
/// instead of wrapping around.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct QueueCounter {
    pub num_queued: [i32; INTEGRATOR_KERNEL_COUNT],
}

impl QueueCounter {
    pub fn get(&self, kernel: DeviceKernel) -> i32 {
        self.num_queued[kernel as usize]
    }

    pub fn set(&mut self, kernel: DeviceKernel, value: i32) {
        self.num_queued[kernel as usize] = value;
    }

    /// Byte offset of the counter for given kernel, for kernels that update
    /// it in-place.
    pub fn offset_of(kernel: DeviceKernel) -> usize {
        debug_assert!(kernel.is_integrator());

        (kernel as usize) * core::mem::size_of::<i32>()
    }

    /// Number of main (i.e. non-shadow) paths in flight.
    pub fn num_main_paths(&self) -> i64 {
        self.sum(|kernel| !kernel.is_shadow_path())
    }

    /// Number of shadow paths in flight.
    pub fn num_shadow_paths(&self) -> i64 {
        self.sum(DeviceKernel::is_shadow_path)
    }

    pub fn is_empty(&self) -> bool {
        self.num_queued.iter().all(|&count| count == 0)
    }

    fn sum(&self, filter: impl Fn(DeviceKernel) -> bool) -> i64 {
        DeviceKernel::INTEGRATOR
            .into_iter()
            .filter(|&kernel| filter(kernel))
            .map(|kernel| self.get(kernel) as i64)
            .sum()
    }
}
