use fxhash::FxHashMap;

use crate::gpu::DeviceKernel;

/// Summary of a [`crate::WavefrontScheduler::render_samples()`] call.
#[derive(Clone, Debug, Default)]
pub struct RenderStatistics {
    /// Average fraction of path states that were busy per iteration.
    pub occupancy: f32,

    pub iterations: u32,

    /// Number of launches per integrator kernel.
    pub kernel_launches: FxHashMap<DeviceKernel, u32>,
}

impl RenderStatistics {
    pub(crate) fn record_launch(&mut self, kernel: DeviceKernel) {
        *self.kernel_launches.entry(kernel).or_default() += 1;
    }

    pub fn launches(&self, kernel: DeviceKernel) -> u32 {
        self.kernel_launches.get(&kernel).copied().unwrap_or_default()
    }
}
