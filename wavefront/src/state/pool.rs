use std::sync::Arc;

use crate::gpu::KernelFeatures;
use crate::{
    estimate_state_size, AosLayout, DeviceQueue, SoaLayout, StateLayout,
    StateLayoutKind,
};

/// Device storage of all path states, main and shadow.
#[derive(Debug)]
pub struct PathStatePool {
    layout: Arc<dyn StateLayout>,
}

impl PathStatePool {
    pub fn allocate(
        queue: &mut (impl DeviceQueue + ?Sized),
        kind: StateLayoutKind,
        capacity: u32,
        features: KernelFeatures,
        volume_stack_size: u32,
    ) -> Self {
        log::info!(
            "Allocating path states; layout={kind:?}, capacity={capacity}, \
             state_size={}, features={features:?}",
            estimate_state_size(features, volume_stack_size),
        );

        let layout: Arc<dyn StateLayout> = match kind {
            StateLayoutKind::Soa => Arc::new(SoaLayout::allocate(
                queue,
                capacity,
                features,
                volume_stack_size,
            )),

            StateLayoutKind::Aos => Arc::new(AosLayout::allocate(
                queue,
                capacity,
                features,
                volume_stack_size,
            )),
        };

        Self { layout }
    }

    pub fn layout(&self) -> &Arc<dyn StateLayout> {
        &self.layout
    }

    pub fn capacity(&self) -> u32 {
        self.layout.capacity()
    }

    /// Whether this pool already holds every field given scene needs.
    pub fn covers(
        &self,
        features: KernelFeatures,
        volume_stack_size: u32,
    ) -> bool {
        let allocated = self.layout.features();

        allocated.contains(features)
            && (!features.contains(KernelFeatures::VOLUME)
                || self.layout.volume_stack_size() >= volume_stack_size)
    }

    pub fn free(self, queue: &mut (impl DeviceQueue + ?Sized)) {
        for buffer in self.layout.buffers() {
            queue.free(buffer.handle);
        }
    }
}
