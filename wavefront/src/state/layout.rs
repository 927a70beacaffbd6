use std::fmt;

use crate::gpu::{KernelFeatures, StateField, SCHEMA};
use crate::BufferHandle;

/// Physical arrangement of path states in device memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateLayoutKind {
    /// Each field lives in its own array, indexed by path; suits
    /// throughput-oriented devices, since neighbouring work items then touch
    /// neighbouring memory.
    Soa,

    /// Fields of a single state are interleaved into one record; suits
    /// latency-oriented devices.
    Aos,
}

/// Where a single value of a field lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    pub buffer: BufferHandle,

    /// In bytes, from the beginning of the buffer.
    pub offset: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutBuffer {
    pub label: String,
    pub handle: BufferHandle,
    pub size: usize,
}

/// Maps (field, index, slot) into device memory.
///
/// Everything above this trait (scheduler, kernels) addresses path states
/// only through [`Self::locate()`], so it doesn't care which layout is in use.
pub trait StateLayout: fmt::Debug + Send + Sync {
    fn kind(&self) -> StateLayoutKind;

    /// Number of states in each index space (main and shadow).
    fn capacity(&self) -> u32;

    fn features(&self) -> KernelFeatures;

    fn volume_stack_size(&self) -> u32;

    /// Buffers backing this layout, in binding order.
    fn buffers(&self) -> &[LayoutBuffer];

    /// Returns `None` if the field is not allocated or if the index or slot
    /// is out of bounds.
    fn locate(
        &self,
        field: StateField,
        index: u32,
        slot: u32,
    ) -> Option<Location>;

    fn contains(&self, field: StateField) -> bool {
        field.desc().is_enabled(self.features())
    }

    fn slots(&self, field: StateField) -> u32 {
        field.desc().slots.count(self.volume_stack_size())
    }
}

/// Size of a single path state (main and shadow part together), in bytes.
pub fn estimate_state_size(
    features: KernelFeatures,
    volume_stack_size: u32,
) -> usize {
    SCHEMA
        .iter()
        .filter(|desc| desc.is_enabled(features))
        .map(|desc| desc.state_size(volume_stack_size))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{PATH_FLAG, SHADOW_ISECT, VOLUME_STACK};

    #[test]
    fn state_size_grows_with_features() {
        let base = estimate_state_size(KernelFeatures::empty(), 4);
        let volume = estimate_state_size(KernelFeatures::VOLUME, 4);

        // volume bounce counter + four stack entries
        assert_eq!(base + 4 + 4 * 8, volume);

        let shadows =
            estimate_state_size(KernelFeatures::TRANSPARENT_SHADOWS, 4);

        assert_eq!(base + 4 * 16, shadows);

        assert_eq!(
            base,
            estimate_state_size(KernelFeatures::empty(), 100),
            "volume stack depth matters only with volumes enabled"
        );
    }

    #[test]
    fn schema_sizes_are_word_aligned() {
        for desc in SCHEMA {
            assert_eq!(0, desc.size % 4, "{}", desc.name);
        }

        assert_eq!(4, PATH_FLAG.id().desc().size);
        assert_eq!(16, SHADOW_ISECT.id().desc().size);
        assert_eq!(8, VOLUME_STACK.id().desc().size);
    }
}
