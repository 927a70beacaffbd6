use crate::gpu::{KernelFeatures, StateField, SCHEMA};
use crate::{
    DeviceQueue, LayoutBuffer, Location, StateLayout, StateLayoutKind,
};

const MAIN: usize = 0;
const SHADOW: usize = 1;

/// Array-of-structures layout: each index space is a single buffer of
/// fixed-size records, one per state.
#[derive(Debug)]
pub struct AosLayout {
    capacity: u32,
    features: KernelFeatures,
    volume_stack_size: u32,
    buffers: Vec<LayoutBuffer>,

    /// Size of a record, per index space.
    strides: [usize; 2],

    /// (index space, offset within record), per [`StateField`].
    fields: Vec<Option<(usize, usize)>>,
}

impl AosLayout {
    pub fn allocate(
        queue: &mut (impl DeviceQueue + ?Sized),
        capacity: u32,
        features: KernelFeatures,
        volume_stack_size: u32,
    ) -> Self {
        let mut strides = [0; 2];
        let mut fields = Vec::with_capacity(SCHEMA.len());

        for desc in SCHEMA {
            let size = desc.state_size(volume_stack_size);

            if !desc.is_enabled(features) || size == 0 {
                fields.push(None);
                continue;
            }

            let space = if desc.group.is_shadow() { SHADOW } else { MAIN };

            fields.push(Some((space, strides[space])));
            strides[space] += size;
        }

        let buffers = [("main", MAIN), ("shadow", SHADOW)]
            .into_iter()
            .map(|(name, space)| {
                let label = format!("wavefront_state_{name}");
                let size = strides[space] * capacity as usize;
                let handle = queue.alloc(&label, size);

                queue.zero_to_device(handle);

                LayoutBuffer {
                    label,
                    handle,
                    size,
                }
            })
            .collect();

        Self {
            capacity,
            features,
            volume_stack_size,
            buffers,
            strides,
            fields,
        }
    }

    /// Size of a single record of given index space, in bytes.
    pub fn stride(&self, shadow: bool) -> usize {
        self.strides[if shadow { SHADOW } else { MAIN }]
    }
}

impl StateLayout for AosLayout {
    fn kind(&self) -> StateLayoutKind {
        StateLayoutKind::Aos
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn features(&self) -> KernelFeatures {
        self.features
    }

    fn volume_stack_size(&self) -> u32 {
        self.volume_stack_size
    }

    fn buffers(&self) -> &[LayoutBuffer] {
        &self.buffers
    }

    fn locate(
        &self,
        field: StateField,
        index: u32,
        slot: u32,
    ) -> Option<Location> {
        let (space, offset) = self.fields[field as usize]?;

        if index >= self.capacity || slot >= self.slots(field) {
            return None;
        }

        Some(Location {
            buffer: self.buffers[space].handle,
            offset: index as usize * self.strides[space]
                + offset
                + slot as usize * field.desc().size,
        })
    }
}
