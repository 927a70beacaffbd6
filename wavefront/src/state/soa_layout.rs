use crate::gpu::{KernelFeatures, StateField, SCHEMA};
use crate::{
    DeviceQueue, LayoutBuffer, Location, StateLayout, StateLayoutKind,
};

/// Structure-of-arrays layout: one buffer per field, holding `capacity`
/// values per slot, slot-major.
#[derive(Debug)]
pub struct SoaLayout {
    capacity: u32,
    features: KernelFeatures,
    volume_stack_size: u32,
    buffers: Vec<LayoutBuffer>,

    /// Index into `buffers`, per [`StateField`].
    fields: Vec<Option<usize>>,
}

impl SoaLayout {
    pub fn allocate(
        queue: &mut (impl DeviceQueue + ?Sized),
        capacity: u32,
        features: KernelFeatures,
        volume_stack_size: u32,
    ) -> Self {
        let mut buffers = Vec::new();
        let mut fields = Vec::with_capacity(SCHEMA.len());

        for desc in SCHEMA {
            let size = desc.state_size(volume_stack_size) * capacity as usize;

            if !desc.is_enabled(features) || size == 0 {
                fields.push(None);
                continue;
            }

            let label = format!("wavefront_state_{}", desc.name);
            let handle = queue.alloc(&label, size);

            queue.zero_to_device(handle);
            fields.push(Some(buffers.len()));
            buffers.push(LayoutBuffer {
                label,
                handle,
                size,
            });
        }

        Self {
            capacity,
            features,
            volume_stack_size,
            buffers,
            fields,
        }
    }
}

impl StateLayout for SoaLayout {
    fn kind(&self) -> StateLayoutKind {
        StateLayoutKind::Soa
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
        let buffer = self.fields[field as usize]?;

        if index >= self.capacity || slot >= self.slots(field) {
            return None;
        }

        let value = slot as usize * self.capacity as usize + index as usize;

        Some(Location {
            buffer: self.buffers[buffer].handle,
            offset: value * field.desc().size,
        })
    }
}
