use crate::gpu::DeviceKernel;
use crate::{BufferHandle, DeviceQueue, DeviceVector};

/// Key counters of kernels that receive their states sorted by shader.
///
/// States are bucketed by `(shader, partition)`, where partition is the
/// state's index divided by [`Self::partition_divisor`]; partitioning keeps
/// states of one launch close together in memory.
#[derive(Debug)]
pub(super) struct ShaderSorting {
    capacity: u32,
    max_shaders: u32,
    pub partition_divisor: u32,
    pub num_keys: u32,
    counters: Vec<(DeviceKernel, DeviceVector<u32>)>,
    pub prefix_sum: DeviceVector<u32>,
}

impl ShaderSorting {
    pub fn allocate(
        queue: &mut (impl DeviceQueue + ?Sized),
        capacity: u32,
        max_shaders: u32,
    ) -> Self {
        let max_shaders = max_shaders.max(1);

        let num_partitions =
            (capacity / queue.num_sort_partition_elements().max(1)).max(1);

        let partition_divisor =
            (capacity + num_partitions - 1) / num_partitions;
        let num_keys = max_shaders * num_partitions;

        log::debug!(
            "Allocating shader sorting; num_partitions={num_partitions}, \
             partition_divisor={partition_divisor}, num_keys={num_keys}"
        );

        let counters = DeviceKernel::INTEGRATOR
            .into_iter()
            .filter(|kernel| kernel.uses_sorting())
            .map(|kernel| {
                let counter = DeviceVector::new(
                    queue,
                    format!("wavefront_sort_key_counter_{kernel}"),
                    num_keys as usize,
                );

                (kernel, counter)
            })
            .collect();

        let prefix_sum = DeviceVector::new(
            queue,
            "wavefront_sort_prefix_sum",
            num_keys as usize,
        );

        Self {
            capacity,
            max_shaders,
            partition_divisor,
            num_keys,
            counters,
            prefix_sum,
        }
    }

    /// Whether this allocation suits given capacity and number of shaders.
    pub fn fits(&self, capacity: u32, max_shaders: u32) -> bool {
        self.capacity == capacity && self.max_shaders == max_shaders.max(1)
    }

    pub fn counter(&self, kernel: DeviceKernel) -> Option<&DeviceVector<u32>> {
        self.counters
            .iter()
            .find(|(k, _)| *k == kernel)
            .map(|(_, counter)| counter)
    }

    pub fn key_counters(&self) -> Vec<(DeviceKernel, BufferHandle)> {
        self.counters
            .iter()
            .map(|(kernel, counter)| (*kernel, counter.handle()))
            .collect()
    }

    pub fn zero_to_device(&self, queue: &mut (impl DeviceQueue + ?Sized)) {
        for (_, counter) in &self.counters {
            counter.zero_to_device(queue);
        }

        self.prefix_sum.zero_to_device(queue);
    }

    pub fn free(self, queue: &mut (impl DeviceQueue + ?Sized)) {
        for (_, counter) in self.counters {
            counter.free(queue);
        }

        self.prefix_sum.free(queue);
    }
}
