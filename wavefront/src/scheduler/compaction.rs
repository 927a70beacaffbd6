use log::debug;

use crate::gpu::DeviceKernel;
use crate::{DeviceQueue, KernelArgs, Result, WavefrontScheduler};

/// Kernels compacting one index space: terminated-paths array,
/// compact-paths array and compact-states.
type CompactionKernels = [DeviceKernel; 3];

const MAIN_KERNELS: CompactionKernels = [
    DeviceKernel::IntegratorTerminatedPathsArray,
    DeviceKernel::IntegratorCompactPathsArray,
    DeviceKernel::IntegratorCompactStates,
];

const SHADOW_KERNELS: CompactionKernels = [
    DeviceKernel::IntegratorTerminatedShadowPathsArray,
    DeviceKernel::IntegratorCompactShadowPathsArray,
    DeviceKernel::IntegratorCompactShadowStates,
];

impl<Q> WavefrontScheduler<Q>
where
    Q: DeviceQueue,
{
    /// Moves live main states into `[0, num_active_paths)`, so that the
    /// high-water mark drops to `num_active_paths`.
    ///
    /// `num_active_paths` must be the actual number of live main states.
    pub fn compact_states(&mut self, num_active_paths: u32) -> Result<()> {
        if num_active_paths == 0 {
            self.max_active_main_path_index = 0;
        }

        if self.max_active_main_path_index == num_active_paths {
            return Ok(());
        }

        let max_index = self.max_active_main_path_index;

        self.compact_paths(num_active_paths, max_index, MAIN_KERNELS)?;
        self.max_active_main_path_index = num_active_paths;

        debug!(
            "Path states compacted; max_index={max_index} -> \
             {num_active_paths}"
        );

        Ok(())
    }

    /// Reclaims the shadow index space.
    ///
    /// With no shadow paths in flight the index simply goes back to zero;
    /// otherwise shadow states are compacted once enough of them have
    /// terminated.
    pub fn compact_shadow_paths(&mut self) -> Result<()> {
        let counter = self.queue_counter();

        let num_active_paths = (counter
            .get(DeviceKernel::IntegratorIntersectShadow)
            + counter.get(DeviceKernel::IntegratorShadeShadow))
        .max(0) as u32;

        let max_index = self.next_shadow_path_index[0];

        if num_active_paths == 0 {
            if max_index != 0 {
                self.next_shadow_path_index[0] = 0;
                self.next_shadow_path_index.copy_to_device(&mut self.queue);
            }

            return Ok(());
        }

        let worth_it = max_index >= self.config.min_shadow_compact_paths
            && (num_active_paths as f32)
                <= self.config.shadow_compact_ratio * max_index as f32;

        if !worth_it {
            return Ok(());
        }

        self.compact_paths(num_active_paths, max_index, SHADOW_KERNELS)?;

        self.next_shadow_path_index[0] = num_active_paths;
        self.next_shadow_path_index.copy_to_device(&mut self.queue);

        debug!(
            "Shadow paths compacted; max_index={max_index} -> \
             {num_active_paths}"
        );

        Ok(())
    }

    /// Pairs live states from `[num_active_paths, max_index)` with free
    /// slots from `[0, num_active_paths)` and moves them there.
    fn compact_paths(
        &mut self,
        num_active_paths: u32,
        max_index: u32,
        [terminated, compact, compact_states]: CompactionKernels,
    ) -> Result<()> {
        let indices = self.queued_paths.handle();
        let num_indices = self.num_queued_paths.handle();

        // Free slots land at `[num_active_paths, ...)`
        self.num_queued_paths.zero_to_device(&mut self.queue);

        self.queue.enqueue(
            terminated,
            num_active_paths,
            &KernelArgs::new()
                .count(num_active_paths)
                .buffer(indices)
                .buffer(num_indices)
                .count(num_active_paths),
        );

        // ... and states to move land at `[0, ...)`
        self.num_queued_paths.zero_to_device(&mut self.queue);

        self.queue.enqueue(
            compact,
            max_index,
            &KernelArgs::new()
                .count(max_index)
                .buffer(indices)
                .buffer(num_indices)
                .count(num_active_paths),
        );

        self.num_queued_paths.copy_from_device(&mut self.queue);
        self.synchronize("compacting path states")?;

        let num_compact_paths = self.num_queued_paths[0];

        if num_compact_paths > 0 {
            self.queue.enqueue(
                compact_states,
                num_compact_paths,
                &KernelArgs::new()
                    .buffer(indices)
                    .int(0)
                    .count(num_active_paths)
                    .count(num_compact_paths),
            );
        }

        Ok(())
    }
}
