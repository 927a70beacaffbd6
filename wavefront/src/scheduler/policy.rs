use log::{trace, warn};

use crate::gpu::{DeviceKernel, KernelFeatures, QueueCounter};
use crate::{BufferHandle, DeviceQueue, KernelArgs, Result, WavefrontScheduler};

/// Returns the integrator kernel with the most queued states; ties go to
/// the kernel declared first.
pub fn most_queued_kernel(counter: &QueueCounter) -> Option<DeviceKernel> {
    let mut best = None;
    let mut best_count = 0;

    for kernel in DeviceKernel::INTEGRATOR {
        let count = counter.get(kernel);

        if count > best_count {
            best = Some(kernel);
            best_count = count;
        }
    }

    best
}

/// Kernel to launch next, together with the maximum number of states it may
/// run for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchPlan {
    pub kernel: DeviceKernel,
    pub limit: Option<u32>,
}

impl DispatchPlan {
    pub fn new(kernel: DeviceKernel, limit: Option<u32>) -> Self {
        Self { kernel, limit }
    }
}

/// Decides what to actually launch when `kernel` is the most queued one.
///
/// Kernels that create shadow paths must not run out of shadow states:
/// if there are fewer free shadow states than states queued for `kernel`,
/// pending shadow paths get drained first. Kernels that create two shadow
/// paths per state (light sample plus ambient occlusion) are additionally
/// limited to half of the free shadow states.
pub fn plan_dispatch(
    kernel: DeviceKernel,
    counter: &QueueCounter,
    available_shadow_paths: u32,
    features: KernelFeatures,
) -> DispatchPlan {
    if !kernel.creates_shadow_paths() {
        return DispatchPlan::new(kernel, None);
    }

    let num_queued = counter.get(kernel).max(0) as u32;

    let limit = kernel
        .creates_ao_paths(features)
        .then_some(available_shadow_paths / 2);

    if available_shadow_paths < num_queued || limit == Some(0) {
        for shadow in [
            DeviceKernel::IntegratorIntersectShadow,
            DeviceKernel::IntegratorShadeShadow,
        ] {
            if counter.get(shadow) > 0 {
                return DispatchPlan::new(shadow, None);
            }
        }
    }

    DispatchPlan::new(kernel, limit)
}

impl<Q> WavefrontScheduler<Q>
where
    Q: DeviceQueue,
{
    /// Launches the most queued integrator kernel; returns `None` if there
    /// was nothing to launch.
    pub fn enqueue_path_iteration(&mut self) -> Result<Option<DeviceKernel>> {
        let Some(kernel) = most_queued_kernel(self.queue_counter()) else {
            return Ok(None);
        };

        let plan = if kernel.creates_shadow_paths() {
            self.compact_shadow_paths()?;

            let available_shadow_paths = self
                .max_num_paths
                .saturating_sub(self.next_shadow_path_index[0]);

            plan_dispatch(
                kernel,
                self.queue_counter(),
                available_shadow_paths,
                self.scene.features,
            )
        } else {
            DispatchPlan::new(kernel, None)
        };

        if !self.enqueue_kernel(plan.kernel, plan.limit) {
            return Ok(None);
        }

        if plan.kernel.creates_shadow_paths() {
            self.next_shadow_path_index.copy_from_device(&mut self.queue);
        }

        Ok(Some(plan.kernel))
    }

    fn enqueue_kernel(
        &mut self,
        kernel: DeviceKernel,
        limit: Option<u32>,
    ) -> bool {
        let max_index = self.kernel_max_active_main_path_index(kernel);
        let num_queued = self.queue_counter().get(kernel).max(0) as u32;
        let sorted = kernel.uses_sorting() && self.sorting.is_some();

        // Scattered states are gathered through an index array; otherwise
        // the kernel runs over all states up to `max_index` and skips the
        // ones queued for something else
        let indexed = sorted || num_queued < max_index;

        let mut work_size = if indexed { num_queued } else { max_index };

        if let Some(limit) = limit {
            work_size = work_size.min(limit);
        }

        if work_size == 0 {
            warn!(
                "Nothing to launch; kernel={kernel}, num_queued={num_queued}, \
                 max_index={max_index}, limit={limit:?}"
            );

            return false;
        }

        let path_index = if !indexed {
            None
        } else if sorted {
            self.compute_sorted_queued_paths(kernel, max_index, limit)
        } else {
            Some(self.compute_queued_paths(kernel, max_index))
        };

        let mut args = KernelArgs::new().opt_buffer(path_index);

        if kernel.is_shading() {
            args = args.buffer(self.render_buffer);
        }

        trace!(
            "Launching kernel; kernel={kernel}, work_size={work_size}, \
             indexed={indexed}, sorted={sorted}"
        );

        self.queue.enqueue(kernel, work_size, &args.count(work_size));

        true
    }

    /// Gathers states queued for `kernel`, in index order.
    fn compute_queued_paths(
        &mut self,
        kernel: DeviceKernel,
        max_index: u32,
    ) -> BufferHandle {
        let array_kernel = if kernel.is_shadow_path() {
            DeviceKernel::IntegratorQueuedShadowPathsArray
        } else {
            DeviceKernel::IntegratorQueuedPathsArray
        };

        self.num_queued_paths.zero_to_device(&mut self.queue);

        let args = KernelArgs::new()
            .count(max_index)
            .buffer(self.queued_paths.handle())
            .buffer(self.num_queued_paths.handle())
            .int(kernel as i32);

        self.queue.enqueue(array_kernel, max_index, &args);

        self.queued_paths.handle()
    }

    /// Gathers states queued for `kernel`, ordered by their sort keys.
    fn compute_sorted_queued_paths(
        &mut self,
        kernel: DeviceKernel,
        max_index: u32,
        limit: Option<u32>,
    ) -> Option<BufferHandle> {
        let sorting = self.sorting.as_ref()?;
        let counter = sorting.counter(kernel)?;

        self.queue.enqueue(
            DeviceKernel::PrefixSum,
            1,
            &KernelArgs::new()
                .buffer(counter.handle())
                .buffer(sorting.prefix_sum.handle())
                .count(sorting.num_keys),
        );

        self.num_queued_paths.zero_to_device(&mut self.queue);

        let args = KernelArgs::new()
            .count(max_index)
            .count(limit.unwrap_or(u32::MAX))
            .buffer(self.queued_paths.handle())
            .buffer(self.num_queued_paths.handle())
            .buffer(counter.handle())
            .buffer(sorting.prefix_sum.handle())
            .int(kernel as i32);

        self.queue.enqueue(
            DeviceKernel::IntegratorSortedPathsArray,
            max_index,
            &args,
        );

        Some(self.queued_paths.handle())
    }

    /// Upper bound of indices that states queued for `kernel` may occupy.
    fn kernel_max_active_main_path_index(&self, kernel: DeviceKernel) -> u32 {
        if kernel.is_shadow_path() {
            self.next_shadow_path_index[0]
        } else {
            self.max_active_main_path_index
        }
    }
}
