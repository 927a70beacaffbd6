use crate::gpu::DeviceKernel;
use crate::{DeviceQueue, KernelArgs, Result, WavefrontScheduler};

/// How many camera paths admission may create so that every path which
/// could still split has room for its copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplitReservation {
    /// Upper bound of active main paths, camera paths only.
    pub max_num_camera_paths: u32,

    /// Main states kept free for splits of paths in flight and of the ones
    /// about to be admitted.
    pub num_predicted_splits: u32,
}

/// Splits the free part of the main index space between new camera paths
/// and their future shadow-catcher copies.
///
/// Half of the free states go to new camera paths, each of which may split
/// once; states that are already in flight and can still split need a copy
/// too, so they eat into the other half first.
pub fn reserve_split_capacity(
    capacity: u32,
    num_active_paths: u32,
    num_possible_splits: u32,
) -> SplitReservation {
    let num_new_paths = capacity.saturating_sub(num_active_paths) / 2;

    let max_num_camera_paths = num_active_paths.max(
        (num_active_paths + num_new_paths)
            .saturating_sub(num_possible_splits),
    );

    SplitReservation {
        max_num_camera_paths,
        num_predicted_splits: num_possible_splits + num_new_paths,
    }
}

impl<Q> WavefrontScheduler<Q>
where
    Q: DeviceQueue,
{
    /// Number of live main states that may still split.
    pub fn count_possible_splits(&mut self) -> Result<u32> {
        let max_index = self.max_active_main_path_index;

        if max_index == 0 {
            return Ok(0);
        }

        self.num_queued_paths.zero_to_device(&mut self.queue);

        self.queue.enqueue(
            DeviceKernel::IntegratorShadowCatcherCountPossibleSplits,
            max_index,
            &KernelArgs::new()
                .count(max_index)
                .buffer(self.num_queued_paths.handle()),
        );

        self.num_queued_paths.copy_from_device(&mut self.queue);
        self.synchronize("counting possible splits")?;

        Ok(self.num_queued_paths[0])
    }
}
