use log::debug;

use crate::gpu::{DeviceKernel, KernelFeatures, WorkTile};
use crate::{
    most_queued_kernel, reserve_split_capacity, DeviceQueue, Error,
    KernelArgs, Result, WavefrontScheduler, WorkTileSource,
};

/// Outcome of [`WavefrontScheduler::enqueue_work_tiles()`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Admission {
    /// Fresh paths were initialized.
    pub admitted: bool,

    /// Tile source is exhausted (or rendering got cancelled) and no paths
    /// are in flight anymore.
    pub finished: bool,
}

impl<Q> WavefrontScheduler<Q>
where
    Q: DeviceQueue,
{
    /// Tops the main index space up with camera paths from `tiles`.
    ///
    /// Paths are admitted only when the pool is under-occupied and when the
    /// paths in flight (if any) are all waiting for the closest-hit
    /// intersection, so that old and new paths then advance together.
    pub fn enqueue_work_tiles(
        &mut self,
        tiles: &mut impl WorkTileSource,
    ) -> Result<Admission> {
        let counter = *self.queue_counter();

        if self.is_cancel_requested() {
            return Ok(Admission {
                admitted: false,
                finished: counter.num_main_paths()
                    + counter.num_shadow_paths()
                    == 0,
            });
        }

        match most_queued_kernel(&counter) {
            None | Some(DeviceKernel::IntegratorIntersectClosest) => {
                //
            }
            Some(_) => {
                return Ok(Admission::default());
            }
        }

        let num_active_paths = self.num_active_main_paths();
        let mut max_num_camera_paths = self.max_num_paths;
        let mut num_predicted_splits = 0;

        if self.scene.has_shadow_catcher() {
            let num_possible_splits = self.count_possible_splits()?;

            let reservation = reserve_split_capacity(
                self.max_num_paths,
                num_active_paths,
                num_possible_splits,
            );

            max_num_camera_paths = reservation.max_num_camera_paths;
            num_predicted_splits = reservation.num_predicted_splits;
        }

        let mut work_tiles = Vec::new();
        let mut num_paths = num_active_paths;

        if num_active_paths == 0
            || num_active_paths < self.min_num_active_main_paths
        {
            while num_paths < max_num_camera_paths {
                let Some(tile) =
                    tiles.get_work(max_num_camera_paths - num_paths)
                else {
                    break;
                };

                num_paths += tile.num_paths();
                work_tiles.push(tile);
            }

            if work_tiles.is_empty() && num_paths == 0 {
                if tiles.has_work() {
                    return Err(Error::WorkTileTooLarge {
                        max_num_paths: max_num_camera_paths,
                    });
                }

                return Ok(Admission {
                    admitted: false,
                    finished: true,
                });
            }
        }

        if work_tiles.is_empty() {
            return Ok(Admission::default());
        }

        self.compact_states(num_active_paths)?;

        if self.scene.has_shadow_catcher() {
            self.next_main_path_index[0] = num_paths;
            self.next_main_path_index.copy_to_device(&mut self.queue);
        }

        debug!(
            "Admitting work tiles; num_tiles={}, num_active_paths=\
             {num_active_paths}, num_paths={num_paths}, \
             num_predicted_splits={num_predicted_splits}",
            work_tiles.len(),
        );

        self.enqueue_init(&work_tiles, num_active_paths, num_predicted_splits);

        Ok(Admission {
            admitted: true,
            finished: false,
        })
    }

    /// Stamps tiles with the states they claim, starting right after the
    /// active ones, and launches the init kernel over them.
    fn enqueue_init(
        &mut self,
        tiles: &[WorkTile],
        num_active_paths: u32,
        num_predicted_splits: u32,
    ) {
        if self.work_tiles.len() < tiles.len() {
            self.work_tiles.resize(&mut self.queue, tiles.len());
        }

        let mut path_index_offset = num_active_paths;
        let mut max_tile_work_size = 0;

        for (dst, src) in self.work_tiles.iter_mut().zip(tiles) {
            let work_size = src.num_paths();

            *dst = WorkTile {
                path_index_offset,
                work_size,
                ..*src
            };

            path_index_offset += work_size;
            max_tile_work_size = max_tile_work_size.max(work_size);
        }

        self.work_tiles.copy_to_device(&mut self.queue);

        let kernel = if self.scene.features.contains(KernelFeatures::BAKING) {
            DeviceKernel::IntegratorInitFromBake
        } else {
            DeviceKernel::IntegratorInitFromCamera
        };

        let num_tiles = tiles.len() as u32;

        self.queue.enqueue(
            kernel,
            max_tile_work_size.saturating_mul(num_tiles),
            &KernelArgs::new()
                .buffer(self.work_tiles.handle())
                .count(num_tiles)
                .buffer(self.render_buffer)
                .count(max_tile_work_size),
        );

        self.max_active_main_path_index =
            path_index_offset + num_predicted_splits;

        self.num_predicted_splits = num_predicted_splits;
    }
}
