mod admission;
mod compaction;
mod config;
mod policy;
mod shadow_catcher;
mod sorting;
mod statistics;

#[cfg(test)]
mod tests;

use std::mem;
use std::sync::Arc;

use derivative::Derivative;
use log::{debug, info};

pub use self::admission::*;
pub use self::config::*;
pub use self::policy::*;
pub use self::shadow_catcher::*;
use self::sorting::ShaderSorting;
pub use self::statistics::*;
use crate::gpu::{DeviceKernel, KernelFeatures, QueueCounter, WorkTile};
use crate::utils::KernelMetrics;
use crate::{
    estimate_state_size, BufferHandle, BufferParams, DeviceQueue,
    DeviceVector, Error, IntegratorState, KernelArgs, PathStatePool, Result,
    WorkTileScheduler, WorkTileSource,
};

/// Outcome of a single [`WavefrontScheduler::step()`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Iteration {
    /// New paths were initialized from work tiles.
    pub admitted: bool,

    /// Integrator kernel that got launched, if any.
    pub dispatched: Option<DeviceKernel>,

    /// No work tiles are left and no paths are in flight.
    pub finished: bool,
}

/// Drives path states through the integrator kernels of a single device.
///
/// Each iteration tops the path-state pool up with fresh camera paths (if
/// it's under-occupied), and then launches the integrator kernel that has
/// the most states waiting for it; the queue counters the kernels maintain
/// are read back after every such step.
///
/// Main and shadow paths live in separate index spaces of equal capacity:
/// main paths occupy `[0, max_active_main_path_index)`, shadow paths occupy
/// `[0, next_shadow_path_index)` of the shadow space.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct WavefrontScheduler<Q> {
    #[derivative(Debug = "ignore")]
    queue: Q,
    config: SchedulerConfig,
    scene: SceneInfo,
    buffer_params: BufferParams,
    render_buffer: BufferHandle,
    pool: PathStatePool,
    max_num_paths: u32,
    min_num_active_main_paths: u32,
    queue_counter: DeviceVector<QueueCounter>,
    num_queued_paths: DeviceVector<u32>,
    queued_paths: DeviceVector<u32>,
    work_tiles: DeviceVector<WorkTile>,
    next_shadow_path_index: DeviceVector<u32>,
    next_main_path_index: DeviceVector<u32>,
    sorting: Option<ShaderSorting>,
    max_active_main_path_index: u32,
    num_predicted_splits: u32,
    work_tile_scheduler: WorkTileScheduler,
    cancel: CancelToken,
    metrics: KernelMetrics,
}

impl<Q> WavefrontScheduler<Q>
where
    Q: DeviceQueue,
{
    pub fn new(
        mut queue: Q,
        scene: SceneInfo,
        buffer_params: BufferParams,
        render_buffer: BufferHandle,
        config: SchedulerConfig,
    ) -> Result<Self> {
        let (max_num_paths, min_num_active_main_paths) =
            Self::derive_capacity(&queue, &scene)?;

        let layout = config
            .layout
            .unwrap_or_else(|| queue.preferred_state_layout());

        let pool = PathStatePool::allocate(
            &mut queue,
            layout,
            max_num_paths,
            scene.features,
            scene.volume_stack_size,
        );

        let queue_counter =
            DeviceVector::new(&mut queue, "wavefront_queue_counter", 1);

        let num_queued_paths =
            DeviceVector::new(&mut queue, "wavefront_num_queued_paths", 1);

        let queued_paths = DeviceVector::new(
            &mut queue,
            "wavefront_queued_paths",
            max_num_paths as usize,
        );

        let work_tiles =
            DeviceVector::new(&mut queue, "wavefront_work_tiles", 1);

        let next_shadow_path_index = DeviceVector::new(
            &mut queue,
            "wavefront_next_shadow_path_index",
            1,
        );

        let next_main_path_index =
            DeviceVector::new(&mut queue, "wavefront_next_main_path_index", 1);

        let sorting = config.use_shader_sorting.then(|| {
            ShaderSorting::allocate(
                &mut queue,
                max_num_paths,
                scene.max_shaders,
            )
        });

        let mut this = Self {
            queue,
            config,
            scene,
            buffer_params,
            render_buffer,
            pool,
            max_num_paths,
            min_num_active_main_paths,
            queue_counter,
            num_queued_paths,
            queued_paths,
            work_tiles,
            next_shadow_path_index,
            next_main_path_index,
            sorting,
            max_active_main_path_index: 0,
            num_predicted_splits: 0,
            work_tile_scheduler: Default::default(),
            cancel: Default::default(),
            metrics: Default::default(),
        };

        this.init_execution();

        Ok(this)
    }

    fn derive_capacity(queue: &Q, scene: &SceneInfo) -> Result<(u32, u32)> {
        let state_size =
            estimate_state_size(scene.features, scene.volume_stack_size);

        let max_num_paths = queue
            .num_concurrent_states(state_size)
            .min(i32::MAX as u32);

        // With ambient occlusion a single shading state creates two shadow
        // paths at once
        let min_num_paths =
            if scene.features.contains(KernelFeatures::AO) { 2 } else { 1 };

        if max_num_paths < min_num_paths {
            return Err(Error::NoCapacity {
                state_size,
                min_num_paths,
            });
        }

        // Admission must not happen before at least half of the states are
        // free again
        let min_num_active_main_paths = queue
            .num_concurrent_busy_states(state_size)
            .min(max_num_paths / 2);

        info!(
            "Path states sized; state_size={state_size}, \
             max_num_paths={max_num_paths}, \
             min_num_active_main_paths={min_num_active_main_paths}"
        );

        Ok((max_num_paths, min_num_active_main_paths))
    }

    /// Adapts storage to a new scene.
    ///
    /// Path states are re-allocated only if the scene needs fields the
    /// current allocation doesn't have; either way, all states in flight are
    /// discarded by the next render.
    pub fn update_scene(&mut self, scene: SceneInfo) -> Result<()> {
        if !self.pool.covers(scene.features, scene.volume_stack_size) {
            let (max_num_paths, min_num_active_main_paths) =
                Self::derive_capacity(&self.queue, &scene)?;

            let pool = PathStatePool::allocate(
                &mut self.queue,
                self.pool.layout().kind(),
                max_num_paths,
                scene.features,
                scene.volume_stack_size,
            );

            mem::replace(&mut self.pool, pool).free(&mut self.queue);

            self.queued_paths
                .resize(&mut self.queue, max_num_paths as usize);

            self.max_num_paths = max_num_paths;
            self.min_num_active_main_paths = min_num_active_main_paths;
            self.max_active_main_path_index = 0;
        }

        let sorting_is_stale = self.sorting.as_ref().is_some_and(|sorting| {
            !sorting.fits(self.max_num_paths, scene.max_shaders)
        });

        if sorting_is_stale {
            if let Some(sorting) = self.sorting.take() {
                sorting.free(&mut self.queue);
            }

            self.sorting = Some(ShaderSorting::allocate(
                &mut self.queue,
                self.max_num_paths,
                scene.max_shaders,
            ));
        }

        self.scene = scene;
        self.init_execution();

        Ok(())
    }

    /// Changes the image window rendered by [`Self::render_samples()`].
    pub fn set_buffer_params(
        &mut self,
        buffer_params: BufferParams,
        render_buffer: BufferHandle,
    ) {
        self.buffer_params = buffer_params;
        self.render_buffer = render_buffer;
    }

    /// Renders given range of samples over the whole image window, or until
    /// cancelled.
    pub fn render_samples(
        &mut self,
        start_sample: u32,
        num_samples: u32,
        sample_offset: u32,
    ) -> Result<RenderStatistics> {
        let mut tiles = mem::take(&mut self.work_tile_scheduler);

        tiles.set_max_num_path_states(
            (self.max_num_paths / self.config.tile_state_divisor.max(1))
                .max(1),
        );

        tiles.reset(
            self.buffer_params,
            start_sample,
            num_samples,
            sample_offset,
        );

        let result = self.render_tiles(&mut tiles);

        self.work_tile_scheduler = tiles;

        result
    }

    /// Renders all tiles of given source, or until cancelled.
    ///
    /// Cancellation requested before this call is discarded; the flag stays
    /// raised after a cancelled frame until the next one starts.
    pub fn render_tiles(
        &mut self,
        tiles: &mut impl WorkTileSource,
    ) -> Result<RenderStatistics> {
        self.cancel.reset();
        self.reset()?;

        let mut stats = RenderStatistics::default();
        let mut num_busy = 0u64;

        loop {
            let iteration = self.step(tiles)?;

            if let Some(kernel) = iteration.dispatched {
                stats.record_launch(kernel);
            }

            if iteration.finished {
                break;
            }

            if !iteration.admitted && iteration.dispatched.is_none() {
                let counter = self.queue_counter();

                return Err(Error::Stalled {
                    active_paths: counter.num_main_paths()
                        + counter.num_shadow_paths(),
                });
            }

            num_busy += self.num_active_main_paths() as u64;
            stats.iterations += 1;
        }

        if stats.iterations > 0 {
            stats.occupancy = num_busy as f32
                / stats.iterations as f32
                / self.max_num_paths as f32;
        }

        self.metrics.report();

        debug!(
            "Tiles rendered; iterations={}, occupancy={:.3}",
            stats.iterations, stats.occupancy
        );

        Ok(stats)
    }

    /// Runs a single iteration of the render loop: admits work tiles (if
    /// possible), and then launches a single integrator kernel.
    pub fn step(
        &mut self,
        tiles: &mut impl WorkTileSource,
    ) -> Result<Iteration> {
        let admission = self.enqueue_work_tiles(tiles)?;

        if admission.admitted {
            self.sync_queue_counter("admitting work tiles")?;
        }

        if admission.finished {
            return Ok(Iteration {
                admitted: admission.admitted,
                dispatched: None,
                finished: true,
            });
        }

        let timer = self.metrics.start();
        let dispatched = self.enqueue_path_iteration()?;

        if let Some(kernel) = dispatched {
            self.sync_queue_counter("running integrator kernel")?;
            self.metrics.record(kernel, timer);
        }

        Ok(Iteration {
            admitted: admission.admitted,
            dispatched,
            finished: false,
        })
    }

    /// Frees all path states and zeroes every counter.
    pub fn reset(&mut self) -> Result<()> {
        self.init_execution();

        let num_states = self.max_num_paths;

        self.queue.enqueue(
            DeviceKernel::IntegratorReset,
            num_states,
            &KernelArgs::new().count(num_states),
        );

        self.queue_counter.zero_to_device(&mut self.queue);
        self.next_shadow_path_index.zero_to_device(&mut self.queue);
        self.next_main_path_index.zero_to_device(&mut self.queue);

        if let Some(sorting) = &self.sorting {
            sorting.zero_to_device(&mut self.queue);
        }

        self.queue_counter[0] = QueueCounter::default();
        self.next_shadow_path_index[0] = 0;
        self.next_main_path_index[0] = 0;
        self.max_active_main_path_index = 0;
        self.num_predicted_splits = 0;

        self.sync_queue_counter("resetting path states")
    }

    /// Reads the queue counters and the shadow path index back from the
    /// device.
    pub fn sync_counters(&mut self) -> Result<&QueueCounter> {
        self.next_shadow_path_index.copy_from_device(&mut self.queue);
        self.sync_queue_counter("reading queue counters")?;

        Ok(self.queue_counter())
    }

    fn sync_queue_counter(&mut self, stage: &'static str) -> Result<()> {
        self.queue_counter.copy_from_device(&mut self.queue);
        self.synchronize(stage)?;
        self.validate_queue_counter()
    }

    fn validate_queue_counter(&self) -> Result<()> {
        let counter = self.queue_counter();

        for kernel in DeviceKernel::INTEGRATOR {
            let count = counter.get(kernel);

            if count < 0 {
                return Err(Error::NegativeQueueCounter { kernel, count });
            }
        }

        let spaces = [
            ("main", counter.num_main_paths()),
            ("shadow", counter.num_shadow_paths()),
        ];

        for (space, queued) in spaces {
            if queued > self.max_num_paths as i64 {
                return Err(Error::CapacityExceeded {
                    space,
                    queued,
                    capacity: self.max_num_paths,
                });
            }
        }

        Ok(())
    }

    fn synchronize(&mut self, stage: &'static str) -> Result<()> {
        if self.queue.synchronize() {
            Ok(())
        } else {
            Err(Error::Device { stage })
        }
    }

    fn init_execution(&mut self) {
        let state = self.integrator_state();

        self.queue.init_execution(&state);
    }

    fn integrator_state(&self) -> IntegratorState {
        let (sort_key_counters, sort_partition_divisor) =
            match &self.sorting {
                Some(sorting) => {
                    (sorting.key_counters(), sorting.partition_divisor)
                }
                None => (Vec::new(), self.max_num_paths),
            };

        IntegratorState {
            layout: Arc::clone(self.pool.layout()),
            queue_counter: self.queue_counter.handle(),
            next_shadow_path_index: self.next_shadow_path_index.handle(),
            next_main_path_index: self.next_main_path_index.handle(),
            sort_key_counters,
            sort_partition_divisor,
            max_shaders: self.scene.max_shaders.max(1),
            features: self.scene.features,
            seed: self.config.seed,
        }
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut Q {
        &mut self.queue
    }

    pub fn scene(&self) -> &SceneInfo {
        &self.scene
    }

    pub fn path_states(&self) -> &PathStatePool {
        &self.pool
    }

    pub fn render_buffer(&self) -> BufferHandle {
        self.render_buffer
    }

    /// Queue counters, as of the last read-back.
    pub fn queue_counter(&self) -> &QueueCounter {
        &self.queue_counter[0]
    }

    pub fn num_active_main_paths(&self) -> u32 {
        self.queue_counter().num_main_paths().max(0) as u32
    }

    /// Capacity of each index space.
    pub fn max_num_paths(&self) -> u32 {
        self.max_num_paths
    }

    pub fn min_num_active_main_paths(&self) -> u32 {
        self.min_num_active_main_paths
    }

    /// High-water mark of the main index space, including room reserved
    /// for shadow-catcher splits.
    pub fn max_active_main_path_index(&self) -> u32 {
        self.max_active_main_path_index
    }

    /// Number of shadow-catcher splits reserved by the last admission.
    pub fn num_predicted_splits(&self) -> u32 {
        self.num_predicted_splits
    }

    pub fn next_shadow_path_index(&self) -> u32 {
        self.next_shadow_path_index[0]
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
