//! Toy integrator used to exercise the scheduler end-to-end on the host
//! device.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::gpu::{
    DeviceKernel, MainPathIndex, PathFlags, PathIndex, QueueCounter,
    PATH_BOUNCE, PATH_RENDER_PIXEL_INDEX, PATH_SAMPLE,
    SHADOW_PATH_RENDER_PIXEL_INDEX, SHADOW_PATH_SAMPLE,
};
use crate::{
    BufferParams, CancelToken, DeviceQueue, HostQueue, IntegratorKernels,
    KernelContext, KernelFault, SceneInfo, SchedulerConfig,
    WavefrontScheduler,
};

/// Renderer whose paths wander between kernels at random.
///
/// Every camera path that terminates adds one to its pixel in a render
/// buffer of `f32`s (shadow-catcher copies don't), so after rendering `n`
/// samples each pixel should hold exactly `n`.
pub struct MockRenderer {
    rng: StdRng,
    max_bounces: u32,
    background_probability: f32,
    volume_probability: f32,
    shadow_catcher_probability: f32,
    survival_probability: f32,
    fail_on: Option<DeviceKernel>,
    leak_into: Option<DeviceKernel>,
    cancel_after: Option<(u32, CancelToken)>,
    pub num_runs: u32,
    pub num_shadow_hits: u32,
}

impl MockRenderer {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            max_bounces: 3,
            background_probability: 0.2,
            volume_probability: 0.0,
            shadow_catcher_probability: 0.0,
            survival_probability: 0.8,
            fail_on: None,
            leak_into: None,
            cancel_after: None,
            num_runs: 0,
            num_shadow_hits: 0,
        }
    }

    pub fn with_max_bounces(mut self, max_bounces: u32) -> Self {
        self.max_bounces = max_bounces;
        self
    }

    pub fn with_background_probability(mut self, probability: f32) -> Self {
        self.background_probability = probability;
        self
    }

    pub fn with_volume_probability(mut self, probability: f32) -> Self {
        self.volume_probability = probability;
        self
    }

    pub fn with_shadow_catcher_probability(
        mut self,
        probability: f32,
    ) -> Self {
        self.shadow_catcher_probability = probability;
        self
    }

    /// Makes given kernel fail on its first state.
    pub fn with_failure(mut self, kernel: DeviceKernel) -> Self {
        self.fail_on = Some(kernel);
        self
    }

    /// Makes the background kernel bump the counter of `kernel` once,
    /// without queueing any state for it.
    pub fn with_leak(mut self, kernel: DeviceKernel) -> Self {
        self.leak_into = Some(kernel);
        self
    }

    /// Cancels given token after this many kernel runs.
    pub fn with_cancel_after(mut self, runs: u32, token: CancelToken) -> Self {
        self.cancel_after = Some((runs, token));
        self
    }

    pub fn heal(&mut self) {
        self.fail_on = None;
    }

    fn chance(&mut self, probability: f32) -> bool {
        self.rng.gen::<f32>() < probability
    }

    fn intersect_closest(
        &mut self,
        ctx: &mut KernelContext<'_>,
        path: MainPathIndex,
    ) -> Result<(), KernelFault> {
        use DeviceKernel::*;

        let current = IntegratorIntersectClosest;

        if ctx.path_flags(path)?.can_split()
            && self.chance(self.shadow_catcher_probability)
        {
            let split = ctx.split_path(path)?;

            ctx.split_path_init(split, current)?;
        }

        let hit: f32 = self.rng.gen();
        let background = self.background_probability;

        if hit < background {
            ctx.path_next(path, current, IntegratorShadeBackground)
        } else if hit < background + self.volume_probability {
            ctx.path_next(path, current, IntegratorShadeVolume)
        } else {
            let shader = self.rng.gen_range(0..ctx.state().max_shaders);

            ctx.path_next_sorted(path, current, IntegratorShadeSurface, shader)
        }
    }

    fn shade(
        &mut self,
        ctx: &mut KernelContext<'_>,
        path: MainPathIndex,
        current: DeviceKernel,
    ) -> Result<(), KernelFault> {
        let pixel = ctx.read(PATH_RENDER_PIXEL_INDEX, path)?;
        let sample = ctx.read(PATH_SAMPLE, path)?;

        let num_shadow_paths =
            if current.creates_ao_paths(ctx.state().features) {
                2
            } else {
                1
            };

        for _ in 0..num_shadow_paths {
            let shadow =
                ctx.shadow_path_init(DeviceKernel::IntegratorIntersectShadow)?;

            ctx.write(SHADOW_PATH_RENDER_PIXEL_INDEX, shadow, pixel)?;
            ctx.write(SHADOW_PATH_SAMPLE, shadow, sample)?;
        }

        let bounce = ctx.read(PATH_BOUNCE, path)? + 1;

        ctx.write(PATH_BOUNCE, path, bounce)?;

        if bounce >= self.max_bounces || !self.chance(self.survival_probability)
        {
            self.finish(ctx, path, current)
        } else {
            let next = DeviceKernel::IntegratorIntersectClosest;

            ctx.path_next(path, current, next)
        }
    }

    fn finish(
        &mut self,
        ctx: &mut KernelContext<'_>,
        path: MainPathIndex,
        current: DeviceKernel,
    ) -> Result<(), KernelFault> {
        if !ctx.path_flags(path)?.contains(PathFlags::SHADOW_CATCHER_PASS) {
            let pixel = ctx.read(PATH_RENDER_PIXEL_INDEX, path)?;

            let value = ctx
                .render_buffer::<f32>()?
                .get_mut(pixel as usize)
                .ok_or_else(|| {
                    KernelFault::new(format!("pixel #{pixel} is out of range"))
                })?;

            *value += 1.0;
        }

        ctx.path_terminate(path, current)
    }

    fn leak(
        &mut self,
        ctx: &mut KernelContext<'_>,
    ) -> Result<(), KernelFault> {
        let Some(kernel) = self.leak_into.take() else {
            return Ok(());
        };

        let buffer = ctx.state().queue_counter;
        let offset = QueueCounter::offset_of(kernel);
        let memory = ctx.memory_mut();
        let count: i32 = memory.read(buffer, offset)?;

        memory.write(buffer, offset, count + 1)
    }
}

impl IntegratorKernels for MockRenderer {
    fn run(
        &mut self,
        kernel: DeviceKernel,
        ctx: &mut KernelContext<'_>,
        path: PathIndex,
    ) -> Result<(), KernelFault> {
        use DeviceKernel::*;

        self.num_runs += 1;

        if let Some((runs, token)) = &self.cancel_after {
            if self.num_runs >= *runs {
                token.cancel();
            }
        }

        if self.fail_on == Some(kernel) {
            return Err(KernelFault::new("simulated failure"));
        }

        match (kernel, path) {
            (IntegratorIntersectClosest, PathIndex::Main(path)) => {
                self.intersect_closest(ctx, path)
            }

            (IntegratorShadeBackground, PathIndex::Main(path)) => {
                self.leak(ctx)?;
                self.finish(ctx, path, kernel)
            }

            (
                IntegratorShadeSurface | IntegratorShadeVolume,
                PathIndex::Main(path),
            ) => self.shade(ctx, path, kernel),

            (IntegratorIntersectShadow, PathIndex::Shadow(path)) => {
                ctx.shadow_path_next(path, kernel, IntegratorShadeShadow)
            }

            (IntegratorShadeShadow, PathIndex::Shadow(path)) => {
                self.num_shadow_hits += 1;
                ctx.shadow_path_terminate(path, kernel)
            }

            (kernel, path) => Err(KernelFault::new(format!(
                "`{kernel}` can't run {path:?}"
            ))),
        }
    }
}

pub type MockScheduler<K> = WavefrontScheduler<HostQueue<K>>;

/// Builds a scheduler over a `width` x `height` render buffer of `f32`s.
pub fn scheduler<K>(
    mut queue: HostQueue<K>,
    scene: SceneInfo,
    width: u32,
    height: u32,
    config: SchedulerConfig,
) -> MockScheduler<K>
where
    K: IntegratorKernels,
{
    let render_buffer =
        queue.alloc("render_buffer", (width * height) as usize * 4);

    WavefrontScheduler::new(
        queue,
        scene,
        BufferParams::new(width, height),
        render_buffer,
        config,
    )
    .unwrap()
}

/// Contents of the render buffer.
pub fn film<K>(scheduler: &MockScheduler<K>) -> Vec<f32>
where
    K: IntegratorKernels,
{
    scheduler
        .queue()
        .memory()
        .slice::<f32>(scheduler.render_buffer())
        .unwrap()
        .to_vec()
}
