use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::gpu::KernelFeatures;
use crate::StateLayoutKind;

/// Tunables of [`crate::WavefrontScheduler`].
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Layout of path states; defaults to the device's preferred one.
    pub layout: Option<StateLayoutKind>,

    /// Whether shading kernels run over states sorted by shader.
    pub use_shader_sorting: bool,

    /// Tiles are sized to occupy at most `capacity / tile_state_divisor`
    /// states, so that admission can top up the pool gradually.
    pub tile_state_divisor: u32,

    /// Shadow states get compacted once at most this fraction of the shadow
    /// index range is alive.
    pub shadow_compact_ratio: f32,

    /// Shadow index range below which compaction isn't worth it.
    pub min_shadow_compact_paths: u32,

    /// Seed mixed into each path's RNG hash.
    pub seed: u32,
}

impl SchedulerConfig {
    pub fn with_layout(mut self, layout: StateLayoutKind) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn with_shader_sorting(mut self, enabled: bool) -> Self {
        self.use_shader_sorting = enabled;
        self
    }

    pub fn with_tile_state_divisor(mut self, divisor: u32) -> Self {
        self.tile_state_divisor = divisor;
        self
    }

    pub fn with_shadow_compaction(
        mut self,
        ratio: f32,
        min_paths: u32,
    ) -> Self {
        self.shadow_compact_ratio = ratio;
        self.min_shadow_compact_paths = min_paths;
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            layout: None,
            use_shader_sorting: true,
            tile_state_divisor: 8,
            shadow_compact_ratio: 0.5,
            min_shadow_compact_paths: 32,
            seed: 0,
        }
    }
}

/// Properties of the scene the scheduler needs to size its storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SceneInfo {
    pub features: KernelFeatures,

    /// Maximum number of nested volumes a path can be in.
    pub volume_stack_size: u32,

    /// Number of distinct shaders; keys of the shader sort.
    pub max_shaders: u32,
}

impl SceneInfo {
    pub fn new(features: KernelFeatures) -> Self {
        Self {
            features,
            volume_stack_size: 0,
            max_shaders: 1,
        }
    }

    pub fn with_volume_stack_size(mut self, size: u32) -> Self {
        self.volume_stack_size = size;
        self
    }

    pub fn with_max_shaders(mut self, max_shaders: u32) -> Self {
        self.max_shaders = max_shaders;
        self
    }

    pub fn has_shadow_catcher(&self) -> bool {
        self.features.contains(KernelFeatures::SHADOW_CATCHER)
    }
}

/// Shared flag through which a render can be cancelled from another thread.
///
/// Cancellation is cooperative: the scheduler stops admitting work and
/// returns once all paths in flight are done.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
