use core::fmt;

use crate::KernelFeatures;

/// Number of kernels that path states can be queued for; this is the length
/// of [`crate::QueueCounter::num_queued`].
pub const INTEGRATOR_KERNEL_COUNT: usize = 13;

/// Every kernel the scheduler knows how to launch.
///
/// The first [`INTEGRATOR_KERNEL_COUNT`] variants are integrator kernels,
/// i.e. the ones that advance path states; the rest are bookkeeping kernels
/// launched by the scheduler itself.
///
/// The discriminant doubles as the value stored in a path's `queued_kernel`
/// field, with zero (`IntegratorInitFromCamera`, which is never queued)
/// denoting a free state.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceKernel {
    IntegratorInitFromCamera = 0,
    IntegratorInitFromBake,
    IntegratorIntersectClosest,
    IntegratorIntersectShadow,
    IntegratorIntersectSubsurface,
    IntegratorIntersectVolumeStack,
    IntegratorShadeBackground,
    IntegratorShadeLight,
    IntegratorShadeShadow,
    IntegratorShadeSurface,
    IntegratorShadeSurfaceRaytrace,
    IntegratorShadeSurfaceMnee,
    IntegratorShadeVolume,

    IntegratorReset,
    IntegratorQueuedPathsArray,
    IntegratorQueuedShadowPathsArray,
    IntegratorTerminatedPathsArray,
    IntegratorSortedPathsArray,
    IntegratorCompactPathsArray,
    IntegratorCompactStates,
    IntegratorTerminatedShadowPathsArray,
    IntegratorCompactShadowPathsArray,
    IntegratorCompactShadowStates,
    IntegratorShadowCatcherCountPossibleSplits,
    PrefixSum,
}

impl DeviceKernel {
    /// Integrator kernels in declaration order; this order is also the
    /// tie-break order used when picking the most queued kernel.
    pub const INTEGRATOR: [Self; INTEGRATOR_KERNEL_COUNT] = [
        Self::IntegratorInitFromCamera,
        Self::IntegratorInitFromBake,
        Self::IntegratorIntersectClosest,
        Self::IntegratorIntersectShadow,
        Self::IntegratorIntersectSubsurface,
        Self::IntegratorIntersectVolumeStack,
        Self::IntegratorShadeBackground,
        Self::IntegratorShadeLight,
        Self::IntegratorShadeShadow,
        Self::IntegratorShadeSurface,
        Self::IntegratorShadeSurfaceRaytrace,
        Self::IntegratorShadeSurfaceMnee,
        Self::IntegratorShadeVolume,
    ];

    /// Decodes a `queued_kernel` value read from a path state; returns `None`
    /// for free states and for values that don't name a queueable kernel.
    pub fn from_queued(value: u32) -> Option<Self> {
        let kernel = *Self::INTEGRATOR.get(value as usize)?;

        if kernel.is_init() {
            None
        } else {
            Some(kernel)
        }
    }

    /// Value stored in `queued_kernel` for a state waiting on this kernel.
    pub fn queued(self) -> u32 {
        debug_assert!(self.is_integrator() && !self.is_init());

        self as u32
    }

    pub fn is_integrator(self) -> bool {
        (self as usize) < INTEGRATOR_KERNEL_COUNT
    }

    pub fn is_init(self) -> bool {
        matches!(
            self,
            Self::IntegratorInitFromCamera | Self::IntegratorInitFromBake
        )
    }

    /// Whether this kernel operates on the shadow index space.
    pub fn is_shadow_path(self) -> bool {
        matches!(
            self,
            Self::IntegratorIntersectShadow | Self::IntegratorShadeShadow
        )
    }

    /// Whether states are handed to this kernel in shader-sorted order.
    pub fn uses_sorting(self) -> bool {
        matches!(
            self,
            Self::IntegratorShadeSurface
                | Self::IntegratorShadeSurfaceRaytrace
                | Self::IntegratorShadeSurfaceMnee
        )
    }

    /// Whether this kernel may allocate shadow paths.
    pub fn creates_shadow_paths(self) -> bool {
        matches!(
            self,
            Self::IntegratorShadeSurface
                | Self::IntegratorShadeSurfaceRaytrace
                | Self::IntegratorShadeSurfaceMnee
                | Self::IntegratorShadeVolume
        )
    }

    /// Whether this kernel may allocate two shadow paths per state (light
    /// sample plus ambient occlusion).
    pub fn creates_ao_paths(self, features: KernelFeatures) -> bool {
        features.contains(KernelFeatures::AO)
            && matches!(
                self,
                Self::IntegratorShadeSurface
                    | Self::IntegratorShadeSurfaceRaytrace
                    | Self::IntegratorShadeSurfaceMnee
            )
    }

    /// Whether this kernel writes into the render buffer, and thus receives
    /// it as an argument.
    pub fn is_shading(self) -> bool {
        matches!(
            self,
            Self::IntegratorShadeBackground
                | Self::IntegratorShadeLight
                | Self::IntegratorShadeShadow
                | Self::IntegratorShadeSurface
                | Self::IntegratorShadeSurfaceRaytrace
                | Self::IntegratorShadeSurfaceMnee
                | Self::IntegratorShadeVolume
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::IntegratorInitFromCamera => "integrator_init_from_camera",
            Self::IntegratorInitFromBake => "integrator_init_from_bake",
            Self::IntegratorIntersectClosest => "integrator_intersect_closest",
            Self::IntegratorIntersectShadow => "integrator_intersect_shadow",
            Self::IntegratorIntersectSubsurface => {
                "integrator_intersect_subsurface"
            }
            Self::IntegratorIntersectVolumeStack => {
                "integrator_intersect_volume_stack"
            }
            Self::IntegratorShadeBackground => "integrator_shade_background",
            Self::IntegratorShadeLight => "integrator_shade_light",
            Self::IntegratorShadeShadow => "integrator_shade_shadow",
            Self::IntegratorShadeSurface => "integrator_shade_surface",
            Self::IntegratorShadeSurfaceRaytrace => {
                "integrator_shade_surface_raytrace"
            }
            Self::IntegratorShadeSurfaceMnee => "integrator_shade_surface_mnee",
            Self::IntegratorShadeVolume => "integrator_shade_volume",
            Self::IntegratorReset => "integrator_reset",
            Self::IntegratorQueuedPathsArray => "integrator_queued_paths_array",
            Self::IntegratorQueuedShadowPathsArray => {
                "integrator_queued_shadow_paths_array"
            }
            Self::IntegratorTerminatedPathsArray => {
                "integrator_terminated_paths_array"
            }
            Self::IntegratorSortedPathsArray => "integrator_sorted_paths_array",
            Self::IntegratorCompactPathsArray => {
                "integrator_compact_paths_array"
            }
            Self::IntegratorCompactStates => "integrator_compact_states",
            Self::IntegratorTerminatedShadowPathsArray => {
                "integrator_terminated_shadow_paths_array"
            }
            Self::IntegratorCompactShadowPathsArray => {
                "integrator_compact_shadow_paths_array"
            }
            Self::IntegratorCompactShadowStates => {
                "integrator_compact_shadow_states"
            }
            Self::IntegratorShadowCatcherCountPossibleSplits => {
                "integrator_shadow_catcher_count_possible_splits"
            }
            Self::PrefixSum => "prefix_sum",
        }
    }
}

impl fmt::Display for DeviceKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
