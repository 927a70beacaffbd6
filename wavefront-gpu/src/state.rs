//! Path-state schema.
//!
//! A path state is a bag of named fields grouped into sub-records (`path`,
//! `ray`, `isect`, ...). The table below is the single source of truth for
//! those fields: the allocator walks it to size and place the storage, while
//! kernels address fields through the typed [`Field`] handles it generates.

use core::marker::PhantomData;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::{IndexSpace, KernelFeatures, Main, Shadow};

/// Sentinel object id terminating a volume stack.
pub const OBJECT_NONE: u32 = u32::MAX;

/// Number of transparent hits recorded per shadow path.
pub const SHADOW_ISECT_SIZE: u32 = 4;

/// Sub-record a field belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateGroup {
    Path,
    Ray,
    Isect,
    VolumeStack,
    Subsurface,
    ShadowPath,
    ShadowRay,
    ShadowIsect,
}

impl StateGroup {
    pub fn is_shadow(self) -> bool {
        matches!(
            self,
            StateGroup::ShadowPath
                | StateGroup::ShadowRay
                | StateGroup::ShadowIsect
        )
    }

    /// Whether a shadow-catcher split copies this group into the new state.
    pub fn is_copied_on_split(self) -> bool {
        matches!(
            self,
            StateGroup::Path
                | StateGroup::Ray
                | StateGroup::Isect
                | StateGroup::VolumeStack
                | StateGroup::Subsurface
        )
    }
}

/// How many values of a field each state holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slots {
    Single,

    /// One value per volume stack entry; the depth is a scene property.
    VolumeStack,

    /// [`SHADOW_ISECT_SIZE`] values.
    ShadowIsect,
}

impl Slots {
    pub fn count(self, volume_stack_size: u32) -> u32 {
        match self {
            Slots::Single => 1,
            Slots::VolumeStack => volume_stack_size,
            Slots::ShadowIsect => SHADOW_ISECT_SIZE,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FieldDesc {
    pub field: StateField,
    pub group: StateGroup,
    pub name: &'static str,

    /// Size of a single value, in bytes.
    pub size: usize,

    /// Features that must all be enabled for this field to be allocated.
    pub features: KernelFeatures,

    pub slots: Slots,
}

impl FieldDesc {
    pub fn is_enabled(&self, features: KernelFeatures) -> bool {
        features.contains(self.features)
    }

    /// Number of bytes this field occupies in one state.
    pub fn state_size(&self, volume_stack_size: u32) -> usize {
        self.size * self.slots.count(volume_stack_size) as usize
    }
}

/// Typed handle of a field living in index space `S`.
pub struct Field<T, S> {
    field: StateField,
    _marker: PhantomData<fn() -> (T, S)>,
}

impl<T, S> Field<T, S>
where
    S: IndexSpace,
{
    pub const fn new(field: StateField) -> Self {
        Self {
            field,
            _marker: PhantomData,
        }
    }

    pub const fn id(&self) -> StateField {
        self.field
    }
}

impl<T, S> Clone for Field<T, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, S> Copy for Field<T, S> {
    //
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct VolumeStackEntry {
    pub object: u32,
    pub shader: u32,
}

impl VolumeStackEntry {
    pub const NONE: Self = Self {
        object: OBJECT_NONE,
        shader: 0,
    };

    pub fn is_none(self) -> bool {
        self.object == OBJECT_NONE
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ShadowHit {
    pub t: f32,
    pub prim: u32,
    pub object: u32,
    pub ty: u32,
}

macro_rules! schema {
    ($(
        $(#[$meta:meta])*
        $const:ident: $ty:ty => $variant:ident(
            $space:ident,
            $group:ident,
            $name:literal,
            $features:expr,
            $slots:ident
        );
    )*) => {
        #[repr(u32)]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum StateField {
            $($variant,)*
        }

        impl StateField {
            pub const ALL: &'static [StateField] = &[
                $(StateField::$variant,)*
            ];

            pub fn desc(self) -> &'static FieldDesc {
                &SCHEMA[self as usize]
            }
        }

        pub const SCHEMA: &[FieldDesc] = &[
            $(
                FieldDesc {
                    field: StateField::$variant,
                    group: StateGroup::$group,
                    name: $name,
                    size: core::mem::size_of::<$ty>(),
                    features: $features,
                    slots: Slots::$slots,
                },
            )*
        ];

        $(
            $(#[$meta])*
            pub const $const: Field<$ty, $space> =
                Field::new(StateField::$variant);
        )*
    };
}

const ALWAYS: KernelFeatures = KernelFeatures::empty();

schema! {
    PATH_RENDER_PIXEL_INDEX: u32 => PathRenderPixelIndex(
        Main, Path, "path.render_pixel_index", ALWAYS, Single
    );
    PATH_SAMPLE: u32 => PathSample(
        Main, Path, "path.sample", ALWAYS, Single
    );
    PATH_BOUNCE: u32 => PathBounce(
        Main, Path, "path.bounce", ALWAYS, Single
    );
    PATH_DIFFUSE_BOUNCE: u32 => PathDiffuseBounce(
        Main, Path, "path.diffuse_bounce", ALWAYS, Single
    );
    PATH_GLOSSY_BOUNCE: u32 => PathGlossyBounce(
        Main, Path, "path.glossy_bounce", ALWAYS, Single
    );
    PATH_TRANSMISSION_BOUNCE: u32 => PathTransmissionBounce(
        Main, Path, "path.transmission_bounce", ALWAYS, Single
    );
    PATH_VOLUME_BOUNCE: u32 => PathVolumeBounce(
        Main, Path, "path.volume_bounce", KernelFeatures::VOLUME, Single
    );
    PATH_TRANSPARENT_BOUNCE: u32 => PathTransparentBounce(
        Main, Path, "path.transparent_bounce", ALWAYS, Single
    );
    /// Raw [`crate::PathFlags`].
    PATH_FLAG: u32 => PathFlag(
        Main, Path, "path.flag", ALWAYS, Single
    );
    PATH_RNG_HASH: u32 => PathRngHash(
        Main, Path, "path.rng_hash", ALWAYS, Single
    );
    PATH_RNG_OFFSET: u32 => PathRngOffset(
        Main, Path, "path.rng_offset", ALWAYS, Single
    );
    PATH_THROUGHPUT: Vec3 => PathThroughput(
        Main, Path, "path.throughput", ALWAYS, Single
    );
    PATH_MIS_RAY_PDF: f32 => PathMisRayPdf(
        Main, Path, "path.mis_ray_pdf", ALWAYS, Single
    );
    PATH_MIS_RAY_T: f32 => PathMisRayT(
        Main, Path, "path.mis_ray_t", ALWAYS, Single
    );
    /// See: [`crate::DeviceKernel::from_queued()`].
    PATH_QUEUED_KERNEL: u32 => PathQueuedKernel(
        Main, Path, "path.queued_kernel", ALWAYS, Single
    );
    PATH_SHADER_SORT_KEY: u32 => PathShaderSortKey(
        Main, Path, "path.shader_sort_key", ALWAYS, Single
    );

    RAY_P: Vec3 => RayP(Main, Ray, "ray.P", ALWAYS, Single);
    RAY_D: Vec3 => RayD(Main, Ray, "ray.D", ALWAYS, Single);
    RAY_TMAX: f32 => RayTmax(Main, Ray, "ray.tmax", ALWAYS, Single);
    RAY_TIME: f32 => RayTime(Main, Ray, "ray.time", ALWAYS, Single);
    RAY_DP: f32 => RayDp(Main, Ray, "ray.dP", ALWAYS, Single);
    RAY_DD: f32 => RayDd(Main, Ray, "ray.dD", ALWAYS, Single);

    ISECT_T: f32 => IsectT(Main, Isect, "isect.t", ALWAYS, Single);
    ISECT_U: f32 => IsectU(Main, Isect, "isect.u", ALWAYS, Single);
    ISECT_V: f32 => IsectV(Main, Isect, "isect.v", ALWAYS, Single);
    ISECT_PRIM: u32 => IsectPrim(Main, Isect, "isect.prim", ALWAYS, Single);
    ISECT_OBJECT: u32 => IsectObject(
        Main, Isect, "isect.object", ALWAYS, Single
    );
    ISECT_TYPE: u32 => IsectType(Main, Isect, "isect.type", ALWAYS, Single);

    /// Terminated by [`VolumeStackEntry::NONE`].
    VOLUME_STACK: VolumeStackEntry => VolumeStack(
        Main, VolumeStack, "volume_stack", KernelFeatures::VOLUME, VolumeStack
    );

    SUBSURFACE_RADIUS: Vec3 => SubsurfaceRadius(
        Main,
        Subsurface,
        "subsurface.radius",
        KernelFeatures::SUBSURFACE,
        Single
    );
    SUBSURFACE_ALBEDO: Vec3 => SubsurfaceAlbedo(
        Main,
        Subsurface,
        "subsurface.albedo",
        KernelFeatures::SUBSURFACE,
        Single
    );

    SHADOW_PATH_RENDER_PIXEL_INDEX: u32 => ShadowPathRenderPixelIndex(
        Shadow, ShadowPath, "shadow_path.render_pixel_index", ALWAYS, Single
    );
    SHADOW_PATH_SAMPLE: u32 => ShadowPathSample(
        Shadow, ShadowPath, "shadow_path.sample", ALWAYS, Single
    );
    SHADOW_PATH_TRANSPARENT_BOUNCE: u32 => ShadowPathTransparentBounce(
        Shadow, ShadowPath, "shadow_path.transparent_bounce", ALWAYS, Single
    );
    SHADOW_PATH_FLAG: u32 => ShadowPathFlag(
        Shadow, ShadowPath, "shadow_path.flag", ALWAYS, Single
    );
    SHADOW_PATH_RNG_OFFSET: u32 => ShadowPathRngOffset(
        Shadow, ShadowPath, "shadow_path.rng_offset", ALWAYS, Single
    );
    SHADOW_PATH_THROUGHPUT: Vec3 => ShadowPathThroughput(
        Shadow, ShadowPath, "shadow_path.throughput", ALWAYS, Single
    );
    SHADOW_PATH_QUEUED_KERNEL: u32 => ShadowPathQueuedKernel(
        Shadow, ShadowPath, "shadow_path.queued_kernel", ALWAYS, Single
    );

    SHADOW_RAY_P: Vec3 => ShadowRayP(
        Shadow, ShadowRay, "shadow_ray.P", ALWAYS, Single
    );
    SHADOW_RAY_D: Vec3 => ShadowRayD(
        Shadow, ShadowRay, "shadow_ray.D", ALWAYS, Single
    );
    SHADOW_RAY_TMAX: f32 => ShadowRayTmax(
        Shadow, ShadowRay, "shadow_ray.tmax", ALWAYS, Single
    );
    SHADOW_RAY_TIME: f32 => ShadowRayTime(
        Shadow, ShadowRay, "shadow_ray.time", ALWAYS, Single
    );

    SHADOW_ISECT: ShadowHit => ShadowIsect(
        Shadow,
        ShadowIsect,
        "shadow_isect",
        KernelFeatures::TRANSPARENT_SHADOWS,
        ShadowIsect
    );
}
