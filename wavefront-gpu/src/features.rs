use bitflags::bitflags;

bitflags! {
    /// Scene features that decide which parts of the path state get
    /// allocated and which kernels may be queued.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct KernelFeatures: u32 {
        const VOLUME = 1 << 0;
        const SUBSURFACE = 1 << 1;
        const HAIR = 1 << 2;
        const AO = 1 << 3;
        const SHADOW_CATCHER = 1 << 4;
        const TRANSPARENT_SHADOWS = 1 << 5;
        const NODE_RAYTRACE = 1 << 6;
        const MNEE = 1 << 7;
        const BAKING = 1 << 8;
    }
}
