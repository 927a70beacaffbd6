use bitflags::bitflags;

bitflags! {
    /// Contents of a path's `flag` field.
    ///
    /// Stored as a raw `u32` in the path state; use
    /// [`PathFlags::from_bits_retain()`] when reading it back.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PathFlags: u32 {
        const CAMERA = 1 << 0;
        const REFLECT = 1 << 1;
        const TRANSMIT = 1 << 2;
        const DIFFUSE = 1 << 3;
        const GLOSSY = 1 << 4;
        const SINGULAR = 1 << 5;
        const TRANSPARENT = 1 << 6;
        const VOLUME_SCATTER = 1 << 7;

        const SHADOW_OPAQUE = 1 << 8;
        const SHADOW_TRANSPARENT = 1 << 9;
        const SHADOW_FOR_AO = 1 << 10;

        /// Camera path whose background may be replaced by a shadow catcher,
        /// i.e. a path that can still split.
        const TRANSPARENT_BACKGROUND = 1 << 16;

        /// Path has hit a shadow catcher and was split; it can't split again.
        const SHADOW_CATCHER_HIT = 1 << 17;

        /// Copy created by a shadow catcher split.
        const SHADOW_CATCHER_PASS = 1 << 18;
    }
}

impl PathFlags {
    /// Whether a live path carrying these flags may still perform a
    /// shadow-catcher split.
    pub fn can_split(self) -> bool {
        self.contains(Self::TRANSPARENT_BACKGROUND)
            && !self.contains(Self::SHADOW_CATCHER_HIT)
    }
}
