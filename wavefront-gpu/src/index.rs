use core::fmt;
use core::marker::PhantomData;

/// Index space a path state lives in.
///
/// Main paths and shadow paths are stored in separate arrays of equal
/// capacity; an index is only meaningful together with its space, so the
/// space is part of the index type.
pub trait IndexSpace: Copy + 'static {
    const NAME: &'static str;
    const SHADOW: bool;
}

/// Camera paths (and their shadow-catcher split copies).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Main {}

/// Paths currently evaluating occlusion towards a light.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Shadow {}

impl IndexSpace for Main {
    const NAME: &'static str = "main";
    const SHADOW: bool = false;
}

impl IndexSpace for Shadow {
    const NAME: &'static str = "shadow";
    const SHADOW: bool = true;
}

pub struct StateIndex<S> {
    index: u32,
    _space: PhantomData<S>,
}

pub type MainPathIndex = StateIndex<Main>;
pub type ShadowPathIndex = StateIndex<Shadow>;

impl<S> StateIndex<S> {
    pub const fn new(index: u32) -> Self {
        Self {
            index,
            _space: PhantomData,
        }
    }

    pub fn get(self) -> u32 {
        self.index
    }
}

impl<S> Clone for StateIndex<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for StateIndex<S> {
    //
}

impl<S> PartialEq for StateIndex<S> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<S> Eq for StateIndex<S> {
    //
}

impl<S> core::hash::Hash for StateIndex<S> {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<S> fmt::Debug for StateIndex<S>
where
    S: IndexSpace,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", S::NAME, self.index)
    }
}

/// Main-space slot claimed by a shadow-catcher split that hasn't received
/// its copy of the parent state yet.
///
/// It turns into a regular [`MainPathIndex`] once the copy is done, so that
/// a half-initialized state can't be handed to a kernel by accident.
#[derive(Debug, PartialEq, Eq)]
pub struct SplitPathIndex(u32);

impl SplitPathIndex {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn get(&self) -> u32 {
        self.0
    }

    pub fn into_main(self) -> MainPathIndex {
        MainPathIndex::new(self.0)
    }
}

/// Any path index, tagged with the space it belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PathIndex {
    Main(MainPathIndex),
    Shadow(ShadowPathIndex),
}

impl PathIndex {
    pub fn get(self) -> u32 {
        match self {
            PathIndex::Main(index) => index.get(),
            PathIndex::Shadow(index) => index.get(),
        }
    }

    pub fn main(self) -> Option<MainPathIndex> {
        if let PathIndex::Main(index) = self {
            Some(index)
        } else {
            None
        }
    }

    pub fn shadow(self) -> Option<ShadowPathIndex> {
        if let PathIndex::Shadow(index) = self {
            Some(index)
        } else {
            None
        }
    }
}

impl From<MainPathIndex> for PathIndex {
    fn from(index: MainPathIndex) -> Self {
        PathIndex::Main(index)
    }
}

impl From<ShadowPathIndex> for PathIndex {
    fn from(index: ShadowPathIndex) -> Self {
        PathIndex::Shadow(index)
    }
}
