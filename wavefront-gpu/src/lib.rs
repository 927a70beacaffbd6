//! Plain-old-data types shared between the wavefront scheduler and the
//! kernels it dispatches.
//!
//! Everything in here is `#[repr(C)]` and laid out so that it can be copied
//! into device memory as-is.

#![cfg_attr(target_arch = "spirv", no_std)]
#![allow(clippy::len_without_is_empty)]

mod features;
mod index;
mod kernel;
mod path_flags;
mod queue_counter;
mod state;
mod utils;
mod work_tile;

pub use self::features::*;
pub use self::index::*;
pub use self::kernel::*;
pub use self::path_flags::*;
pub use self::queue_counter::*;
pub use self::state::*;
pub use self::utils::*;
pub use self::work_tile::*;
