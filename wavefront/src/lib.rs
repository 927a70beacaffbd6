//! Wavefront scheduler for a GPU path tracer.
//!
//! The renderer splits path tracing into many small kernels (intersect,
//! shade surface, shade shadow, ...) and keeps a pool of suspended path
//! states; this crate decides which kernel runs next, over which states, and
//! keeps the pool densely packed.
//!
//! The entry point is [`WavefrontScheduler`]; kernels are executed by a
//! [`DeviceQueue`] - either [`HostQueue`], which runs them on the CPU, or
//! [`WgpuQueue`].

mod buffers;
mod device;
mod error;
mod scheduler;
mod state;
mod utils;
mod work_tiles;

#[cfg(test)]
mod testing;

pub use wavefront_gpu as gpu;

pub use self::buffers::*;
pub use self::device::*;
pub use self::error::*;
pub use self::scheduler::*;
pub use self::state::*;
pub use self::work_tiles::*;
