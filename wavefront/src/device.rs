mod host;
mod queue;
mod wgpu_queue;

pub use self::host::*;
pub use self::queue::*;
pub use self::wgpu_queue::*;
