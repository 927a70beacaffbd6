use crate::gpu::DeviceKernel;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Device reported a failure; the current frame can't be completed.
    #[error("device failure while {stage}")]
    Device { stage: &'static str },

    #[error("queue counter of `{kernel}` went negative ({count})")]
    NegativeQueueCounter { kernel: DeviceKernel, count: i32 },

    #[error(
        "{space} path states exceed capacity ({queued} queued, capacity is \
         {capacity})"
    )]
    CapacityExceeded {
        space: &'static str,
        queued: i64,
        capacity: u32,
    },

    /// Paths are reported as active, but nothing could be admitted or
    /// dispatched - the queue counters disagree with the path states.
    #[error("scheduler stalled with {active_paths} active path(s)")]
    Stalled { active_paths: i64 },

    #[error(
        "device can't hold {min_num_paths} path state(s) of {state_size} \
         bytes"
    )]
    NoCapacity {
        state_size: usize,
        min_num_paths: u32,
    },

    /// Pool is empty, but the next work tile still needs more paths than
    /// admission may create at once.
    #[error(
        "work tile doesn't fit into the path states (at most \
         {max_num_paths} path(s) can be admitted)"
    )]
    WorkTileTooLarge { max_num_paths: u32 },
}

/// Failure raised by a kernel while it runs; the device records it and
/// reports it through the next synchronization.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct KernelFault(String);

impl KernelFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
