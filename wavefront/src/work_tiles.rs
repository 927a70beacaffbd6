mod buffer_params;
mod scheduler;
mod tile_size;

use std::collections::VecDeque;

pub use self::buffer_params::*;
pub use self::scheduler::*;
pub use self::tile_size::*;
use crate::gpu::WorkTile;

/// Source of work tiles the wavefront scheduler fills its path states from.
pub trait WorkTileSource {
    /// Returns the next tile, or `None` if there are no more tiles or the
    /// next one would produce more than `max_work_size` paths.
    ///
    /// `max_work_size` of zero means no limit.
    fn get_work(&mut self, max_work_size: u32) -> Option<WorkTile>;

    /// Whether any tile is left, regardless of its size.
    fn has_work(&self) -> bool;
}

/// Fixed list of tiles, handed out front to back.
impl WorkTileSource for VecDeque<WorkTile> {
    fn get_work(&mut self, max_work_size: u32) -> Option<WorkTile> {
        let tile = self.front()?;

        if max_work_size > 0 && tile.num_paths() > max_work_size {
            return None;
        }

        self.pop_front()
    }

    fn has_work(&self) -> bool {
        !self.is_empty()
    }
}
