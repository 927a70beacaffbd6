use crate::gpu::WorkTile;
use crate::{tile_calculate_best_size, BufferParams, TileSize, WorkTileSource};

/// Splits an image window and a range of samples into work tiles.
///
/// Tiles cover the whole window for one range of samples before moving on
/// to the next range, so that the image converges evenly.
#[derive(Clone, Debug, Default)]
pub struct WorkTileScheduler {
    max_num_path_states: u32,
    buffer_params: Option<BufferParams>,
    start_sample: u32,
    num_samples: u32,
    sample_offset: u32,
    tile_size: TileSize,
    num_tiles_x: u32,
    num_tiles_per_sample_range: u32,
    total_tiles: u32,
    next_work_index: u32,
}

impl WorkTileScheduler {
    /// Sets the number of path states a single tile may occupy; takes
    /// effect on the next [`Self::reset()`].
    pub fn set_max_num_path_states(&mut self, max_num_path_states: u32) {
        self.max_num_path_states = max_num_path_states;
    }

    pub fn reset(
        &mut self,
        buffer_params: BufferParams,
        start_sample: u32,
        num_samples: u32,
        sample_offset: u32,
    ) {
        self.buffer_params = Some(buffer_params);
        self.start_sample = start_sample;
        self.num_samples = num_samples;
        self.sample_offset = sample_offset;

        self.tile_size = tile_calculate_best_size(
            buffer_params.width,
            buffer_params.height,
            num_samples,
            self.max_num_path_states,
        );

        self.num_tiles_x =
            divide_up(buffer_params.width, self.tile_size.width);

        let num_tiles_y =
            divide_up(buffer_params.height, self.tile_size.height);

        let num_sample_ranges =
            divide_up(num_samples, self.tile_size.num_samples);

        self.num_tiles_per_sample_range = self.num_tiles_x * num_tiles_y;
        self.total_tiles = self.num_tiles_per_sample_range * num_sample_ranges;
        self.next_work_index = 0;

        log::debug!(
            "Work tiles reset; tile_size={:?}, total_tiles={}",
            self.tile_size,
            self.total_tiles,
        );
    }

    pub fn tile_size(&self) -> TileSize {
        self.tile_size
    }

    pub fn total_tiles(&self) -> u32 {
        self.total_tiles
    }

    pub fn num_remaining_tiles(&self) -> u32 {
        self.total_tiles - self.next_work_index
    }
}

impl WorkTileSource for WorkTileScheduler {
    fn get_work(&mut self, max_work_size: u32) -> Option<WorkTile> {
        let params = self.buffer_params?;

        if self.next_work_index >= self.total_tiles {
            return None;
        }

        let work_index = self.next_work_index;
        let sample_range = work_index / self.num_tiles_per_sample_range;
        let start_sample = sample_range * self.tile_size.num_samples;
        let tile_index = work_index % self.num_tiles_per_sample_range;
        let tile_y = tile_index / self.num_tiles_x;
        let tile_x = tile_index % self.num_tiles_x;

        let x = tile_x * self.tile_size.width;
        let y = tile_y * self.tile_size.height;

        let tile = WorkTile {
            x: params.full_x + x,
            y: params.full_y + y,
            w: self.tile_size.width.min(params.width - x),
            h: self.tile_size.height.min(params.height - y),
            start_sample: self.start_sample + start_sample,
            num_samples: self
                .tile_size
                .num_samples
                .min(self.num_samples - start_sample),
            sample_offset: self.sample_offset,
            offset: params.offset,
            stride: params.stride,
            path_index_offset: 0,
            work_size: 0,
        };

        if max_work_size > 0 && tile.num_paths() > max_work_size {
            // Leave the tile for later, when more states are free
            return None;
        }

        self.next_work_index += 1;

        Some(tile)
    }

    fn has_work(&self) -> bool {
        self.buffer_params.is_some() && self.next_work_index < self.total_tiles
    }
}

fn divide_up(x: u32, y: u32) -> u32 {
    if y == 0 {
        0
    } else {
        (x + y - 1) / y
    }
}
