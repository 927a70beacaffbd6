use bytemuck::{Pod, Zeroable};

/// Rectangle of pixels times a range of samples, handed out by the work-tile
/// scheduler and turned into fresh path states by the init kernels.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct WorkTile {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,

    pub start_sample: u32,
    pub num_samples: u32,
    pub sample_offset: u32,

    /// Offset and stride used to map (x, y) into a render-buffer pixel index.
    pub offset: i32,
    pub stride: i32,

    /// First path index claimed by this tile; stamped by the scheduler.
    pub path_index_offset: u32,

    /// Number of paths this tile produces; stamped by the scheduler.
    pub work_size: u32,
}

impl WorkTile {
    /// Number of path states this tile turns into.
    pub fn num_paths(&self) -> u32 {
        self.w * self.h * self.num_samples
    }

    /// Maps work item within this tile into its pixel coordinates and
    /// sample number.
    ///
    /// Samples of the same pixel are adjacent, so neighbouring work items
    /// trace similar rays.
    pub fn pixel(&self, tile_work_index: u32) -> (u32, u32, u32) {
        let sample_offset = tile_work_index % self.num_samples;
        let pixel_offset = tile_work_index / self.num_samples;
        let y_offset = pixel_offset / self.w;
        let x_offset = pixel_offset - y_offset * self.w;

        (
            self.x + x_offset,
            self.y + y_offset,
            self.start_sample + sample_offset,
        )
    }

    /// Render-buffer pixel index of given pixel.
    pub fn render_pixel_index(&self, x: u32, y: u32) -> u32 {
        (self.offset + x as i32 + (y as i32) * self.stride) as u32
    }
}
