/// Window of the image a scheduler renders into its render buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferParams {
    pub width: u32,
    pub height: u32,

    /// Position of the window within the full image.
    pub full_x: u32,
    pub full_y: u32,

    /// Offset and stride mapping full-image coordinates into a render-buffer
    /// pixel index; see [`crate::gpu::WorkTile::render_pixel_index()`].
    pub offset: i32,
    pub stride: i32,
}

impl BufferParams {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            full_x: 0,
            full_y: 0,
            offset: 0,
            stride: width as i32,
        }
    }

    pub fn with_full_offset(mut self, full_x: u32, full_y: u32) -> Self {
        self.full_x = full_x;
        self.full_y = full_y;
        self.offset = -(full_x as i32 + full_y as i32 * self.stride);
        self
    }

    pub fn num_pixels(&self) -> u32 {
        self.width * self.height
    }
}
