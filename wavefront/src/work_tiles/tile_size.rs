#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TileSize {
    pub width: u32,
    pub height: u32,
    pub num_samples: u32,
}

impl TileSize {
    pub fn new(width: u32, height: u32, num_samples: u32) -> Self {
        Self {
            width,
            height,
            num_samples,
        }
    }

    pub fn num_paths(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.num_samples as u64
    }
}

/// Picks a tile size so that a single tile fits into `max_num_path_states`.
///
/// Tiles are kept square and power-of-two sized, with as many samples as
/// possible; an image that fits as a whole is rendered as a single tile.
pub fn tile_calculate_best_size(
    width: u32,
    height: u32,
    num_samples: u32,
    max_num_path_states: u32,
) -> TileSize {
    if max_num_path_states <= 1 {
        return TileSize::new(1, 1, 1);
    }

    let num_pixel_samples =
        width as u64 * height as u64 * num_samples as u64;

    if max_num_path_states as u64 >= num_pixel_samples {
        return TileSize::new(width, height, num_samples);
    }

    let num_samples = num_samples.max(1);
    let num_path_states_per_sample = max_num_path_states / num_samples;

    let side = if num_path_states_per_sample == 0 {
        1
    } else {
        let side =
            round_down_to_power_of_two(lround_sqrt(num_path_states_per_sample));

        // Rounding the square root up can overshoot
        if side * side > num_path_states_per_sample {
            side / 2
        } else {
            side
        }
    };

    let mut tile_size = TileSize::new(side, side, 1);

    if num_samples > 1 {
        let tile_area = side * side;

        tile_size.num_samples = lround_sqrt(num_samples / 2)
            .next_power_of_two()
            .min(num_samples)
            .min(max_num_path_states / tile_area);
    }

    tile_size
}

fn lround_sqrt(value: u32) -> u32 {
    (value as f64).sqrt().round() as u32
}

fn round_down_to_power_of_two(value: u32) -> u32 {
    if value == 0 {
        0
    } else {
        1 << (u32::BITS - 1 - value.leading_zeros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_state() {
        assert_eq!(
            TileSize::new(1, 1, 1),
            tile_calculate_best_size(1920, 1080, 64, 1)
        );
    }

    #[test]
    fn whole_image() {
        assert_eq!(
            TileSize::new(4, 2, 3),
            tile_calculate_best_size(4, 2, 3, 24)
        );

        assert_eq!(
            TileSize::new(4, 2, 3),
            tile_calculate_best_size(4, 2, 3, 1000)
        );
    }

    #[test]
    fn single_sample() {
        // sqrt(1024) = 32 -> 32
        assert_eq!(
            TileSize::new(32, 32, 1),
            tile_calculate_best_size(1920, 1080, 1, 1024)
        );

        // sqrt(1000) = 31.6 -> 32 -> 32, which doesn't fit -> 16
        assert_eq!(
            TileSize::new(16, 16, 1),
            tile_calculate_best_size(1920, 1080, 1, 1000)
        );

        // sqrt(900) = 30 -> 16
        assert_eq!(
            TileSize::new(16, 16, 1),
            tile_calculate_best_size(1920, 1080, 1, 900)
        );
    }

    #[test]
    fn many_samples() {
        // per sample: 65536 / 128 = 512; sqrt(512) = 22.6 -> 23 -> 16
        // samples: sqrt(128 / 2) = 8 -> 8
        assert_eq!(
            TileSize::new(16, 16, 8),
            tile_calculate_best_size(1920, 1080, 128, 65536)
        );

        // per sample: 100 / 50 = 2; sqrt(2) = 1.4 -> 1 -> 1
        // samples: sqrt(50 / 2) = 5 -> 8, capped by 100 / 1
        assert_eq!(
            TileSize::new(1, 1, 8),
            tile_calculate_best_size(1920, 1080, 50, 100)
        );
    }

    #[test]
    fn fewer_states_than_samples() {
        let actual = tile_calculate_best_size(64, 64, 1024, 256);

        assert_eq!(1, actual.width);
        assert_eq!(1, actual.height);
        assert!(actual.num_paths() <= 256);
    }

    #[test]
    fn tiles_always_fit() {
        for states in [2, 3, 7, 8, 100, 1000, 4096, 100_000] {
            for samples in [1, 2, 3, 16, 100, 1024] {
                let actual =
                    tile_calculate_best_size(640, 480, samples, states);

                assert!(
                    actual.num_paths() <= states as u64,
                    "states={states}, samples={samples}, actual={actual:?}"
                );
            }
        }
    }

    #[test]
    fn powers_of_two() {
        assert_eq!(0, round_down_to_power_of_two(0));
        assert_eq!(1, round_down_to_power_of_two(1));
        assert_eq!(2, round_down_to_power_of_two(3));
        assert_eq!(16, round_down_to_power_of_two(23));
        assert_eq!(32, round_down_to_power_of_two(32));
    }
}
