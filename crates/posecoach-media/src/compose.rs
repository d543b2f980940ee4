//! Side-by-side frame composition.

use image::imageops::{self, FilterType};
use image::RgbImage;

/// Tile size of each half of the comparison video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSize {
    pub width: u32,
    pub height: u32,
}

impl TileSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size of two tiles placed next to each other.
    pub fn combined(&self) -> (u32, u32) {
        (self.width * 2, self.height)
    }
}

impl Default for TileSize {
    fn default() -> Self {
        Self::new(480, 270)
    }
}

/// Resize `frame` to the tile unless it already fits.
pub fn fit_tile(frame: &RgbImage, tile: TileSize) -> RgbImage {
    if frame.dimensions() == (tile.width, tile.height) {
        frame.clone()
    } else {
        imageops::resize(frame, tile.width, tile.height, FilterType::Triangle)
    }
}

/// Place `left` and `right` next to each other, each fitted to `tile`.
pub fn side_by_side(left: &RgbImage, right: &RgbImage, tile: TileSize) -> RgbImage {
    let (w, h) = tile.combined();
    let mut canvas = RgbImage::new(w, h);
    imageops::replace(&mut canvas, &fit_tile(left, tile), 0, 0);
    imageops::replace(&mut canvas, &fit_tile(right, tile), tile.width as i64, 0);
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_side_by_side_layout() {
        let tile = TileSize::new(8, 4);
        let left = RgbImage::from_pixel(8, 4, Rgb([255, 0, 0]));
        let right = RgbImage::from_pixel(16, 8, Rgb([0, 0, 255]));

        let combined = side_by_side(&left, &right, tile);
        assert_eq!(combined.dimensions(), (16, 4));
        assert_eq!(combined.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(combined.get_pixel(7, 3).0, [255, 0, 0]);
        assert_eq!(combined.get_pixel(8, 0).0, [0, 0, 255]);
        assert_eq!(combined.get_pixel(15, 3).0, [0, 0, 255]);
    }

    #[test]
    fn test_default_tile() {
        assert_eq!(TileSize::default().combined(), (960, 270));
    }
}
