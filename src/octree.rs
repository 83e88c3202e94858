use super::{Color, ColorTable, QuantizeError, Quantizer};
use image::RgbImage;
use std::collections::HashMap;
use std::num::NonZeroU8;
use thiserror::Error;

const MAX_DEPTH: u8 = 8;
const FAST_DEPTH: u8 = 4;

/// Represents an error that can occur during octree quantization.
#[derive(Clone, Copy, PartialEq, Debug, Error)]
pub enum OctreeError {
    /// The image has no pixels to build the tree from.
    #[error("image has no pixels")]
    NoPixels,
}

/// Fast octree quantizer.
///
/// Colors are bucketed into the leaves of an octree cut off at a fixed
/// depth; each leaf contributes the mean of the true colors that fell into
/// it, most populated leaves first.
pub struct Octree {
    /// Tree depth, clamped to 8. Defaults to 4 levels (4096 leaves).
    pub max_depth: Option<NonZeroU8>,
}

impl Octree {
    /// Creates an octree quantizer with the given depth.
    pub fn new(max_depth: Option<NonZeroU8>) -> Self {
        Octree { max_depth }
    }
}

impl Default for Octree {
    fn default() -> Self {
        Octree::new(None)
    }
}

#[derive(Default)]
struct Leaf {
    count: u64,
    r_sum: u64,
    g_sum: u64,
    b_sum: u64,
}

impl Leaf {
    fn average(&self) -> Color {
        let half = self.count / 2;
        Color::new(
            ((self.r_sum + half) / self.count) as u8,
            ((self.g_sum + half) / self.count) as u8,
            ((self.b_sum + half) / self.count) as u8,
        )
    }
}

impl Quantizer for Octree {
    fn quantize(&self, image: &RgbImage, max_colors: u8) -> Result<ColorTable, QuantizeError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(OctreeError::NoPixels.into());
        }

        let depth = self.max_depth.map_or(FAST_DEPTH, |d| d.get()).min(MAX_DEPTH);

        let mut leaves: HashMap<u32, Leaf> = HashMap::new();
        for pixel in image.pixels() {
            let [r, g, b] = pixel.0;
            let leaf = leaves.entry(leaf_index(r, g, b, depth)).or_default();
            leaf.count += 1;
            leaf.r_sum += r as u64;
            leaf.g_sum += g as u64;
            leaf.b_sum += b as u64;
        }

        // Most common first, ties broken by position in the tree.
        let mut leaves: Vec<_> = leaves.into_iter().collect();
        leaves.sort_by(|a, b| b.1.count.cmp(&a.1.count).then_with(|| a.0.cmp(&b.0)));
        leaves.truncate(max_colors as usize);

        let colors: Vec<Color> = leaves.iter().map(|(_, leaf)| leaf.average()).collect();
        Ok(ColorTable::from_colors(&colors))
    }
}

/// Path from the root to the leaf holding `(r, g, b)`, three bits per level.
fn leaf_index(r: u8, g: u8, b: u8, depth: u8) -> u32 {
    (0..depth).fold(0, |index, level| {
        let bit = 7 - level;
        let child = (((r >> bit) & 1) << 2) | (((g >> bit) & 1) << 1) | ((b >> bit) & 1);
        (index << 3) | child as u32
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn leaf_index_walks_most_significant_bits_first() {
        assert_eq!(leaf_index(0, 0, 0, 4), 0);
        assert_eq!(leaf_index(0x80, 0, 0, 1), 0b100);
        assert_eq!(leaf_index(0x80, 0x40, 0xff, 2), 0b101_011);
    }

    #[test]
    fn most_populated_leaf_comes_first() {
        let image = RgbImage::from_fn(10, 10, |x, _| {
            if x < 7 {
                Rgb([10, 200, 10])
            } else {
                Rgb([250, 0, 0])
            }
        });
        let colors = Octree::default().quantize(&image, 6).unwrap().colors(6);
        assert_eq!(colors, vec![Color::new(10, 200, 10), Color::new(250, 0, 0)]);
    }

    #[test]
    fn leaf_colors_are_true_averages() {
        let image = RgbImage::from_fn(2, 1, |x, _| Rgb([100 + x as u8 * 2, 50, 50]));
        let colors = Octree::default().quantize(&image, 2).unwrap().colors(2);
        assert_eq!(colors, vec![Color::new(101, 50, 50)]);
    }

    #[test]
    fn empty_image_fails() {
        let result = Octree::default().quantize(&RgbImage::new(0, 0), 4);
        assert!(matches!(result, Err(QuantizeError::Octree(OctreeError::NoPixels))));
    }
}
