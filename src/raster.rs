//! Conversion of incoming pixel data to opaque RGB.
//!
//! Everything downstream works on [`RgbImage`]. Alpha is dropped without
//! compositing, so transparent areas keep whatever color they carry.

use image::{DynamicImage, RgbImage};

/// Converts any decoded image to RGB, dropping alpha.
pub fn normalize(image: &DynamicImage) -> RgbImage {
    match image {
        DynamicImage::ImageRgb8(buffer) => buffer.clone(),
        other => other.to_rgb8(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{LumaA, Rgb, Rgba, RgbaImage};

    #[test]
    fn alpha_is_dropped_not_composited() {
        let rgba = RgbaImage::from_pixel(3, 3, Rgba([10, 20, 30, 0]));
        let rgb = normalize(&DynamicImage::ImageRgba8(rgba));
        assert!(rgb.pixels().all(|p| *p == Rgb([10, 20, 30])));
    }

    #[test]
    fn gray_is_expanded_to_three_channels() {
        let gray = image::GrayAlphaImage::from_pixel(2, 2, LumaA([77, 255]));
        let rgb = normalize(&DynamicImage::ImageLumaA8(gray));
        assert_eq!(rgb.dimensions(), (2, 2));
        assert!(rgb.pixels().all(|p| *p == Rgb([77, 77, 77])));
    }
}
