#[macro_use]
extern crate bencher;
extern crate color_swatch;
extern crate image;

use bencher::Bencher;
use color_swatch::{compose, extract, LayoutConfig, Position, QuantizeMethod};
use image::{DynamicImage, Rgb, RgbImage};

fn gradient() -> RgbImage {
    RgbImage::from_fn(640, 480, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) / 5 % 256) as u8])
    })
}

fn median_cut(bench: &mut Bencher) {
    let image = DynamicImage::ImageRgb8(gradient());
    bench.iter(|| extract(&image, 10, QuantizeMethod::MedianCut))
}

fn max_coverage(bench: &mut Bencher) {
    let image = DynamicImage::ImageRgb8(gradient());
    bench.iter(|| extract(&image, 10, QuantizeMethod::MaxCoverage))
}

fn fast_octree(bench: &mut Bencher) {
    let image = DynamicImage::ImageRgb8(gradient());
    bench.iter(|| extract(&image, 10, QuantizeMethod::FastOctree))
}

fn compose_bottom(bench: &mut Bencher) {
    let image = gradient();
    let palette = extract(&DynamicImage::ImageRgb8(image.clone()), 10, QuantizeMethod::MedianCut).palette;
    let layout = LayoutConfig {
        position: Position::Bottom,
        image_border_px: 8,
        swatch_border_px: 2,
        ..LayoutConfig::default()
    };
    bench.iter(|| compose(&image, &palette, &layout))
}

benchmark_group!(benches, median_cut, max_coverage, fast_octree, compose_bottom);
benchmark_main!(benches);
