use super::Color;
use crate::config::hex_color;

use image::{imageops, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Image edge the swatch strip is attached to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    /// Above the image.
    Top,
    /// Below the image.
    #[default]
    Bottom,
    /// Left of the image.
    Left,
    /// Right of the image.
    Right,
}

impl Position {
    /// Every position, in display order.
    pub const ALL: [Position; 4] = [
        Position::Top,
        Position::Bottom,
        Position::Left,
        Position::Right,
    ];

    /// Lowercase name, as used in output file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Position::Top => "top",
            Position::Bottom => "bottom",
            Position::Left => "left",
            Position::Right => "right",
        }
    }

    /// `true` when swatches run along the image width.
    fn is_horizontal(&self) -> bool {
        matches!(self, Position::Top | Position::Bottom)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents an error for invalid input when parsing a position
#[derive(Debug, Error)]
#[error("invalid position, expected one of top, bottom, left, right")]
pub struct PositionParseError;

impl FromStr for Position {
    type Err = PositionParseError;

    fn from_str(s: &str) -> Result<Position, Self::Err> {
        Position::ALL
            .iter()
            .find(|p| s.trim().eq_ignore_ascii_case(p.as_str()))
            .copied()
            .ok_or(PositionParseError)
    }
}

/// Thickest image or swatch border [`compose`] draws, in pixels.
pub const MAX_BORDER_PX: u32 = 1000;

/// Everything [`compose`] needs besides the image and the palette.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Edge the swatch strip is attached to.
    pub position: Position,
    /// Border drawn around the whole composition, in pixels (at most
    /// [`MAX_BORDER_PX`]).
    pub image_border_px: u32,
    /// Outline drawn inside every swatch, in pixels (at most
    /// [`MAX_BORDER_PX`]).
    pub swatch_border_px: u32,
    /// Fill color of the image border.
    #[serde(with = "hex_color")]
    pub image_border_color: Color,
    /// Color of swatch outlines.
    #[serde(with = "hex_color")]
    pub swatch_border_color: Color,
    /// Strip thickness as a percentage (5-50) of the image height for
    /// top/bottom and of the image width for left/right.
    pub swatch_size_percent: u32,
    /// Skip the swatch outline along the seam with the image when there is
    /// no image border.
    pub remove_adjacent_border: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig {
            position: Position::Bottom,
            image_border_px: 0,
            swatch_border_px: 1,
            image_border_color: Color::new(255, 255, 255),
            swatch_border_color: Color::new(0, 0, 0),
            swatch_size_percent: 20,
            remove_adjacent_border: false,
        }
    }
}

/// A run of pixels along the shared axis.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Span {
    /// Offset of the first pixel.
    pub start: u32,
    /// Number of pixels.
    pub len: u32,
}

/// Strip thickness for an image side of `dimension` pixels.
///
/// `round(dimension * percent / 100)`, ties to even, never below 1.
pub fn strip_thickness(dimension: u32, percent: u32) -> u32 {
    let scaled = dimension as u64 * percent as u64;
    let (quotient, remainder) = (scaled / 100, scaled % 100);
    let rounded = if remainder > 50 || (remainder == 50 && quotient % 2 == 1) {
        quotient + 1
    } else {
        quotient
    };
    rounded.clamp(1, u32::MAX as u64) as u32
}

/// Splits `length` pixels into `count` segments of `length / count` pixels.
///
/// The remainder goes entirely to the last segment.
pub fn segments(length: u32, count: usize) -> Vec<Span> {
    if count == 0 {
        return Vec::new();
    }

    let base = (length as u64 / count as u64) as u32;
    let mut spans: Vec<Span> = (0..count)
        .map(|i| Span {
            start: base * i as u32,
            len: base,
        })
        .collect();
    if let Some(last) = spans.last_mut() {
        last.len = length - last.start;
    }
    spans
}

#[derive(Clone, Copy, Debug)]
struct Rect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Edge {
    Top,
    Bottom,
    Left,
    Right,
}

impl Rect {
    /// Band of `thickness` pixels along `edge`, inside the rectangle.
    fn edge_band(&self, edge: Edge, thickness: u32) -> Rect {
        match edge {
            Edge::Top | Edge::Bottom => {
                let t = thickness.min(self.height);
                let y = if edge == Edge::Top {
                    self.y
                } else {
                    self.y + self.height - t
                };
                Rect { y, height: t, ..*self }
            }
            Edge::Left | Edge::Right => {
                let t = thickness.min(self.width);
                let x = if edge == Edge::Left {
                    self.x
                } else {
                    self.x + self.width - t
                };
                Rect { x, width: t, ..*self }
            }
        }
    }
}

/// Placement of the image and the strip on the canvas.
struct Geometry {
    position: Position,
    canvas_width: u32,
    canvas_height: u32,
    image_x: u32,
    image_y: u32,
    strip: Rect,
}

impl Geometry {
    fn new(width: u32, height: u32, config: &LayoutConfig) -> Self {
        let border = image_border(config);
        let position = config.position;
        let dimension = if position.is_horizontal() { height } else { width };
        let thickness = strip_thickness(dimension, config.swatch_size_percent);

        let (canvas_width, canvas_height) = if position.is_horizontal() {
            (padded(width, 0, border), padded(height, thickness, border))
        } else {
            (padded(width, thickness, border), padded(height, 0, border))
        };

        let (image_x, image_y, strip_x, strip_y) = match position {
            Position::Top => (border, border.saturating_add(thickness), border, border),
            Position::Bottom => (border, border, border, border.saturating_add(height)),
            Position::Left => (border.saturating_add(thickness), border, border, border),
            Position::Right => (border, border, border.saturating_add(width), border),
        };

        let (strip_width, strip_height) = if position.is_horizontal() {
            (width, thickness)
        } else {
            (thickness, height)
        };

        Geometry {
            position,
            canvas_width,
            canvas_height,
            image_x,
            image_y,
            strip: Rect {
                x: strip_x,
                y: strip_y,
                width: strip_width,
                height: strip_height,
            },
        }
    }

    /// Length of the axis shared by the image and the strip.
    fn shared_length(&self) -> u32 {
        if self.position.is_horizontal() {
            self.strip.width
        } else {
            self.strip.height
        }
    }

    fn swatch_rect(&self, span: Span) -> Rect {
        if self.position.is_horizontal() {
            Rect {
                x: self.strip.x + span.start,
                width: span.len,
                ..self.strip
            }
        } else {
            Rect {
                y: self.strip.y + span.start,
                height: span.len,
                ..self.strip
            }
        }
    }

    /// Swatch edge that touches the image.
    fn seam(&self) -> Edge {
        match self.position {
            Position::Top => Edge::Bottom,
            Position::Bottom => Edge::Top,
            Position::Left => Edge::Right,
            Position::Right => Edge::Left,
        }
    }

    /// Edges shared between consecutive swatches, as (leading, trailing).
    fn separators(&self) -> (Edge, Edge) {
        if self.position.is_horizontal() {
            (Edge::Left, Edge::Right)
        } else {
            (Edge::Top, Edge::Bottom)
        }
    }
}

/// Renders `image` with one swatch per palette color along `config.position`.
///
/// The input is never modified; the result is always a freshly allocated
/// canvas. With an empty palette only the image border is added.
pub fn compose(image: &RgbImage, palette: &[Color], config: &LayoutConfig) -> RgbImage {
    let (width, height) = image.dimensions();
    let border = image_border(config);
    let swatch_border = config.swatch_border_px.min(MAX_BORDER_PX);
    let border_pixel = pixel(config.image_border_color);

    if palette.is_empty() {
        if border == 0 {
            return image.clone();
        }
        let mut canvas = RgbImage::from_pixel(
            padded(width, 0, border),
            padded(height, 0, border),
            border_pixel,
        );
        imageops::replace(&mut canvas, image, border as i64, border as i64);
        return canvas;
    }

    let geometry = Geometry::new(width, height, config);
    let mut canvas = RgbImage::from_pixel(geometry.canvas_width, geometry.canvas_height, border_pixel);
    imageops::replace(
        &mut canvas,
        image,
        geometry.image_x as i64,
        geometry.image_y as i64,
    );

    let spans = segments(geometry.shared_length(), palette.len());
    let last = spans.len() - 1;
    let (_, trailing) = geometry.separators();
    let skip_seam = config.remove_adjacent_border && border == 0;

    for (index, (span, color)) in spans.iter().zip(palette).enumerate() {
        let rect = geometry.swatch_rect(*span);
        fill_rect(&mut canvas, rect, pixel(*color));

        if swatch_border == 0 {
            continue;
        }

        for edge in [Edge::Top, Edge::Bottom, Edge::Left, Edge::Right] {
            // The next swatch draws the shared line as its leading edge.
            if edge == trailing && index < last {
                continue;
            }
            if skip_seam && edge == geometry.seam() {
                continue;
            }
            let band = rect.edge_band(edge, swatch_border);
            fill_rect(&mut canvas, band, pixel(config.swatch_border_color));
        }
    }

    canvas
}

fn image_border(config: &LayoutConfig) -> u32 {
    config.image_border_px.min(MAX_BORDER_PX)
}

/// `side + strip + 2 * border`, saturating.
fn padded(side: u32, strip: u32, border: u32) -> u32 {
    side.saturating_add(strip).saturating_add(border.saturating_mul(2))
}

fn pixel(color: Color) -> Rgb<u8> {
    Rgb([color.r, color.g, color.b])
}

fn fill_rect(canvas: &mut RgbImage, rect: Rect, value: Rgb<u8>) {
    let x_end = rect.x.saturating_add(rect.width).min(canvas.width());
    let y_end = rect.y.saturating_add(rect.height).min(canvas.height());
    for y in rect.y..y_end {
        for x in rect.x..x_end {
            canvas.put_pixel(x, y, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thickness_rounds_half_to_even() {
        assert_eq!(strip_thickness(100, 20), 20);
        assert_eq!(strip_thickness(50, 5), 2); // 2.5
        assert_eq!(strip_thickness(70, 5), 4); // 3.5
        assert_eq!(strip_thickness(31, 10), 3); // 3.1
        assert_eq!(strip_thickness(39, 10), 4); // 3.9
    }

    #[test]
    fn thickness_is_at_least_one_pixel() {
        assert_eq!(strip_thickness(10, 5), 1);
        assert_eq!(strip_thickness(1, 5), 1);
    }

    #[test]
    fn remainder_goes_to_last_segment() {
        let spans = segments(10, 3);
        assert_eq!(
            spans,
            vec![
                Span { start: 0, len: 3 },
                Span { start: 3, len: 3 },
                Span { start: 6, len: 4 },
            ]
        );
    }

    #[test]
    fn more_segments_than_pixels() {
        let spans = segments(2, 4);
        assert_eq!(spans.iter().map(|s| s.len).sum::<u32>(), 2);
        assert_eq!(spans[3], Span { start: 0, len: 2 });
        assert!(spans[..3].iter().all(|s| s.len == 0));
    }

    #[test]
    fn no_segments_for_empty_palette() {
        assert!(segments(100, 0).is_empty());
    }

    #[test]
    fn parses_positions() {
        assert_eq!("Left".parse::<Position>().unwrap(), Position::Left);
        assert_eq!(" top ".parse::<Position>().unwrap(), Position::Top);
        assert!("middle".parse::<Position>().is_err());
    }

    #[test]
    fn oversized_borders_are_capped() {
        let image = RgbImage::from_pixel(20, 20, Rgb([9, 9, 9]));
        let config = LayoutConfig {
            image_border_px: 1 << 31,
            swatch_border_px: u32::MAX,
            ..LayoutConfig::default()
        };

        let padded = compose(&image, &[], &config);
        assert_eq!(padded.dimensions(), (2020, 2020));

        let canvas = compose(&image, &[Color::new(1, 2, 3)], &config);
        assert_eq!(canvas.dimensions(), (2020, 2024));
        assert_eq!(canvas.get_pixel(1000, 1000), &Rgb([9, 9, 9]));
    }

    #[test]
    fn padding_saturates_instead_of_overflowing() {
        assert_eq!(padded(u32::MAX - 1, 5, 3), u32::MAX);
        assert_eq!(padded(10, 2, 3), 18);
    }

    #[test]
    fn edge_bands_stay_inside_the_rectangle() {
        let rect = Rect {
            x: 10,
            y: 20,
            width: 5,
            height: 3,
        };
        let bottom = rect.edge_band(Edge::Bottom, 10);
        assert_eq!((bottom.y, bottom.height), (20, 3));
        let right = rect.edge_band(Edge::Right, 2);
        assert_eq!((right.x, right.width, right.height), (13, 2, 3));
    }
}
