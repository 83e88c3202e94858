//! Configuration for a swatch run.
//!
//! A [`SwatchConfig`] bundles the extraction parameters, one layout template
//! applied to every requested position, and the output settings. It can be
//! built programmatically or loaded from JSON:
//!
//! ```no_run
//! use color_swatch::config::SwatchConfig;
//! use std::path::Path;
//!
//! let config = SwatchConfig::from_json_file(Path::new("swatch.json"))?;
//! config.validate()?;
//! # Ok::<(), color_swatch::batch::BatchError>(())
//! ```
//!
//! Colors are written as `#RRGGBB` strings.

use crate::batch::{BatchError, OutputFormat};
use crate::{Color, LayoutConfig, Position, QuantizeMethod, MAX_BORDER_PX};

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;
use thiserror::Error;

/// Accepted number of palette colors.
pub const NUM_COLORS: RangeInclusive<u8> = 2..=12;
/// Accepted swatch strip size, in percent of the image dimension.
pub const SWATCH_SIZE_PERCENT: RangeInclusive<u32> = 5..=50;
/// Accepted image and swatch border thickness, in pixels.
pub const BORDER_PX: RangeInclusive<u32> = 0..=MAX_BORDER_PX;
/// Accepted output scale, in percent.
pub const SCALE_PERCENT: RangeInclusive<u32> = 10..=200;
/// Accepted input image side length, in pixels.
pub const IMAGE_SIDE: RangeInclusive<u32> = 10..=10_000;

/// Complete configuration for processing a batch of images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwatchConfig {
    /// Positions to render; each yields its own output per image.
    pub positions: Vec<Position>,
    /// Layout template. Its `position` is replaced by each entry of `positions`.
    pub layout: LayoutConfig,
    /// Palette extraction parameters.
    pub extract: ExtractConfig,
    /// Output scaling and encoding.
    pub output: OutputConfig,
}

/// Palette extraction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Number of colors to extract (2-12).
    pub num_colors: u8,
    /// Primary quantization method.
    pub method: QuantizeMethod,
}

/// Output scaling and encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Resize factor applied to the composed image (10-200).
    pub scale_percent: u32,
    /// Encoded file format.
    pub format: OutputFormat,
}

impl Default for SwatchConfig {
    fn default() -> Self {
        SwatchConfig {
            positions: vec![Position::Bottom],
            layout: LayoutConfig::default(),
            extract: ExtractConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        ExtractConfig {
            num_colors: 6,
            method: QuantizeMethod::MedianCut,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            scale_percent: 100,
            format: OutputFormat::Png,
        }
    }
}

impl SwatchConfig {
    /// Layout for one position, based on the template.
    pub fn layout_for(&self, position: Position) -> LayoutConfig {
        LayoutConfig {
            position,
            ..self.layout.clone()
        }
    }

    /// Checks every documented range.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.positions.is_empty() {
            return Err(invalid("positions", "[]"));
        }
        if !NUM_COLORS.contains(&self.extract.num_colors) {
            return Err(invalid("num_colors", self.extract.num_colors));
        }
        if !SWATCH_SIZE_PERCENT.contains(&self.layout.swatch_size_percent) {
            return Err(invalid(
                "swatch_size_percent",
                self.layout.swatch_size_percent,
            ));
        }
        if !BORDER_PX.contains(&self.layout.image_border_px) {
            return Err(invalid("image_border_px", self.layout.image_border_px));
        }
        if !BORDER_PX.contains(&self.layout.swatch_border_px) {
            return Err(invalid("swatch_border_px", self.layout.swatch_border_px));
        }
        if !SCALE_PERCENT.contains(&self.output.scale_percent) {
            return Err(invalid("scale_percent", self.output.scale_percent));
        }
        Ok(())
    }

    /// Load configuration from JSON file
    pub fn from_json_file(path: &Path) -> Result<Self, BatchError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn to_json_file(&self, path: &Path) -> Result<(), BatchError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn invalid(parameter: &'static str, value: impl ToString) -> BatchError {
    BatchError::InvalidParameter {
        parameter,
        value: value.to_string(),
    }
}

/// Represents an error for invalid input when parsing a hex color
#[derive(Debug, Error)]
#[error("invalid hex color {0:?}, expected #RRGGBB")]
pub struct HexColorError(String);

/// Parses `#RRGGBB` (the `#` is optional).
pub fn parse_hex_color(s: &str) -> Result<Color, HexColorError> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(HexColorError(s.to_string()));
    }

    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16).map_err(|_| HexColorError(s.to_string()))
    };
    Ok(Color::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

/// Formats a color as `#RRGGBB`.
pub fn to_hex_color(color: Color) -> String {
    format!("#{:02X}{:02X}{:02X}", color.r, color.g, color.b)
}

/// Serde adapter storing a [`Color`] as a `#RRGGBB` string.
pub mod hex_color {
    use super::{parse_hex_color, to_hex_color};
    use crate::Color;
    use serde::{de, Deserialize, Deserializer, Serializer};

    /// Serializes `color` as `#RRGGBB`.
    pub fn serialize<S: Serializer>(color: &Color, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_hex_color(*color))
    }

    /// Deserializes a `#RRGGBB` string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Color, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_hex_color(&s).map_err(de::Error::custom)
    }
}
