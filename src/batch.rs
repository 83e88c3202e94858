//! Batch processing: decode, extract, compose, scale and encode.
//!
//! A batch is a flat list of images; each image is extracted once and
//! composed once per configured position. Images are processed in parallel
//! and failures stay local to the image (or position) they happened in.

use crate::config::{SwatchConfig, IMAGE_SIDE};
use crate::{compose, extract_rgb, raster, Color, Diagnostic, DiagnosticKind, Position};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageError, ImageFormat, RgbImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

/// JPEG quality used for lossy output.
pub const JPEG_QUALITY: u8 = 95;

/// Represents an error that can occur while processing a batch.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The input bytes could not be decoded as an image.
    #[error("failed to decode image: {0}")]
    Decode(#[source] ImageError),
    /// The image is too small or too large to process.
    #[error("image is {width}x{height} px, each side must be within {min}..={max} px")]
    DimensionsOutOfRange {
        /// Image width.
        width: u32,
        /// Image height.
        height: u32,
        /// Smallest accepted side.
        min: u32,
        /// Largest accepted side.
        max: u32,
    },
    /// A configuration value is out of range.
    #[error("invalid parameter: {parameter} = {value}")]
    InvalidParameter {
        /// Parameter name.
        parameter: &'static str,
        /// Offending value.
        value: String,
    },
    /// The composed image could not be encoded.
    #[error("failed to encode {format} output: {source}")]
    Encode {
        /// Requested format.
        format: OutputFormat,
        /// Encoder error.
        #[source]
        source: ImageError,
    },
    /// The configuration file is not valid JSON for a [`SwatchConfig`].
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// File system error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Encoded output format.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Lossy JPEG at [`JPEG_QUALITY`].
    Jpeg,
    /// Lossless PNG.
    #[default]
    Png,
    /// Uncompressed BMP.
    Bmp,
}

impl OutputFormat {
    /// File extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Bmp => "bmp",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Bmp => "bmp",
        };
        f.write_str(name)
    }
}

/// Represents an error for invalid input when parsing an output format
#[derive(Debug, Error)]
#[error("invalid output format, expected jpeg, png or bmp")]
pub struct FormatParseError;

impl FromStr for OutputFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<OutputFormat, Self::Err> {
        const VARIANTS: &[(&str, OutputFormat)] = &[
            ("jpeg", OutputFormat::Jpeg),
            ("jpg", OutputFormat::Jpeg),
            ("png", OutputFormat::Png),
            ("bmp", OutputFormat::Bmp),
        ];

        VARIANTS
            .iter()
            .find(|(name, _)| s.trim().eq_ignore_ascii_case(name))
            .map(|(_, fmt)| *fmt)
            .ok_or(FormatParseError)
    }
}

/// An input image as handed over by the caller.
#[derive(Clone, Debug)]
pub struct SourceImage {
    /// Declared file name, used for diagnostics and output names.
    pub name: String,
    /// Encoded image bytes.
    pub bytes: Vec<u8>,
}

/// One encoded output.
#[derive(Clone, Debug)]
pub struct Rendered {
    /// Name of the source image.
    pub source: String,
    /// Position the swatches were rendered at.
    pub position: Position,
    /// `{base}_{position}.{ext}`.
    pub file_name: String,
    /// Dimensions after scaling.
    pub width: u32,
    /// Dimensions after scaling.
    pub height: u32,
    /// Encoded bytes.
    pub bytes: Vec<u8>,
}

/// Outputs and diagnostics of a run.
#[derive(Clone, Debug, Default)]
pub struct BatchReport {
    /// Successfully encoded outputs, grouped by source image in input order.
    pub outputs: Vec<Rendered>,
    /// Everything that went wrong without stopping the run.
    pub diagnostics: Vec<Diagnostic>,
}

impl BatchReport {
    fn merge(mut self, other: BatchReport) -> BatchReport {
        self.outputs.extend(other.outputs);
        self.diagnostics.extend(other.diagnostics);
        self
    }
}

/// Checks that both sides are within [`IMAGE_SIDE`].
pub fn validate_dimensions(width: u32, height: u32) -> Result<(), BatchError> {
    if IMAGE_SIDE.contains(&width) && IMAGE_SIDE.contains(&height) {
        Ok(())
    } else {
        Err(BatchError::DimensionsOutOfRange {
            width,
            height,
            min: *IMAGE_SIDE.start(),
            max: *IMAGE_SIDE.end(),
        })
    }
}

/// Decodes `bytes` and rejects images outside the accepted size range.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, BatchError> {
    let image = image::load_from_memory(bytes).map_err(BatchError::Decode)?;
    validate_dimensions(image.width(), image.height())?;
    Ok(image)
}

/// Output file name: sanitized file stem, position and extension.
pub fn output_file_name(source: &str, position: Position, format: OutputFormat) -> String {
    let stem = Path::new(source)
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    let base: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let base = if base.is_empty() { "image" } else { base.as_str() };
    format!("{}_{}.{}", base, position, format.extension())
}

/// Resizes by `percent` with a Lanczos filter; 100 returns a copy.
pub fn scale(image: &RgbImage, percent: u32) -> RgbImage {
    if percent == 100 {
        return image.clone();
    }
    let resize = |dimension: u32| {
        ((dimension as f64 * percent as f64 / 100.0).round() as u32).max(1)
    };
    imageops::resize(
        image,
        resize(image.width()),
        resize(image.height()),
        FilterType::Lanczos3,
    )
}

/// Encodes `image` in `format`.
pub fn encode(image: &RgbImage, format: OutputFormat) -> Result<Vec<u8>, BatchError> {
    let mut cursor = Cursor::new(Vec::new());
    let result = match format {
        OutputFormat::Jpeg => {
            image.write_with_encoder(JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY))
        }
        OutputFormat::Png => image.write_to(&mut cursor, ImageFormat::Png),
        OutputFormat::Bmp => image.write_to(&mut cursor, ImageFormat::Bmp),
    };
    result.map_err(|source| BatchError::Encode { format, source })?;
    Ok(cursor.into_inner())
}

/// Composes, scales and encodes one position.
pub fn render(
    name: &str,
    image: &RgbImage,
    palette: &[Color],
    position: Position,
    config: &SwatchConfig,
) -> Result<Rendered, BatchError> {
    let layout = config.layout_for(position);
    let canvas = compose(image, palette, &layout);
    let scaled = scale(&canvas, config.output.scale_percent);
    let bytes = encode(&scaled, config.output.format)?;

    Ok(Rendered {
        source: name.to_string(),
        position,
        file_name: output_file_name(name, position, config.output.format),
        width: scaled.width(),
        height: scaled.height(),
        bytes,
    })
}

/// Processes one image for every configured position.
pub fn process_image(source: &SourceImage, config: &SwatchConfig) -> BatchReport {
    let mut report = BatchReport::default();

    let image = match decode(&source.bytes) {
        Ok(image) => image,
        Err(error) => {
            warn!(file = %source.name, %error, "skipping image");
            report.diagnostics.push(Diagnostic::new(
                &source.name,
                DiagnosticKind::Skipped {
                    reason: error.to_string(),
                },
            ));
            return report;
        }
    };

    let rgb = raster::normalize(&image);
    let extraction = extract_rgb(&rgb, config.extract.num_colors, config.extract.method);
    for diagnostic in Diagnostic::from_extraction(&source.name, &extraction) {
        warn!("{}", diagnostic);
        report.diagnostics.push(diagnostic);
    }
    debug!(
        file = %source.name,
        colors = extraction.palette.len(),
        "palette ready"
    );

    for &position in &config.positions {
        match render(&source.name, &rgb, &extraction.palette, position, config) {
            Ok(rendered) => {
                info!(
                    file = %rendered.file_name,
                    width = rendered.width,
                    height = rendered.height,
                    "rendered"
                );
                report.outputs.push(rendered);
            }
            Err(error) => {
                let diagnostic = Diagnostic::new(
                    &source.name,
                    DiagnosticKind::OutputFailed {
                        position,
                        reason: error.to_string(),
                    },
                );
                warn!("{}", diagnostic);
                report.diagnostics.push(diagnostic);
            }
        }
    }

    report
}

/// Processes every image in parallel. Never stops on a single failure.
///
/// An invalid `config` renders nothing: every image gets a skip diagnostic.
pub fn process_batch(sources: &[SourceImage], config: &SwatchConfig) -> BatchReport {
    if let Err(error) = config.validate() {
        warn!(%error, "configuration rejected, nothing rendered");
        let diagnostics = sources
            .iter()
            .map(|source| {
                Diagnostic::new(
                    &source.name,
                    DiagnosticKind::Skipped {
                        reason: error.to_string(),
                    },
                )
            })
            .collect();
        return BatchReport {
            outputs: Vec::new(),
            diagnostics,
        };
    }

    sources
        .par_iter()
        .map(|source| process_image(source, config))
        .collect::<Vec<_>>()
        .into_iter()
        .fold(BatchReport::default(), BatchReport::merge)
}
