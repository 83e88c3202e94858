// Copyright 2017, Reizner Evgeniy <razrfalcon@gmail.com>.
// See the COPYRIGHT file at the top-level directory of this distribution.
// Licensed under the MIT license, see the LICENSE file or <http://opensource.org/licenses/MIT>

//! *color-swatch* extracts a representative color palette from an image and
//! renders it as a strip of solid swatches attached to one edge of the image.
//!
//! The work is split in two stages:
//!
//! * [`extract`] reduces an image to at most `n` colors using one of the
//!   quantizers in [`QuantizeMethod`], falling back to the fast octree when
//!   the requested method fails or yields nothing.
//! * [`compose`] builds a fresh canvas holding the image, an optional border
//!   and one swatch per palette entry.
//!
//! ```no_run
//! use color_swatch::{compose, extract, LayoutConfig, Position, QuantizeMethod};
//!
//! let image = image::open("photo.jpg").unwrap();
//! let extraction = extract(&image, 6, QuantizeMethod::MedianCut);
//! let layout = LayoutConfig { position: Position::Bottom, ..LayoutConfig::default() };
//! let canvas = compose(&image.to_rgb8(), &extraction.palette, &layout);
//! canvas.save("photo_bottom.png").unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod batch;
pub mod config;
mod diagnostic;
mod extract;
mod layout;
mod mmcq;
mod octree;
pub mod raster;

use thiserror::Error;

pub use diagnostic::{Diagnostic, DiagnosticKind};
pub use extract::{
    extract, extract_rgb, extract_with, Extraction, FailedAttempt, MethodParseError,
    QuantizeMethod, Strategy,
};
pub use layout::{
    compose, segments, strip_thickness, LayoutConfig, Position, PositionParseError, Span,
    MAX_BORDER_PX,
};
pub use mmcq::{BoxSelection, Mmcq, MmcqError};
pub use octree::{Octree, OctreeError};

pub use rgb::RGB8 as Color;

/// An ordered list of colors; order decides swatch placement only.
pub type Palette = Vec<Color>;

const SIGNAL_BITS: i32 = 5;
const RIGHT_SHIFT: i32 = 8 - SIGNAL_BITS;
const MULTIPLIER: i32 = 1 << RIGHT_SHIFT;
const MULTIPLIER_64: f64 = MULTIPLIER as f64;
const HISTOGRAM_SIZE: usize = 1 << (3 * SIGNAL_BITS);
const VBOX_LENGTH: usize = 1 << SIGNAL_BITS;
const FRACTION_BY_POPULATION: f64 = 0.75;
const MMCQ_ITERATION_LIMIT: i32 = 1000;

/// Represents an error that a single quantization attempt can end with.
#[derive(Debug, Clone, Error)]
pub enum QuantizeError {
    /// The quantizer ran but returned a color table with no entries.
    #[error("quantizer returned an empty color table")]
    EmptyTable,
    /// The color table is too short to hold a single RGB triple.
    #[error("malformed color table of {0} bytes")]
    MalformedTable(usize),
    /// An error occurred in the median-cut family of quantizers.
    #[error(transparent)]
    Mmcq(#[from] MmcqError),
    /// An error occurred in the octree quantizer.
    #[error(transparent)]
    Octree(#[from] OctreeError),
    /// The quantizer panicked. Carries the panic message when there is one.
    #[error("unexpected quantizer failure: {0}")]
    Unexpected(String),
}

/// A flat `r, g, b, r, g, b, ...` color table as produced by a quantizer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColorTable(Vec<u8>);

impl ColorTable {
    /// Wraps raw table bytes. A trailing partial triple is kept but never read.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        ColorTable(bytes)
    }

    /// Builds a table from colors, in order.
    pub fn from_colors(colors: &[Color]) -> Self {
        ColorTable(colors.iter().flat_map(|c| [c.r, c.g, c.b]).collect())
    }

    /// Raw table bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of complete colors in the table.
    pub fn len(&self) -> usize {
        self.0.len() / 3
    }

    /// Returns `true` if the table has no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reads `min(limit, len / 3)` colors as consecutive non-overlapping triples.
    pub fn colors(&self, limit: usize) -> Palette {
        self.0
            .chunks_exact(3)
            .take(limit)
            .map(|c| Color::new(c[0], c[1], c[2]))
            .collect()
    }
}

/// A color quantization strategy.
///
/// Implementations reduce an RGB image to a color table of at most
/// `max_colors` entries. They must not keep state between calls.
pub trait Quantizer {
    /// Quantizes `image` and returns its color table.
    fn quantize(&self, image: &image::RgbImage, max_colors: u8) -> Result<ColorTable, QuantizeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_table_reads_whole_triples_only() {
        let table = ColorTable::from_bytes(vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.colors(10),
            vec![Color::new(1, 2, 3), Color::new(4, 5, 6)]
        );
        assert_eq!(table.colors(1), vec![Color::new(1, 2, 3)]);
    }

    #[test]
    fn color_table_from_colors_keeps_order() {
        let colors = [Color::new(9, 8, 7), Color::new(0, 0, 0)];
        let table = ColorTable::from_colors(&colors);
        assert_eq!(table.as_bytes(), &[9, 8, 7, 0, 0, 0]);
        assert_eq!(table.colors(2), colors.to_vec());
    }
}
