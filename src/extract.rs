use super::{ColorTable, Mmcq, Octree, Palette, QuantizeError, Quantizer};
use crate::raster;

use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

/// Choice of algorithm for color palette generation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuantizeMethod {
    /// Modified median cut.
    ///
    /// *Summary*: splits the most populated color box first, so dominant
    /// colors are well represented.
    MedianCut,
    /// Maximum coverage.
    ///
    /// *Summary*: splits the box spanning the widest color range first, so
    /// small but distinct accents survive.
    MaxCoverage,
    /// Fast octree.
    ///
    /// *Summary*: one pass over the pixels, most frequent color cells win.
    /// Also the fallback when another method fails.
    FastOctree,
}

impl QuantizeMethod {
    /// Canonical name, as accepted by [`FromStr`].
    pub fn as_str(&self) -> &'static str {
        match self {
            QuantizeMethod::MedianCut => "median-cut",
            QuantizeMethod::MaxCoverage => "max-coverage",
            QuantizeMethod::FastOctree => "fast-octree",
        }
    }

    /// The quantizer implementing this method.
    pub fn quantizer(&self) -> Box<dyn Quantizer + Send + Sync> {
        match self {
            QuantizeMethod::MedianCut => Box::new(Mmcq::median_cut()),
            QuantizeMethod::MaxCoverage => Box::new(Mmcq::max_coverage()),
            QuantizeMethod::FastOctree => Box::new(Octree::default()),
        }
    }

    /// Methods to try, in order: the requested one, then the fast octree.
    ///
    /// When the fast octree itself is requested the chain has a single
    /// entry; the quantizer is deterministic, so a second run could only
    /// repeat the first result.
    pub fn strategies(&self) -> Vec<QuantizeMethod> {
        let mut chain = vec![*self];
        if *self != QuantizeMethod::FastOctree {
            chain.push(QuantizeMethod::FastOctree);
        }
        chain
    }
}

impl fmt::Display for QuantizeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents an error for invalid input when parsing a quantization method
#[derive(Debug, Error)]
#[error("invalid quantization method, expected median-cut, max-coverage or fast-octree")]
pub struct MethodParseError;

impl FromStr for QuantizeMethod {
    type Err = MethodParseError;

    fn from_str(s: &str) -> Result<QuantizeMethod, Self::Err> {
        const VARIANTS: &[(&str, QuantizeMethod)] = &[
            ("median-cut", QuantizeMethod::MedianCut),
            ("mediancut", QuantizeMethod::MedianCut),
            ("max-coverage", QuantizeMethod::MaxCoverage),
            ("maxcoverage", QuantizeMethod::MaxCoverage),
            ("fast-octree", QuantizeMethod::FastOctree),
            ("fastoctree", QuantizeMethod::FastOctree),
            ("octree", QuantizeMethod::FastOctree),
        ];

        VARIANTS
            .iter()
            .find(|(name, _)| s.trim().eq_ignore_ascii_case(name))
            .map(|(_, method)| *method)
            .ok_or(MethodParseError)
    }
}

/// One entry of a strategy chain.
#[derive(Clone, Copy)]
pub struct Strategy<'a> {
    /// Method reported when this strategy succeeds or fails.
    pub method: QuantizeMethod,
    /// The quantizer to run.
    pub quantizer: &'a dyn Quantizer,
}

/// An attempt that produced no palette.
#[derive(Debug, Clone)]
pub struct FailedAttempt {
    /// Method that was tried.
    pub method: QuantizeMethod,
    /// Why it produced nothing.
    pub error: QuantizeError,
}

/// Result of palette extraction. Never an error: failure is an empty palette.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Extracted colors, possibly none.
    pub palette: Palette,
    /// Method that produced `palette`, if any did.
    pub method: Option<QuantizeMethod>,
    /// Attempts that came before, in order.
    pub failures: Vec<FailedAttempt>,
}

impl Extraction {
    /// `true` when the palette came from a strategy other than the first.
    pub fn used_fallback(&self) -> bool {
        self.method.is_some() && !self.failures.is_empty()
    }
}

enum Attempt {
    Colors(Palette),
    Empty,
    Failed(QuantizeError),
}

/// Returns a representative color palette of an image.
///
/// * `image` - Decoded image in any color mode; it is converted to RGB first.
/// * `num_colors` - Maximum number of colors in the palette.
/// * `method` - Primary quantization method. The fast octree is tried once
///   more if it fails or returns no colors.
pub fn extract(image: &DynamicImage, num_colors: u8, method: QuantizeMethod) -> Extraction {
    extract_rgb(&raster::normalize(image), num_colors, method)
}

/// Same as [`extract`] for an image that is already RGB.
pub fn extract_rgb(image: &RgbImage, num_colors: u8, method: QuantizeMethod) -> Extraction {
    let quantizers: Vec<_> = method
        .strategies()
        .into_iter()
        .map(|m| (m, m.quantizer()))
        .collect();
    let strategies: Vec<Strategy<'_>> = quantizers
        .iter()
        .map(|(method, quantizer)| Strategy {
            method: *method,
            quantizer: &**quantizer,
        })
        .collect();
    extract_with(image, num_colors, &strategies)
}

/// Runs `strategies` in order until one yields at least one color.
pub fn extract_with(image: &RgbImage, num_colors: u8, strategies: &[Strategy<'_>]) -> Extraction {
    let mut extraction = Extraction::default();
    if num_colors == 0 {
        return extraction;
    }

    for strategy in strategies {
        let error = match attempt(image, num_colors, strategy.quantizer) {
            Attempt::Colors(palette) => {
                debug!(
                    method = %strategy.method,
                    colors = palette.len(),
                    "palette extracted"
                );
                extraction.palette = palette;
                extraction.method = Some(strategy.method);
                return extraction;
            }
            Attempt::Empty => QuantizeError::EmptyTable,
            Attempt::Failed(error) => error,
        };

        warn!(method = %strategy.method, %error, "quantization attempt failed");
        extraction.failures.push(FailedAttempt {
            method: strategy.method,
            error,
        });
    }

    extraction
}

fn attempt(image: &RgbImage, num_colors: u8, quantizer: &dyn Quantizer) -> Attempt {
    let result = panic::catch_unwind(AssertUnwindSafe(|| quantizer.quantize(image, num_colors)));
    match result {
        Ok(Ok(table)) => read_table(&table, num_colors),
        Ok(Err(error)) => Attempt::Failed(error),
        Err(payload) => Attempt::Failed(QuantizeError::Unexpected(panic_message(payload))),
    }
}

fn read_table(table: &ColorTable, num_colors: u8) -> Attempt {
    let bytes = table.as_bytes().len();
    if bytes == 0 {
        return Attempt::Empty;
    }
    if bytes < 3 {
        return Attempt::Failed(QuantizeError::MalformedTable(bytes));
    }

    let palette = table.colors(num_colors as usize);
    if palette.is_empty() {
        Attempt::Empty
    } else {
        Attempt::Colors(palette)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_method_aliases() {
        assert_eq!(
            "Median-Cut".parse::<QuantizeMethod>().unwrap(),
            QuantizeMethod::MedianCut
        );
        assert_eq!(
            "maxcoverage".parse::<QuantizeMethod>().unwrap(),
            QuantizeMethod::MaxCoverage
        );
        assert_eq!(
            "octree".parse::<QuantizeMethod>().unwrap(),
            QuantizeMethod::FastOctree
        );
        assert!("kmeans".parse::<QuantizeMethod>().is_err());
    }

    #[test]
    fn fallback_chain_ends_with_fast_octree() {
        assert_eq!(
            QuantizeMethod::MaxCoverage.strategies(),
            vec![QuantizeMethod::MaxCoverage, QuantizeMethod::FastOctree]
        );
        assert_eq!(
            QuantizeMethod::FastOctree.strategies(),
            vec![QuantizeMethod::FastOctree]
        );
    }

    #[test]
    fn rgb_and_dynamic_entry_points_agree() {
        let mut rgb = RgbImage::from_pixel(20, 20, image::Rgb([200, 30, 30]));
        for x in 10..20 {
            for y in 0..20 {
                rgb.put_pixel(x, y, image::Rgb([20, 40, 220]));
            }
        }
        let direct = extract_rgb(&rgb, 4, QuantizeMethod::MedianCut);
        let dynamic = extract(&DynamicImage::ImageRgb8(rgb), 4, QuantizeMethod::MedianCut);
        assert_eq!(direct.palette, dynamic.palette);
        assert_eq!(direct.method, Some(QuantizeMethod::MedianCut));
    }

    #[test]
    fn short_tables_are_malformed() {
        let table = ColorTable::from_bytes(vec![1, 2]);
        assert!(matches!(
            read_table(&table, 4),
            Attempt::Failed(QuantizeError::MalformedTable(2))
        ));
        assert!(matches!(
            read_table(&ColorTable::default(), 4),
            Attempt::Empty
        ));
    }
}
