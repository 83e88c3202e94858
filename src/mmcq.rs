use super::{
    Color, ColorTable, QuantizeError, Quantizer, FRACTION_BY_POPULATION, HISTOGRAM_SIZE,
    MMCQ_ITERATION_LIMIT, MULTIPLIER, MULTIPLIER_64, RIGHT_SHIFT, SIGNAL_BITS, VBOX_LENGTH,
};

use image::RgbImage;
use std::cmp;
use thiserror::Error;

/// List of all errors.
#[derive(Clone, Copy, PartialEq, Debug, Error)]
pub enum MmcqError {
    /// An invalid VBox was encountered. This can happen if:
    /// - the image has no pixels, so the initial VBox is empty;
    /// - a VBox selected for cutting holds no pixels.
    #[error("invalid VBox")]
    InvalidVBox,
    /// Failed to cut a VBox. This occurs when:
    /// - the algorithm attempts to divide a VBox into two smaller VBoxes but cannot find a suitable split point;
    /// - the pixel distribution within it prevents a meaningful division.
    #[error("failed to cut a VBox")]
    VBoxCutFailed,
}

/// Which box gets cut next.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BoxSelection {
    /// Median cut: split the most populated box, then refine by population × volume
    /// for the last quarter of the palette.
    Population,
    /// Maximum coverage: always split the box spanning the largest color-space volume.
    Coverage,
}

/// Modified median cut quantizer over a 5 bits per channel histogram.
pub struct Mmcq {
    /// Box selection policy.
    pub selection: BoxSelection,
}

impl Mmcq {
    /// Median cut quantizer.
    pub fn median_cut() -> Self {
        Mmcq {
            selection: BoxSelection::Population,
        }
    }

    /// Maximum coverage quantizer.
    pub fn max_coverage() -> Self {
        Mmcq {
            selection: BoxSelection::Coverage,
        }
    }
}

impl Quantizer for Mmcq {
    fn quantize(&self, image: &RgbImage, max_colors: u8) -> Result<ColorTable, QuantizeError> {
        if max_colors == 0 {
            return Ok(ColorTable::default());
        }

        let (vbox, histogram) = make_histogram_and_vbox(image)?;
        let colors = quantize(vbox, &histogram, max_colors as usize, self.selection)?;
        Ok(ColorTable::from_colors(&colors))
    }
}

#[derive(Clone, Copy)]
enum ColorChannel {
    Red,
    Green,
    Blue,
}

#[derive(Clone)]
struct VBox {
    r_min: u8,
    r_max: u8,
    g_min: u8,
    g_max: u8,
    b_min: u8,
    b_max: u8,
    average: Color,
    volume: u64,
    count: u64,
}

impl VBox {
    fn new(r_min: u8, r_max: u8, g_min: u8, g_max: u8, b_min: u8, b_max: u8) -> VBox {
        VBox {
            r_min,
            r_max,
            g_min,
            g_max,
            b_min,
            b_max,
            average: Color::new(0, 0, 0),
            volume: 0,
            count: 0,
        }
    }

    /// Shrinks the bounds to the populated cells, then refreshes the statistics.
    fn recalc(&mut self, histogram: &[u32]) {
        self.shrink(histogram);
        self.average = self.calc_average(histogram);
        self.count = self.calc_count(histogram);
        self.volume = self.calc_volume();
    }

    fn shrink(&mut self, histogram: &[u32]) {
        let mut bounds: Option<[u8; 6]> = None;
        for i in self.r_min..=self.r_max {
            for j in self.g_min..=self.g_max {
                for k in self.b_min..=self.b_max {
                    if histogram[make_color_index_of(i, j, k)] == 0 {
                        continue;
                    }
                    let b = bounds.get_or_insert([i, i, j, j, k, k]);
                    b[0] = b[0].min(i);
                    b[1] = b[1].max(i);
                    b[2] = b[2].min(j);
                    b[3] = b[3].max(j);
                    b[4] = b[4].min(k);
                    b[5] = b[5].max(k);
                }
            }
        }

        if let Some([r_min, r_max, g_min, g_max, b_min, b_max]) = bounds {
            self.r_min = r_min;
            self.r_max = r_max;
            self.g_min = g_min;
            self.g_max = g_max;
            self.b_min = b_min;
            self.b_max = b_max;
        }
    }

    fn calc_volume(&self) -> u64 {
        (self.r_max as u64 - self.r_min as u64 + 1)
            * (self.g_max as u64 - self.g_min as u64 + 1)
            * (self.b_max as u64 - self.b_min as u64 + 1)
    }

    fn calc_count(&self, histogram: &[u32]) -> u64 {
        let mut count = 0;
        for i in self.r_min..=self.r_max {
            for j in self.g_min..=self.g_max {
                for k in self.b_min..=self.b_max {
                    let index = make_color_index_of(i, j, k);
                    count += histogram[index] as u64;
                }
            }
        }
        count
    }

    fn calc_average(&self, histogram: &[u32]) -> Color {
        let mut ntot = 0.0;
        let mut r_sum = 0.0;
        let mut g_sum = 0.0;
        let mut b_sum = 0.0;

        for i in self.r_min..=self.r_max {
            for j in self.g_min..=self.g_max {
                for k in self.b_min..=self.b_max {
                    let index = make_color_index_of(i, j, k);
                    let hval = histogram[index] as f64;
                    ntot += hval;
                    r_sum += hval * (i as f64 + 0.5) * MULTIPLIER_64;
                    g_sum += hval * (j as f64 + 0.5) * MULTIPLIER_64;
                    b_sum += hval * (k as f64 + 0.5) * MULTIPLIER_64;
                }
            }
        }

        if ntot > 0.0 {
            let r = (r_sum / ntot) as u8;
            let g = (g_sum / ntot) as u8;
            let b = (b_sum / ntot) as u8;
            Color::new(r, g, b)
        } else {
            let r = MULTIPLIER * (self.r_min as i32 + self.r_max as i32 + 1) / 2;
            let g = MULTIPLIER * (self.g_min as i32 + self.g_max as i32 + 1) / 2;
            let b = MULTIPLIER * (self.b_min as i32 + self.b_max as i32 + 1) / 2;
            Color::new(
                cmp::min(r, 255) as u8,
                cmp::min(g, 255) as u8,
                cmp::min(b, 255) as u8,
            )
        }
    }

    /// A box with a single histogram cell cannot be divided any further.
    fn is_splittable(&self) -> bool {
        self.count > 1 && self.volume > 1
    }

    fn widest_color_channel(&self) -> ColorChannel {
        let r_width = self.r_max - self.r_min;
        let g_width = self.g_max - self.g_min;
        let b_width = self.b_max - self.b_min;
        let max = cmp::max(cmp::max(r_width, g_width), b_width);

        if max == r_width {
            ColorChannel::Red
        } else if max == g_width {
            ColorChannel::Green
        } else {
            ColorChannel::Blue
        }
    }
}

fn make_histogram_and_vbox(image: &RgbImage) -> Result<(VBox, Vec<u32>), MmcqError> {
    let mut histogram = vec![0; HISTOGRAM_SIZE];

    let mut r_min = u8::MAX;
    let mut r_max = u8::MIN;

    let mut g_min = u8::MAX;
    let mut g_max = u8::MIN;

    let mut b_min = u8::MAX;
    let mut b_max = u8::MIN;

    for pixel in image.pixels() {
        let [r, g, b] = pixel.0;

        let shifted_r = r >> RIGHT_SHIFT;
        let shifted_g = g >> RIGHT_SHIFT;
        let shifted_b = b >> RIGHT_SHIFT;

        r_min = cmp::min(r_min, shifted_r);
        r_max = cmp::max(r_max, shifted_r);
        g_min = cmp::min(g_min, shifted_g);
        g_max = cmp::max(g_max, shifted_g);
        b_min = cmp::min(b_min, shifted_b);
        b_max = cmp::max(b_max, shifted_b);

        let index = make_color_index_of(shifted_r, shifted_g, shifted_b);
        histogram[index] += 1;
    }

    if r_min > r_max {
        return Err(MmcqError::InvalidVBox);
    }

    let mut vbox = VBox::new(r_min, r_max, g_min, g_max, b_min, b_max);
    vbox.recalc(&histogram);
    Ok((vbox, histogram))
}

fn apply_median_cut(histogram: &[u32], vbox: &VBox) -> Result<(VBox, VBox), MmcqError> {
    if vbox.count == 0 {
        return Err(MmcqError::InvalidVBox);
    }

    let axis = vbox.widest_color_channel();
    let (total, partial_sum, look_ahead_sum) = compute_partial_sums(histogram, vbox, axis);

    if total == 0 {
        return Err(MmcqError::VBoxCutFailed);
    }

    cut(axis, vbox, histogram, &partial_sum, &look_ahead_sum, total)
}

fn compute_partial_sums(
    histogram: &[u32],
    vbox: &VBox,
    axis: ColorChannel,
) -> (i64, Vec<i64>, Vec<i64>) {
    let mut total = 0;
    let mut partial_sum = vec![-1; VBOX_LENGTH];
    let mut look_ahead_sum = vec![-1; VBOX_LENGTH];

    match axis {
        ColorChannel::Red => {
            for i in vbox.r_min..=vbox.r_max {
                let mut sum = 0;
                for j in vbox.g_min..=vbox.g_max {
                    for k in vbox.b_min..=vbox.b_max {
                        sum += histogram[make_color_index_of(i, j, k)] as i64;
                    }
                }
                total += sum;
                partial_sum[i as usize] = total;
            }
        }
        ColorChannel::Green => {
            for i in vbox.g_min..=vbox.g_max {
                let mut sum = 0;
                for j in vbox.r_min..=vbox.r_max {
                    for k in vbox.b_min..=vbox.b_max {
                        sum += histogram[make_color_index_of(j, i, k)] as i64;
                    }
                }
                total += sum;
                partial_sum[i as usize] = total;
            }
        }
        ColorChannel::Blue => {
            for i in vbox.b_min..=vbox.b_max {
                let mut sum = 0;
                for j in vbox.r_min..=vbox.r_max {
                    for k in vbox.g_min..=vbox.g_max {
                        sum += histogram[make_color_index_of(j, k, i)] as i64;
                    }
                }
                total += sum;
                partial_sum[i as usize] = total;
            }
        }
    }

    for (i, sum) in partial_sum.iter().enumerate().filter(|&(_, &s)| s != -1) {
        look_ahead_sum[i] = total - sum;
    }

    (total, partial_sum, look_ahead_sum)
}

fn cut(
    axis: ColorChannel,
    vbox: &VBox,
    histogram: &[u32],
    partial_sum: &[i64],
    look_ahead_sum: &[i64],
    total: i64,
) -> Result<(VBox, VBox), MmcqError> {
    let (vbox_min, vbox_max) = match axis {
        ColorChannel::Red => (vbox.r_min as i32, vbox.r_max as i32),
        ColorChannel::Green => (vbox.g_min as i32, vbox.g_max as i32),
        ColorChannel::Blue => (vbox.b_min as i32, vbox.b_max as i32),
    };

    if vbox_min == vbox_max {
        return Err(MmcqError::VBoxCutFailed);
    }

    for i in vbox_min..=vbox_max {
        if partial_sum[i as usize] > total / 2 {
            let mut vbox1 = vbox.clone();
            let mut vbox2 = vbox.clone();

            let left = i - vbox_min;
            let right = vbox_max - i;

            let mut d2 = if left <= right {
                cmp::min(vbox_max - 1, i + right / 2)
            } else {
                cmp::max(vbox_min, (i as f64 - left as f64 / 2.0) as i32)
            };

            while d2 < vbox_min || (d2 < vbox_max && partial_sum[d2 as usize] <= 0) {
                d2 += 1;
            }
            // Both halves must keep at least one slice.
            d2 = cmp::min(d2, vbox_max - 1);

            let mut count2 = look_ahead_sum[d2 as usize];
            while count2 == 0 && d2 > vbox_min && partial_sum[d2 as usize - 1] > 0 {
                d2 -= 1;
                count2 = look_ahead_sum[d2 as usize];
            }

            match axis {
                ColorChannel::Red => {
                    vbox1.r_max = d2 as u8;
                    vbox2.r_min = (d2 + 1) as u8;
                }
                ColorChannel::Green => {
                    vbox1.g_max = d2 as u8;
                    vbox2.g_min = (d2 + 1) as u8;
                }
                ColorChannel::Blue => {
                    vbox1.b_max = d2 as u8;
                    vbox2.b_min = (d2 + 1) as u8;
                }
            }

            vbox1.recalc(histogram);
            vbox2.recalc(histogram);
            if vbox1.count == 0 || vbox2.count == 0 {
                return Err(MmcqError::VBoxCutFailed);
            }
            return Ok((vbox1, vbox2));
        }
    }

    Err(MmcqError::VBoxCutFailed)
}

fn quantize(
    vbox: VBox,
    histogram: &[u32],
    max_colors: usize,
    selection: BoxSelection,
) -> Result<Vec<Color>, MmcqError> {
    let mut boxes = vec![vbox];

    match selection {
        BoxSelection::Population => {
            let target = (FRACTION_BY_POPULATION * max_colors as f64).ceil() as usize;
            split_until(&mut boxes, target, histogram, compare_by_count)?;
            split_until(&mut boxes, max_colors, histogram, compare_by_product)?;
        }
        BoxSelection::Coverage => {
            split_until(&mut boxes, max_colors, histogram, compare_by_volume)?;
        }
    }

    // Most populated first; the sort is stable so equal counts keep split order.
    boxes.sort_by(|a, b| b.count.cmp(&a.count));
    Ok(boxes
        .into_iter()
        .filter(|v| v.count > 0)
        .map(|v| v.average)
        .take(max_colors)
        .collect())
}

fn split_until<P>(
    boxes: &mut Vec<VBox>,
    target: usize,
    histogram: &[u32],
    comparator: P,
) -> Result<(), MmcqError>
where
    P: Fn(&VBox, &VBox) -> cmp::Ordering,
{
    for _ in 0..MMCQ_ITERATION_LIMIT {
        if boxes.len() >= target {
            break;
        }

        let next = boxes
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_splittable())
            .max_by(|a, b| comparator(a.1, b.1))
            .map(|(index, _)| index);

        let Some(index) = next else {
            break;
        };

        let vbox = boxes.swap_remove(index);
        let (vbox1, vbox2) = apply_median_cut(histogram, &vbox)?;
        boxes.push(vbox1);
        boxes.push(vbox2);
    }
    Ok(())
}

fn compare_by_count(a: &VBox, b: &VBox) -> cmp::Ordering {
    a.count.cmp(&b.count)
}

fn compare_by_product(a: &VBox, b: &VBox) -> cmp::Ordering {
    let a_product = a.count * a.volume;
    let b_product = b.count * b.volume;
    a_product.cmp(&b_product).then_with(|| a.count.cmp(&b.count))
}

fn compare_by_volume(a: &VBox, b: &VBox) -> cmp::Ordering {
    a.volume.cmp(&b.volume).then_with(|| a.count.cmp(&b.count))
}

/// Get reduced-space color index for a pixel.
fn make_color_index_of(red: u8, green: u8, blue: u8) -> usize {
    (((red as i32) << (2 * SIGNAL_BITS)) + ((green as i32) << SIGNAL_BITS) + blue as i32) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn quadrants() -> RgbImage {
        RgbImage::from_fn(40, 40, |x, y| match (x < 20, y < 20) {
            (true, true) => Rgb([200, 20, 20]),
            (false, true) => Rgb([20, 200, 20]),
            (true, false) => Rgb([20, 20, 200]),
            (false, false) => Rgb([230, 230, 30]),
        })
    }

    #[test]
    fn solid_image_yields_one_color() {
        let image = RgbImage::from_pixel(16, 16, Rgb([90, 120, 30]));
        for quantizer in [Mmcq::median_cut(), Mmcq::max_coverage()] {
            let table = quantizer.quantize(&image, 6).unwrap();
            assert_eq!(table.len(), 1);
        }
    }

    #[test]
    fn distinct_regions_are_separated() {
        let image = quadrants();
        for quantizer in [Mmcq::median_cut(), Mmcq::max_coverage()] {
            let colors = quantizer.quantize(&image, 4).unwrap().colors(4);
            assert_eq!(colors.len(), 4);
            assert!(colors.iter().any(|c| c.r > 180 && c.g < 40 && c.b < 40));
            assert!(colors.iter().any(|c| c.g > 180 && c.r < 40 && c.b < 40));
            assert!(colors.iter().any(|c| c.b > 180 && c.r < 40 && c.g < 40));
            assert!(colors.iter().any(|c| c.r > 210 && c.g > 210 && c.b < 50));
        }
    }

    #[test]
    fn never_exceeds_requested_colors() {
        let image = RgbImage::from_fn(64, 64, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 128]));
        for quantizer in [Mmcq::median_cut(), Mmcq::max_coverage()] {
            let table = quantizer.quantize(&image, 5).unwrap();
            assert!(table.len() <= 5 && table.len() > 0);
        }
    }

    #[test]
    fn empty_image_is_an_invalid_vbox() {
        let image = RgbImage::new(0, 0);
        let result = Mmcq::median_cut().quantize(&image, 4);
        assert!(matches!(result, Err(QuantizeError::Mmcq(MmcqError::InvalidVBox))));
    }
}
