//! Pixel comparison between a baseline and a candidate image.
//!
//! The comparison walks both buffers in row-major order and measures each
//! pixel pair with a YIQ-weighted colour distance. A pixel differs when the
//! distance exceeds `35215 · threshold²`, where 35215 is the largest possible
//! distance, so `threshold` reads as a 0..1 fraction of the colour space.
//!
//! Differing pixels that sit on an anti-aliased edge in either image are
//! painted separately and not counted unless [`DiffOptions::include_aa`] is set.
//!
//! ```text
//!   baseline ─┐
//!             ├─► dimensions equal? ──no──► DimensionMismatch
//!   candidate ┘          │ yes
//!                        ▼
//!             per-pixel YIQ delta ──► count + diff image
//!                        │
//!              count == 0 ? Match : Mismatch
//! ```

use crate::codec::{decode_png, encode_png};
use crate::result::VisperfResult;
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Largest YIQ delta between two colours (black vs white)
const MAX_YIQ_DELTA: f64 = 35215.0;

/// Default per-pixel tolerance
pub const DEFAULT_THRESHOLD: f64 = 0.1;

/// Options for a comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffOptions {
    /// Per-pixel tolerance on a 0..1 scale
    pub threshold: f64,
    /// Count anti-aliased pixels as differences
    pub include_aa: bool,
    /// Opacity of the faded baseline drawn under unchanged pixels
    pub alpha: f64,
    /// Colour for differing pixels
    pub diff_color: [u8; 3],
    /// Colour for pixels classified as anti-aliasing
    pub aa_color: [u8; 3],
    /// Draw only the differences on a transparent background
    pub diff_mask: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            include_aa: false,
            alpha: 0.1,
            diff_color: [255, 0, 0],
            aa_color: [255, 255, 0],
            diff_mask: false,
        }
    }
}

impl DiffOptions {
    /// Set the per-pixel tolerance
    #[must_use]
    pub const fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Count anti-aliased pixels as differences
    #[must_use]
    pub const fn with_include_aa(mut self, include: bool) -> Self {
        self.include_aa = include;
        self
    }

    /// Draw differences on a transparent background
    #[must_use]
    pub const fn with_diff_mask(mut self, mask: bool) -> Self {
        self.diff_mask = mask;
        self
    }

    fn max_delta(&self) -> f64 {
        let t = self.threshold.clamp(0.0, 1.0);
        MAX_YIQ_DELTA * t * t
    }
}

/// Outcome of comparing two images
#[derive(Debug, Clone, PartialEq)]
pub enum DiffOutcome {
    /// Width or height disagree; no pixels were compared
    DimensionMismatch {
        /// Baseline (width, height)
        baseline: (u32, u32),
        /// Candidate (width, height)
        candidate: (u32, u32),
    },
    /// No pixel exceeded the tolerance
    Match,
    /// At least one pixel exceeded the tolerance
    Mismatch {
        /// Number of differing pixels
        count: u64,
        /// Total pixels compared
        total: u64,
        /// Visualisation of the differences, same dimensions as the inputs
        diff_image: RgbaImage,
    },
}

impl DiffOutcome {
    /// Number of differing pixels, if a pixel comparison took place
    #[must_use]
    pub const fn mismatched_pixels(&self) -> Option<u64> {
        match self {
            Self::DimensionMismatch { .. } => None,
            Self::Match => Some(0),
            Self::Mismatch { count, .. } => Some(*count),
        }
    }
}

/// Compare two decoded images
///
/// Pure: identical inputs always produce an identical outcome, including the
/// diff image pixels.
#[must_use]
pub fn compare(baseline: &RgbaImage, candidate: &RgbaImage, options: &DiffOptions) -> DiffOutcome {
    if baseline.dimensions() != candidate.dimensions() {
        return DiffOutcome::DimensionMismatch {
            baseline: baseline.dimensions(),
            candidate: candidate.dimensions(),
        };
    }

    let (width, height) = baseline.dimensions();
    if baseline.as_raw() == candidate.as_raw() {
        return DiffOutcome::Match;
    }

    let max_delta = options.max_delta();
    let mut diff_image = RgbaImage::new(width, height);
    let mut count = 0u64;

    for y in 0..height {
        for x in 0..width {
            let a = *baseline.get_pixel(x, y);
            let b = *candidate.get_pixel(x, y);
            let delta = color_delta(a, b, false);

            if delta.abs() > max_delta {
                let antialiased = !options.include_aa
                    && (is_antialiased(baseline, candidate, x, y)
                        || is_antialiased(candidate, baseline, x, y));
                if antialiased {
                    if !options.diff_mask {
                        diff_image.put_pixel(x, y, opaque(options.aa_color));
                    }
                } else {
                    diff_image.put_pixel(x, y, opaque(options.diff_color));
                    count += 1;
                }
            } else if !options.diff_mask {
                diff_image.put_pixel(x, y, faded_gray(a, options.alpha));
            }
        }
    }

    if count == 0 {
        DiffOutcome::Match
    } else {
        DiffOutcome::Mismatch {
            count,
            total: u64::from(width) * u64::from(height),
            diff_image,
        }
    }
}

/// Compare two PNG buffers
///
/// # Errors
///
/// Returns `DecodeError` if either buffer is not a valid PNG
pub fn compare_png(
    baseline: &[u8],
    candidate: &[u8],
    options: &DiffOptions,
) -> VisperfResult<DiffOutcome> {
    let baseline = decode_png(baseline)?;
    let candidate = decode_png(candidate)?;
    Ok(compare(&baseline, &candidate, options))
}

/// Encode the diff image of a mismatch outcome as PNG
///
/// # Errors
///
/// Returns `DecodeError` if encoding fails
pub fn encode_diff(outcome: &DiffOutcome) -> VisperfResult<Option<Vec<u8>>> {
    match outcome {
        DiffOutcome::Mismatch { diff_image, .. } => encode_png(diff_image).map(Some),
        _ => Ok(None),
    }
}

const fn opaque([r, g, b]: [u8; 3]) -> Rgba<u8> {
    Rgba([r, g, b, 255])
}

fn rgb2y(r: f64, g: f64, b: f64) -> f64 {
    r * 0.298_895_31 + g * 0.586_622_47 + b * 0.114_482_23
}

fn rgb2i(r: f64, g: f64, b: f64) -> f64 {
    r * 0.595_977_99 - g * 0.274_176_10 - b * 0.321_801_89
}

fn rgb2q(r: f64, g: f64, b: f64) -> f64 {
    r * 0.211_470_17 - g * 0.522_617_11 + b * 0.311_146_94
}

/// Blend a channel onto white with the given opacity
fn blend(c: f64, a: f64) -> f64 {
    255.0 + (c - 255.0) * a
}

fn flatten(Rgba([r, g, b, a]): Rgba<u8>) -> (f64, f64, f64) {
    let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
    if a < 255 {
        let a = f64::from(a) / 255.0;
        (blend(r, a), blend(g, a), blend(b, a))
    } else {
        (r, g, b)
    }
}

/// Signed YIQ distance between two pixels
///
/// With `y_only` the signed brightness difference is returned instead.
/// Otherwise the sign is negative when the first pixel is the brighter one.
fn color_delta(a: Rgba<u8>, b: Rgba<u8>, y_only: bool) -> f64 {
    if a == b {
        return 0.0;
    }
    let (r1, g1, b1) = flatten(a);
    let (r2, g2, b2) = flatten(b);

    let y1 = rgb2y(r1, g1, b1);
    let y2 = rgb2y(r2, g2, b2);
    let y = y1 - y2;
    if y_only {
        return y;
    }

    let i = rgb2i(r1, g1, b1) - rgb2i(r2, g2, b2);
    let q = rgb2q(r1, g1, b1) - rgb2q(r2, g2, b2);
    let delta = 0.5053 * y * y + 0.299 * i * i + 0.1957 * q * q;

    if y1 > y2 {
        -delta
    } else {
        delta
    }
}

fn faded_gray(pixel: Rgba<u8>, alpha: f64) -> Rgba<u8> {
    let Rgba([r, g, b, a]) = pixel;
    let y = rgb2y(f64::from(r), f64::from(g), f64::from(b));
    let value = blend(y, alpha * f64::from(a) / 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba([value, value, value, 255])
}

/// Clamped 3×3 window around (x, y) and whether (x, y) lies on the border
fn neighbourhood(img: &RgbaImage, x: u32, y: u32) -> (u32, u32, u32, u32, bool) {
    let (width, height) = img.dimensions();
    let x0 = x.saturating_sub(1);
    let y0 = y.saturating_sub(1);
    let x2 = (x + 1).min(width - 1);
    let y2 = (y + 1).min(height - 1);
    let on_edge = x == x0 || x == x2 || y == y0 || y == y2;
    (x0, y0, x2, y2, on_edge)
}

/// Whether the pixel at (x, y) in `img` looks like anti-aliasing
///
/// A pixel is anti-aliased when it has at most two identical neighbours and
/// its neighbourhood contains both a darker and a brighter pixel, one of which
/// sits in a flat region in both images.
fn is_antialiased(img: &RgbaImage, other: &RgbaImage, x: u32, y: u32) -> bool {
    let (x0, y0, x2, y2, on_edge) = neighbourhood(img, x, y);
    let center = *img.get_pixel(x, y);

    let mut zeroes = u32::from(on_edge);
    let mut min = 0.0;
    let mut max = 0.0;
    let mut min_at = (0, 0);
    let mut max_at = (0, 0);

    for nx in x0..=x2 {
        for ny in y0..=y2 {
            if nx == x && ny == y {
                continue;
            }
            let delta = color_delta(center, *img.get_pixel(nx, ny), true);
            if delta == 0.0 {
                zeroes += 1;
                if zeroes > 2 {
                    return false;
                }
            } else if delta < min {
                min = delta;
                min_at = (nx, ny);
            } else if delta > max {
                max = delta;
                max_at = (nx, ny);
            }
        }
    }

    if min == 0.0 || max == 0.0 {
        return false;
    }

    (has_many_siblings(img, min_at.0, min_at.1) && has_many_siblings(other, min_at.0, min_at.1))
        || (has_many_siblings(img, max_at.0, max_at.1)
            && has_many_siblings(other, max_at.0, max_at.1))
}

/// Whether the pixel at (x, y) has more than two identical neighbours
fn has_many_siblings(img: &RgbaImage, x: u32, y: u32) -> bool {
    let (x0, y0, x2, y2, on_edge) = neighbourhood(img, x, y);
    let center = img.get_pixel(x, y);
    let mut zeroes = u32::from(on_edge);

    for nx in x0..=x2 {
        for ny in y0..=y2 {
            if nx == x && ny == y {
                continue;
            }
            if img.get_pixel(nx, ny) == center {
                zeroes += 1;
                if zeroes > 2 {
                    return true;
                }
            }
        }
    }
    false
}
