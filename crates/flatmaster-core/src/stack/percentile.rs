//! Percentile clipping for small stacks (3 <= n < 6).

use ndarray::Array3;

use crate::error::{FlatError, Result};
use crate::image::ImageData;

/// Fraction of low-end values dropped per pixel column.
pub const PERCENTILE_CLIP_LOW: f64 = 0.20;

/// Fraction of high-end values dropped per pixel column.
pub const PERCENTILE_CLIP_HIGH: f64 = 0.10;

/// Combine frames with percentile clipping.
///
/// Per pixel column: rank by the flux-equalized value, drop
/// `floor(n * low)` smallest and `floor(n * high)` largest, then average
/// the surviving original values. If nothing would survive, all values are
/// kept.
pub fn percentile_clip_combine(
    frames: &[ImageData],
    factors: &[f64],
    low: f64,
    high: f64,
) -> Result<Array3<f64>> {
    if frames.is_empty() {
        return Err(FlatError::EmptyStack);
    }
    let n = frames.len();
    let planes: Vec<&[f64]> = frames.iter().map(|f| f.samples()).collect();
    let samples = planes[0].len();

    let drop_low = (n as f64 * low).floor() as usize;
    let drop_high = (n as f64 * high).floor() as usize;

    let mut out = vec![0.0f64; samples];
    let mut column: Vec<(f64, f64)> = Vec::with_capacity(n);

    for (i, slot) in out.iter_mut().enumerate() {
        column.clear();
        for (j, plane) in planes.iter().enumerate() {
            let value = plane[i];
            column.push((value * factors[j], value));
        }
        column.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let kept = if drop_low + drop_high >= n {
            &column[..]
        } else {
            &column[drop_low..n - drop_high]
        };
        let sum: f64 = kept.iter().map(|&(_, v)| v).sum();
        *slot = sum / kept.len() as f64;
    }

    Array3::from_shape_vec(frames[0].data.dim(), out)
        .map_err(|e| FlatError::Internal(format!("combine shape: {e}")))
}
