//! Winsorized sigma clipping for stacks of six or more frames.

use ndarray::Array3;

use crate::consts::{
    EPSILON, MAX_REJECTION_ITERATIONS, MIN_KEPT_VALUES, WINSORIZATION_CLAMP_SIGMA,
    WINSORIZATION_CONVERGENCE, WINSORIZATION_SIGMA_CORRECTION,
};
use crate::error::{FlatError, Result};
use crate::image::ImageData;
use crate::stack::median::histogram_median;

/// Sigma thresholds for the rejection interval.
#[derive(Clone, Copy, Debug)]
pub struct SigmaThresholds {
    pub low: f64,
    pub high: f64,
}

/// Combine frames with winsorized sigma clipping.
///
/// Per pixel column, over the flux-equalized values: estimate a robust
/// mean and sigma by Huber winsorization (clamp to mean +/- 1.5 sigma,
/// recompute, correct sigma by 1.134, repeat to convergence), then reject
/// values outside `[mean - low*sigma, mean + high*sigma]`. The
/// estimate-and-reject cycle runs at most ten times and stops when sigma
/// collapses, nothing is rejected, or a further round would keep fewer
/// than three values. The output is the mean of the surviving original
/// values; a fully rejected column falls back to its median.
pub fn winsorized_sigma_clip_combine(
    frames: &[ImageData],
    factors: &[f64],
    thresholds: SigmaThresholds,
) -> Result<Array3<f64>> {
    if frames.is_empty() {
        return Err(FlatError::EmptyStack);
    }
    let n = frames.len();
    let planes: Vec<&[f64]> = frames.iter().map(|f| f.samples()).collect();
    let samples = planes[0].len();

    let mut out = vec![0.0f64; samples];
    let mut values = vec![0.0f64; n];
    let mut equalized = vec![0.0f64; n];
    let mut winsorized = vec![0.0f64; n];
    let mut included = vec![true; n];

    for (i, slot) in out.iter_mut().enumerate() {
        for (j, plane) in planes.iter().enumerate() {
            values[j] = plane[i];
            equalized[j] = values[j] * factors[j];
            included[j] = true;
        }

        let mut kept = n;
        for _ in 0..MAX_REJECTION_ITERATIONS {
            // A collapsed sigma still gets one rejection pass: the bounds
            // degenerate to the robust mean, exact-equal values stay, and
            // the minimum-kept floor stops any mass rejection.
            let (mean_w, sigma_w) =
                winsorized_mean_sigma(&equalized, &included, &mut winsorized);

            let lo = mean_w - thresholds.low * sigma_w;
            let hi = mean_w + thresholds.high * sigma_w;
            let rejections: Vec<usize> = (0..n)
                .filter(|&j| included[j] && (equalized[j] < lo || equalized[j] > hi))
                .collect();
            if rejections.is_empty() {
                break;
            }
            if kept - rejections.len() < MIN_KEPT_VALUES {
                break;
            }
            for &j in &rejections {
                included[j] = false;
            }
            kept -= rejections.len();
        }

        let mut sum = 0.0;
        let mut count = 0usize;
        for j in 0..n {
            if included[j] {
                sum += values[j];
                count += 1;
            }
        }
        *slot = if count > 0 {
            sum / count as f64
        } else {
            histogram_median(&values)
        };
    }

    Array3::from_shape_vec(frames[0].data.dim(), out)
        .map_err(|e| FlatError::Internal(format!("combine shape: {e}")))
}

/// Robust location and scale of the included values by iterated Huber
/// winsorization. Starts from the median and the sample sigma; each round
/// clamps to mean +/- 1.5 sigma and recomputes both, with the 1.134
/// correction keeping sigma unbiased. Converges when the relative sigma
/// change drops below the threshold, or sigma itself collapses.
fn winsorized_mean_sigma(values: &[f64], included: &[bool], scratch: &mut [f64]) -> (f64, f64) {
    let mut mean = included_median(values, included);
    let (_, mut sigma) = mean_sample_sigma(values, included);

    loop {
        if sigma < EPSILON {
            return (mean, sigma);
        }
        let lo = mean - WINSORIZATION_CLAMP_SIGMA * sigma;
        let hi = mean + WINSORIZATION_CLAMP_SIGMA * sigma;
        for (j, &v) in values.iter().enumerate() {
            if included[j] {
                scratch[j] = v.clamp(lo, hi);
            }
        }
        let (m, s) = mean_sample_sigma(scratch, included);
        let s = s * WINSORIZATION_SIGMA_CORRECTION;
        let converged = (sigma - s).abs() / sigma < WINSORIZATION_CONVERGENCE;
        mean = m;
        sigma = s;
        if converged {
            return (mean, sigma);
        }
    }
}

/// Mean and sample standard deviation (n - 1 denominator) over the
/// included values.
fn mean_sample_sigma(values: &[f64], included: &[bool]) -> (f64, f64) {
    let mut sum = 0.0;
    let mut count = 0usize;
    for (j, &v) in values.iter().enumerate() {
        if included[j] {
            sum += v;
            count += 1;
        }
    }
    if count == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / count as f64;
    if count < 2 {
        return (mean, 0.0);
    }

    let mut var_sum = 0.0;
    for (j, &v) in values.iter().enumerate() {
        if included[j] {
            let d = v - mean;
            var_sum += d * d;
        }
    }
    let sigma = (var_sum / (count - 1) as f64).sqrt();
    (mean, sigma)
}

fn included_median(values: &[f64], included: &[bool]) -> f64 {
    let mut kept: Vec<f64> = values
        .iter()
        .zip(included)
        .filter(|(_, &inc)| inc)
        .map(|(&v, _)| v)
        .collect();
    if kept.is_empty() {
        return 0.0;
    }
    kept.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = kept.len();
    if n % 2 == 1 {
        kept[n / 2]
    } else {
        (kept[n / 2 - 1] + kept[n / 2]) / 2.0
    }
}
