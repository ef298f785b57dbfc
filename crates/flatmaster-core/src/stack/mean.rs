use ndarray::Array3;

use crate::error::{FlatError, Result};
use crate::image::ImageData;

/// Combine frames by the per-pixel mean. Used for stacks too small for
/// statistical rejection.
pub fn mean_combine(frames: &[ImageData]) -> Result<Array3<f64>> {
    if frames.is_empty() {
        return Err(FlatError::EmptyStack);
    }
    let n = frames.len() as f64;
    let mut sum = Array3::<f64>::zeros(frames[0].data.dim());
    for frame in frames {
        sum += &frame.data;
    }
    sum /= n;
    Ok(sum)
}
