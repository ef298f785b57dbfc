pub mod mean;
pub mod median;
pub mod percentile;
pub mod winsorized;

pub use mean::mean_combine;
pub use median::histogram_median;
pub use percentile::{percentile_clip_combine, PERCENTILE_CLIP_HIGH, PERCENTILE_CLIP_LOW};
pub use winsorized::{winsorized_sigma_clip_combine, SigmaThresholds};
