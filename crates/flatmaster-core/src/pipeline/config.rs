use serde::{Deserialize, Serialize};

use crate::meta::reader::default_parallelism;

/// Options recognized by a processing run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default)]
    pub rejection: RejectionConfig,
    #[serde(default)]
    pub dark_matching: DarkMatchingConfig,
    /// Delete intermediate calibrated frames after the master is written.
    #[serde(default = "default_true")]
    pub delete_calibrated: bool,
    /// Fail (rather than skip) exposure groups with no matching dark.
    #[serde(default)]
    pub require_darks: bool,
    /// Also write each master as FITS alongside the XISF file.
    #[serde(default)]
    pub write_fits_masters: bool,
    /// Worker count for metadata batch reads.
    #[serde(default = "default_parallelism")]
    pub metadata_parallelism: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            rejection: RejectionConfig::default(),
            dark_matching: DarkMatchingConfig::default(),
            delete_calibrated: true,
            require_darks: false,
            write_fits_masters: false,
            metadata_parallelism: default_parallelism(),
        }
    }
}

/// Sigma thresholds for winsorized sigma clipping.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RejectionConfig {
    pub low_sigma: f64,
    pub high_sigma: f64,
}

impl Default for RejectionConfig {
    fn default() -> Self {
        Self {
            low_sigma: 5.0,
            high_sigma: 5.0,
        }
    }
}

/// Dark selection policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DarkMatchingConfig {
    /// Matching binning contributes +3.0 to the score.
    pub enforce_binning: bool,
    /// |dGain| < 0.01 and |dOffset| < 0.5 contribute +2.0 each.
    pub prefer_same_gain_offset: bool,
    /// Temperature within the tolerance adds 1.5 - 0.2 per degree of delta.
    pub prefer_closest_temp: bool,
    /// Temperature tolerance window in degrees C.
    pub max_temp_delta_c: f64,
    /// Enable the nearest-exposure tiers (with and without optimization).
    pub allow_nearest_with_optimize: bool,
}

impl Default for DarkMatchingConfig {
    fn default() -> Self {
        Self {
            enforce_binning: true,
            prefer_same_gain_offset: true,
            prefer_closest_temp: true,
            max_temp_delta_c: 5.0,
            allow_nearest_with_optimize: true,
        }
    }
}

fn default_true() -> bool {
    true
}
