use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Classification of a calibration frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameType {
    Unknown,
    Light,
    Flat,
    Dark,
    DarkFlat,
    Bias,
    MasterFlat,
    MasterDark,
    MasterDarkFlat,
    MasterBias,
}

impl FrameType {
    /// True for the frame types usable as dark calibration sources.
    pub fn is_dark_class(self) -> bool {
        matches!(
            self,
            Self::Dark | Self::DarkFlat | Self::MasterDark | Self::MasterDarkFlat
        )
    }

    pub fn is_bias_class(self) -> bool {
        matches!(self, Self::Bias | Self::MasterBias)
    }

    /// Display name used in match-kind tags.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Light => "Light",
            Self::Flat => "Flat",
            Self::Dark => "Dark",
            Self::DarkFlat => "DarkFlat",
            Self::Bias => "Bias",
            Self::MasterFlat => "MasterFlat",
            Self::MasterDark => "MasterDark",
            Self::MasterDarkFlat => "MasterDarkFlat",
            Self::MasterBias => "MasterBias",
        }
    }
}

/// Typed metadata extracted from one file's headers (or filename fallbacks).
#[derive(Clone, Debug)]
pub struct ImageMetadata {
    pub path: PathBuf,
    pub frame_type: FrameType,
    /// Seconds; finite and non-negative when present.
    pub exposure: Option<f64>,
    /// Normalized upper-case, e.g. "1" or "2X2".
    pub binning: Option<String>,
    pub gain: Option<f64>,
    pub offset: Option<f64>,
    /// Sensor temperature in degrees C.
    pub temperature: Option<f64>,
    pub filter: Option<String>,
    pub date_obs: Option<String>,
}

impl ImageMetadata {
    /// Filename-only record used when headers cannot be read.
    pub fn fallback(path: PathBuf) -> Self {
        Self {
            path,
            frame_type: FrameType::Unknown,
            exposure: None,
            binning: None,
            gain: None,
            offset: None,
            temperature: None,
            filter: None,
            date_obs: None,
        }
    }

    pub fn exposure_key(&self) -> String {
        exposure_key(self.exposure)
    }
}

/// Render an exposure as its grouping/naming key: three decimals,
/// round-half-to-even, trailing zeros trimmed, `s` suffix. Absent
/// exposures render as `Unknown`.
pub fn exposure_key(exposure: Option<f64>) -> String {
    match exposure {
        Some(x) if x.is_finite() => format!("{}s", format_exposure(x)),
        _ => "Unknown".to_string(),
    }
}

/// Three-decimal rendering with trailing zeros trimmed: 1.0 -> "1",
/// 0.5 -> "0.5", 10.125 -> "10.125".
pub fn format_exposure(exposure: f64) -> String {
    let fixed = format!("{exposure:.3}");
    fixed
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}
