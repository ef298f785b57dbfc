//! Header keyword extraction with filename fallbacks.

use std::path::Path;
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;
use tracing::warn;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::image::KeywordList;
use crate::io;
use crate::meta::cache::MetadataCache;
use crate::meta::types::{FrameType, ImageMetadata};

const EXPOSURE_KEYS: &[&str] = &["EXPTIME", "EXPOSURE", "EXPOSURETIME", "X_EXPOSURE"];
const BINNING_KEYS: &[&str] = &["XBINNING", "BINNING", "CCDBINNING", "BINNING_MODE"];
const GAIN_KEYS: &[&str] = &["GAIN", "EGAIN"];
const OFFSET_KEYS: &[&str] = &["OFFSET", "BLACKLEVEL"];
const TEMPERATURE_KEYS: &[&str] = &[
    "CCD-TEMP",
    "CCD_TEMP",
    "SENSOR_TEMP",
    "SENSOR-TEMP",
    "SET-TEMP",
    "SET_TEMP",
];
const FILTER_KEYS: &[&str] = &["FILTER", "INSFLNAM"];
const DATE_KEYS: &[&str] = &["DATE-OBS", "DATE_OBS", "DATE"];
const TYPE_KEYS: &[&str] = &["IMAGETYP", "FRAMETYPE", "FRAME"];

// The guard classes stand in for word boundaries; the regex crate has no
// lookaround.
static EXPOSURE_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^A-Za-z])(\d+(?:\.\d+)?)\s*s(?:[_\-\s.]|$)").expect("valid regex")
});
static EXPOSURE_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)EXPOSURE[_\-=:\s]?(\d+(?:\.\d+)?)").expect("valid regex")
});
static TEMPERATURE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)TEMP[_\-=\s](-?\d+(?:\.\d+)?)").expect("valid regex")
});

/// Read metadata for one file, consulting and populating the cache.
///
/// Header failures degrade to a filename-inferred record; this never
/// fails outright.
pub fn read_cached(path: &Path, cache: &MetadataCache) -> ImageMetadata {
    if let Some(hit) = cache.lookup(path) {
        return hit;
    }
    let meta = match io::read_headers(path) {
        Ok(keywords) => from_keywords(path, &keywords),
        Err(err) => {
            warn!(path = %path.display(), %err, "header read failed, using filename fallbacks");
            from_filename(path)
        }
    };
    cache.store(path, meta.clone());
    meta
}

/// Bounded-parallel metadata reads over the given pool. Individual file
/// failures degrade per `read_cached`; only cancellation aborts the batch.
pub fn read_batch(
    paths: &[std::path::PathBuf],
    cache: &MetadataCache,
    pool: &rayon::ThreadPool,
    cancel: &CancelToken,
) -> Result<Vec<ImageMetadata>> {
    pool.install(|| {
        paths
            .par_iter()
            .map(|p| {
                cancel.check()?;
                Ok(read_cached(p, cache))
            })
            .collect()
    })
}

/// Default parallelism for metadata batches.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 4)
        .unwrap_or(16)
}

/// Build a metadata record from parsed header keywords, falling back to
/// filename inference field by field.
pub fn from_keywords(path: &Path, keywords: &KeywordList) -> ImageMetadata {
    let exposure = first_float(keywords, EXPOSURE_KEYS)
        .filter(|e| e.is_finite() && *e >= 0.0)
        .or_else(|| exposure_from_filename(path));
    let binning = first_value(keywords, BINNING_KEYS).map(|v| v.to_ascii_uppercase());
    let temperature =
        first_float(keywords, TEMPERATURE_KEYS).or_else(|| temperature_from_filename(path));
    let header_type = first_value(keywords, TYPE_KEYS);
    let frame_type = header_type
        .as_deref()
        .map(classify_frame_type)
        .filter(|t| *t != FrameType::Unknown)
        .unwrap_or_else(|| frame_type_from_filename(path));

    ImageMetadata {
        path: path.to_path_buf(),
        frame_type,
        exposure,
        binning,
        gain: first_float(keywords, GAIN_KEYS),
        offset: first_float(keywords, OFFSET_KEYS),
        temperature,
        filter: first_value(keywords, FILTER_KEYS),
        date_obs: first_value(keywords, DATE_KEYS),
    }
}

/// Filename-only record: exposure, temperature, and frame type inference.
pub fn from_filename(path: &Path) -> ImageMetadata {
    ImageMetadata {
        exposure: exposure_from_filename(path),
        temperature: temperature_from_filename(path),
        frame_type: frame_type_from_filename(path),
        ..ImageMetadata::fallback(path.to_path_buf())
    }
}

fn first_value(keywords: &KeywordList, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|n| keywords.get(n))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// Numeric parse in the invariant (decimal-point) locale.
fn first_float(keywords: &KeywordList, names: &[&str]) -> Option<f64> {
    first_value(keywords, names).and_then(|v| parse_float(&v))
}

fn parse_float(value: &str) -> Option<f64> {
    value.trim().trim_matches('\'').trim().parse::<f64>().ok()
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

fn exposure_from_filename(path: &Path) -> Option<f64> {
    let name = file_name(path);
    EXPOSURE_SUFFIX_RE
        .captures(name)
        .or_else(|| EXPOSURE_LABEL_RE.captures(name))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|e| e.is_finite() && *e >= 0.0)
}

fn temperature_from_filename(path: &Path) -> Option<f64> {
    TEMPERATURE_NAME_RE
        .captures(file_name(path))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

fn frame_type_from_filename(path: &Path) -> FrameType {
    classify_frame_type(file_name(path))
}

/// Classify a type string or filename. The longest compound token wins:
/// MASTERDARKFLAT before MASTERDARK before DARKFLAT before DARK, and so on.
/// Separators are ignored so "Master Flat" and "MASTER_FLAT" both match.
pub fn classify_frame_type(text: &str) -> FrameType {
    let compact: String = text
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_uppercase();

    const TOKENS: &[(&str, FrameType)] = &[
        ("MASTERDARKFLAT", FrameType::MasterDarkFlat),
        ("MASTERDARK", FrameType::MasterDark),
        ("MASTERFLAT", FrameType::MasterFlat),
        ("MASTERBIAS", FrameType::MasterBias),
        ("DARKFLAT", FrameType::DarkFlat),
        ("DARK", FrameType::Dark),
        ("FLAT", FrameType::Flat),
        ("BIAS", FrameType::Bias),
        ("LIGHT", FrameType::Light),
    ];
    for (token, frame_type) in TOKENS {
        if compact.contains(token) {
            return *frame_type;
        }
    }
    FrameType::Unknown
}
