/// FITS header/data unit block size in bytes.
pub const FITS_BLOCK_SIZE: usize = 2880;

/// FITS header card size in bytes (36 cards per block).
pub const FITS_CARD_SIZE: usize = 80;

/// XISF monolithic file signature.
pub const XISF_SIGNATURE: &[u8; 8] = b"XISF0100";

/// Preamble: 8-byte signature + 4-byte header length + 4 reserved bytes.
pub const XISF_PREAMBLE_SIZE: usize = 16;

/// XISF header regions are padded up to this alignment.
pub const XISF_HEADER_ALIGNMENT: usize = 4096;

/// Bucket count for the histogram-refined median.
pub const MEDIAN_BINS: usize = 1 << 20;

/// Exposures closer than this are the same exposure.
pub const EXPOSURE_EXACT_TOLERANCE: f64 = 1e-3;

/// Largest exposure delta usable without dark optimization.
pub const NEAREST_NO_OPTIMIZE_MAX_S: f64 = 2.0;

/// Largest exposure delta usable with dark optimization.
pub const NEAREST_OPTIMIZE_MAX_S: f64 = 10.0;

/// Huber winsorization clamp half-width in sigmas.
pub const WINSORIZATION_CLAMP_SIGMA: f64 = 1.5;

/// Correction restoring an unbiased sigma after winsorization.
pub const WINSORIZATION_SIGMA_CORRECTION: f64 = 1.134;

/// Relative sigma change below which the winsorization loop has converged.
pub const WINSORIZATION_CONVERGENCE: f64 = 0.0005;

/// Upper bound on winsorized sigma clip iterations.
pub const MAX_REJECTION_ITERATIONS: usize = 10;

/// Rejection never drops a pixel column below this many values.
pub const MIN_KEPT_VALUES: usize = 3;

/// Exposure groups below this size are discarded.
pub const MIN_GROUP_SIZE: usize = 3;

/// Small epsilon guarding divisions and sigma tests.
pub const EPSILON: f64 = 1e-15;

/// File extensions recognized as calibration frames (lower-case).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["fits", "fit", "xisf"];

/// Directory names never descended into during scans (lower-case).
pub const RESERVED_DIR_NAMES: &[&str] =
    &["_darkmasters", "_calibratedflats", "masters", "_processed"];

/// Output files carrying this prefix are never consumed as inputs.
pub const MASTER_FLAT_PREFIX: &str = "masterflat_";

/// Suffix appended to a base root to form the mirrored output root.
pub const PROCESSED_SUFFIX: &str = "_processed";

/// Base name for the per-group calibrated staging directory.
pub const CALIBRATED_SUBDIR_BASE: &str = "_CalibratedFlats";

/// Postfix appended to calibrated frame file stems.
pub const CALIBRATED_POSTFIX: &str = "_c";
