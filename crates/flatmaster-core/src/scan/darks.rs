//! Dark library scan and post-scan temperature backfill.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::meta::reader::read_batch;
use crate::meta::{FrameType, MetadataCache};
use crate::pipeline::types::{ProgressSink, ScanProgress};
use crate::scan::scanner::{supported_files, walk_directories};

/// One calibration candidate in the dark library.
#[derive(Clone, Debug)]
pub struct DarkFrame {
    pub path: PathBuf,
    pub frame_type: FrameType,
    /// Seconds; bias frames with no recorded exposure adopt 0.
    pub exposure: f64,
    pub binning: Option<String>,
    pub gain: Option<f64>,
    pub offset: Option<f64>,
    /// May be backfilled after the scan.
    pub temperature: Option<f64>,
    /// Callers may deselect entries before matching.
    pub selected: bool,
    /// Directory the frame was cataloged from.
    pub origin: PathBuf,
}

/// Walk the dark roots and catalog every usable calibration frame.
///
/// Dark-class frames require a recorded exposure; bias-class frames adopt
/// exposure 0 when none is present. Everything else (including stray
/// master flats) is ignored.
pub fn scan_dark_roots(
    roots: &[PathBuf],
    cache: &MetadataCache,
    pool: &rayon::ThreadPool,
    cancel: &CancelToken,
    sink: &dyn ProgressSink,
) -> Result<Vec<DarkFrame>> {
    let mut catalog = Vec::new();
    let mut progress = ScanProgress::default();

    for root in roots {
        if !root.is_dir() {
            warn!(root = %root.display(), "dark root not found, skipping");
            continue;
        }
        for dir in walk_directories(root, cancel)? {
            let files = supported_files(&dir, false, &mut progress);
            progress.directories += 1;
            progress.current = dir.clone();
            sink.scan_progress(&progress);
            if files.is_empty() {
                continue;
            }

            for meta in read_batch(&files, cache, pool, cancel)? {
                let exposure = match (meta.frame_type, meta.exposure) {
                    (t, Some(e)) if t.is_dark_class() => e,
                    (t, None) if t.is_dark_class() => continue,
                    (t, e) if t.is_bias_class() => e.unwrap_or(0.0),
                    _ => continue,
                };
                catalog.push(DarkFrame {
                    path: meta.path.clone(),
                    frame_type: meta.frame_type,
                    exposure,
                    binning: meta.binning.clone(),
                    gain: meta.gain,
                    offset: meta.offset,
                    temperature: meta.temperature,
                    selected: true,
                    origin: dir.clone(),
                });
            }
        }
    }

    info!(darks = catalog.len(), "dark scan complete");
    Ok(catalog)
}

/// Impute missing temperatures from darks sharing the same binning.
///
/// Two passes: donors are collected first, then the median donor
/// temperature is applied, so the result does not depend on catalog order.
pub fn backfill_temperatures(catalog: &mut [DarkFrame]) {
    let mut donors: Vec<(Option<String>, Vec<f64>)> = Vec::new();
    for dark in catalog.iter() {
        let Some(temp) = dark.temperature else {
            continue;
        };
        match donors.iter_mut().find(|(b, _)| *b == dark.binning) {
            Some((_, temps)) => temps.push(temp),
            None => donors.push((dark.binning.clone(), vec![temp])),
        }
    }

    for dark in catalog.iter_mut() {
        if dark.temperature.is_some() {
            continue;
        }
        let Some((_, temps)) = donors.iter().find(|(b, _)| *b == dark.binning) else {
            continue;
        };
        let imputed = median(temps);
        info!(
            path = %dark.path.display(),
            temperature = imputed,
            "backfilled dark temperature from binning peers"
        );
        dark.temperature = Some(imputed);
    }
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}
