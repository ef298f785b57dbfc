//! Per-group integration: calibrate, normalize, reject, combine, rescale,
//! write.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::consts::{CALIBRATED_POSTFIX, CALIBRATED_SUBDIR_BASE, EPSILON};
use crate::error::{FlatError, Result};
use crate::image::ImageData;
use crate::io;
use crate::matching::DarkMatchResult;
use crate::pipeline::config::ProcessingConfig;
use crate::pipeline::naming::{infer_date, infer_filter, master_file_name};
use crate::pipeline::types::{ProgressSink, Stage};
use crate::scan::{DarkFrame, DirectoryJob, ExposureGroup};
use crate::stack::{
    histogram_median, mean_combine, percentile_clip_combine, winsorized_sigma_clip_combine,
    SigmaThresholds, PERCENTILE_CLIP_HIGH, PERCENTILE_CLIP_LOW,
};

/// Result of integrating one exposure group.
#[derive(Clone, Debug)]
pub struct GroupOutput {
    pub master_path: PathBuf,
    /// Staging directory of calibrated intermediates, if retained.
    pub calibrated_dir: Option<PathBuf>,
}

/// Integrate one exposure group into a master flat.
///
/// Frames are loaded in their sorted order, calibrated against the chosen
/// dark, normalized by their medians, combined with the rejection
/// appropriate for the stack size, rescaled to the reference median, and
/// written under the job's mirrored output directory.
pub fn integrate_group(
    job: &DirectoryJob,
    group: &ExposureGroup,
    selection: &DarkMatchResult,
    dark: &DarkFrame,
    config: &ProcessingConfig,
    cancel: &CancelToken,
    sink: &dyn ProgressSink,
) -> Result<GroupOutput> {
    let n = group.paths.len();
    if n == 0 {
        return Err(FlatError::EmptyStack);
    }
    let output_dir = job.output_dir();
    std::fs::create_dir_all(&output_dir)?;

    // Load the dark, scaling by the exposure ratio when optimization was
    // requested by the matcher.
    sink.begin_stage(Stage::LoadingDark, None);
    let mut dark_image = io::read(&dark.path)?;
    if selection.optimize_required && dark.exposure > 0.0 {
        let scale = group.exposure / dark.exposure;
        dark_image.data *= scale;
        debug!(
            dark = %dark.path.display(),
            scale,
            "scaled dark by exposure ratio"
        );
    }
    sink.finish_stage();

    // Calibrate each flat and stage the calibrated copy.
    sink.begin_stage(Stage::Calibrating, Some(n));
    let calibrated_dir = output_dir.join(format!(
        "{CALIBRATED_SUBDIR_BASE}_{}s",
        group.exposure_key()
    ));
    std::fs::create_dir_all(&calibrated_dir)?;

    let mut frames: Vec<ImageData> = Vec::with_capacity(n);
    for (done, path) in group.paths.iter().enumerate() {
        cancel.check()?;
        let mut frame = io::read(path)?;
        if !frame.same_geometry(&dark_image) {
            return Err(FlatError::BadGeometry {
                path: path.clone(),
                expected: format!(
                    "{}x{}x{}",
                    dark_image.channels(),
                    dark_image.height(),
                    dark_image.width()
                ),
                actual: format!(
                    "{}x{}x{}",
                    frame.channels(),
                    frame.height(),
                    frame.width()
                ),
            });
        }
        frame.data -= &dark_image.data;

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("frame");
        let staged = calibrated_dir.join(format!("{stem}{CALIBRATED_POSTFIX}.xisf"));
        io::write(&staged, &frame)?;

        frames.push(frame);
        sink.advance(done + 1);
    }
    sink.finish_stage();

    // Multiplicative normalization by each frame's median; the first
    // frame's median is the reference level the master is restored to.
    cancel.check()?;
    sink.begin_stage(Stage::Integrating, None);
    let mut reference_median = 0.0;
    for (i, frame) in frames.iter_mut().enumerate() {
        let median = histogram_median(frame.samples());
        if i == 0 {
            reference_median = median;
        }
        if median.abs() >= EPSILON {
            frame.data /= median;
        }
    }

    // Equalize-fluxes factors, for rejection ranking only.
    let means: Vec<f64> = frames.iter().map(|f| mean_of(f.samples())).collect();
    let factors: Vec<f64> = means
        .iter()
        .map(|&m| if m.abs() < EPSILON { 1.0 } else { means[0] / m })
        .collect();

    let mut result = if n < 3 {
        mean_combine(&frames)?
    } else if n < 6 {
        percentile_clip_combine(&frames, &factors, PERCENTILE_CLIP_LOW, PERCENTILE_CLIP_HIGH)?
    } else {
        winsorized_sigma_clip_combine(
            &frames,
            &factors,
            SigmaThresholds {
                low: config.rejection.low_sigma,
                high: config.rejection.high_sigma,
            },
        )?
    };
    result *= reference_median;
    sink.finish_stage();

    // Emit the master under the mirrored output tree.
    cancel.check()?;
    sink.begin_stage(Stage::Writing, None);
    let mut master = ImageData::new(result);
    master.keywords = frames[0].keywords.without_structural();
    master.keywords.set("IMAGETYP", "Master Flat");

    let filter = infer_filter(&group.paths, &job.relative_dir);
    let date = infer_date(&job.directory);
    let name = master_file_name(
        &date,
        &filter,
        group.representative.binning.as_deref(),
        group.exposure,
    );
    let master_path = output_dir.join(name);
    io::write(&master_path, &master)?;
    if config.write_fits_masters {
        io::write(&master_path.with_extension("fits"), &master)?;
    }
    sink.finish_stage();
    info!(master = %master_path.display(), frames = n, "master flat written");

    // Calibrated intermediates only survive when retention is requested.
    let calibrated_dir = if config.delete_calibrated {
        if let Err(err) = std::fs::remove_dir_all(&calibrated_dir) {
            warn!(dir = %calibrated_dir.display(), %err, "could not remove calibrated frames");
        }
        None
    } else {
        Some(calibrated_dir)
    };

    Ok(GroupOutput {
        master_path,
        calibrated_dir,
    })
}

fn mean_of(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
