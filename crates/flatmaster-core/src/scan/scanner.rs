//! Flat-frame discovery: directory walk, exposure grouping, job creation.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::consts::{
    MASTER_FLAT_PREFIX, MIN_GROUP_SIZE, PROCESSED_SUFFIX, RESERVED_DIR_NAMES,
    SUPPORTED_EXTENSIONS,
};
use crate::error::Result;
use crate::meta::reader::read_batch;
use crate::meta::types::format_exposure;
use crate::meta::{ImageMetadata, MetadataCache};
use crate::pipeline::types::{ProgressSink, ScanProgress};

/// Metadata the dark matcher scores a candidate against, taken from an
/// exposure group's representative frame.
#[derive(Clone, Debug, Default)]
pub struct MatchCriteria {
    pub binning: Option<String>,
    pub gain: Option<f64>,
    pub offset: Option<f64>,
    pub temperature: Option<f64>,
}

impl MatchCriteria {
    pub fn from_metadata(meta: &ImageMetadata) -> Self {
        Self {
            binning: meta.binning.clone(),
            gain: meta.gain,
            offset: meta.offset,
            temperature: meta.temperature,
        }
    }
}

/// A bag of flat frames sharing one rounded exposure.
#[derive(Clone, Debug)]
pub struct ExposureGroup {
    /// Seconds, rounded to the 3-decimal grouping key.
    pub exposure: f64,
    /// Sorted case-insensitively by filename for deterministic stacking.
    pub paths: Vec<PathBuf>,
    /// Metadata of the first frame.
    pub representative: ImageMetadata,
    pub criteria: MatchCriteria,
}

impl ExposureGroup {
    /// Groups below the floor are discarded before integration.
    pub fn is_valid(&self) -> bool {
        self.paths.len() >= MIN_GROUP_SIZE
    }

    pub fn exposure_key(&self) -> String {
        format_exposure(self.exposure)
    }
}

/// A unit of work: one leaf directory of flats and its valid groups.
#[derive(Clone, Debug)]
pub struct DirectoryJob {
    pub directory: PathBuf,
    pub base_root: PathBuf,
    pub output_root: PathBuf,
    pub relative_dir: PathBuf,
    pub groups: Vec<ExposureGroup>,
}

impl DirectoryJob {
    /// Directory masters and calibrated intermediates are written under.
    pub fn output_dir(&self) -> PathBuf {
        self.output_root.join(&self.relative_dir)
    }
}

/// Walk the flat roots breadth-first and build one job per directory that
/// holds at least one valid exposure group.
pub fn scan_flat_roots(
    roots: &[PathBuf],
    cache: &MetadataCache,
    pool: &rayon::ThreadPool,
    cancel: &CancelToken,
    sink: &dyn ProgressSink,
    output_override: Option<&Path>,
) -> Result<Vec<DirectoryJob>> {
    let mut jobs = Vec::new();
    let mut progress = ScanProgress::default();

    for base in roots {
        if !base.is_dir() {
            warn!(root = %base.display(), "flat root not found, skipping");
            continue;
        }
        let output_root = match output_override {
            Some(o) => o.to_path_buf(),
            None => processed_sibling(base),
        };

        for dir in walk_directories(base, cancel)? {
            let files = supported_files(&dir, true, &mut progress);
            progress.directories += 1;
            progress.current = dir.clone();
            sink.scan_progress(&progress);
            if files.is_empty() {
                continue;
            }

            let metadata = read_batch(&files, cache, pool, cancel)?;
            let groups = group_by_exposure(&files, &metadata, &dir);
            if groups.is_empty() {
                continue;
            }

            let relative_dir = dir
                .strip_prefix(base)
                .unwrap_or_else(|_| Path::new(""))
                .to_path_buf();
            jobs.push(DirectoryJob {
                directory: dir,
                base_root: base.clone(),
                output_root: output_root.clone(),
                relative_dir,
                groups,
            });
        }
    }

    info!(
        jobs = jobs.len(),
        directories = progress.directories,
        files = progress.files,
        "flat scan complete"
    );
    Ok(jobs)
}

/// `<base>_processed`, placed next to the base root.
fn processed_sibling(base: &Path) -> PathBuf {
    let name = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    base.with_file_name(format!("{name}{PROCESSED_SUFFIX}"))
}

/// Breadth-first directory listing rooted at `base`, reserved subtrees
/// pruned, children visited in sorted order. Inaccessible directories are
/// logged and treated as empty.
pub(crate) fn walk_directories(base: &Path, cancel: &CancelToken) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut queue = VecDeque::new();
    queue.push_back(base.to_path_buf());

    while let Some(dir) = queue.pop_front() {
        cancel.check()?;
        out.push(dir.clone());

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %dir.display(), %err, "cannot enumerate directory");
                continue;
            }
        };
        let mut children: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.path())
            .filter(|p| !is_reserved_dir(p))
            .collect();
        children.sort_by(|a, b| ci_name(a).cmp(&ci_name(b)));
        queue.extend(children);
    }
    Ok(out)
}

fn is_reserved_dir(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return true;
    };
    let lower = name.to_ascii_lowercase();
    name.starts_with('.') || RESERVED_DIR_NAMES.contains(&lower.as_str())
}

/// Supported image files directly inside `dir`, sorted case-insensitively
/// by filename. When `skip_masters` is set, previously produced
/// `MasterFlat_*` outputs are filtered out.
pub(crate) fn supported_files(
    dir: &Path,
    skip_masters: bool,
    progress: &mut ScanProgress,
) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), %err, "cannot list directory");
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let ext = ext.to_ascii_lowercase();
        if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
            continue;
        }
        progress.files += 1;
        match ext.as_str() {
            "fits" => progress.fits_files += 1,
            "fit" => progress.fit_files += 1,
            _ => progress.xisf_files += 1,
        }
        if skip_masters {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("")
                .to_ascii_lowercase();
            if name.starts_with(MASTER_FLAT_PREFIX) {
                continue;
            }
        }
        files.push(path);
    }
    files.sort_by(|a, b| ci_name(a).cmp(&ci_name(b)));
    files
}

fn ci_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Bucket files by the 3-decimal exposure key and keep valid groups, in
/// ascending exposure order.
fn group_by_exposure(
    files: &[PathBuf],
    metadata: &[ImageMetadata],
    dir: &Path,
) -> Vec<ExposureGroup> {
    let mut buckets: Vec<(String, Vec<usize>)> = Vec::new();
    for (i, meta) in metadata.iter().enumerate() {
        let Some(exposure) = meta.exposure else {
            debug!(path = %files[i].display(), "no exposure, excluded from grouping");
            continue;
        };
        let key = format_exposure(exposure);
        match buckets.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(i),
            None => buckets.push((key, vec![i])),
        }
    }

    let mut groups: Vec<ExposureGroup> = Vec::new();
    for (key, members) in buckets {
        if members.len() < MIN_GROUP_SIZE {
            info!(
                dir = %dir.display(),
                exposure = %key,
                files = members.len(),
                "skipping exposure group below the stack floor"
            );
            continue;
        }
        let representative = metadata[members[0]].clone();
        let exposure = key.parse::<f64>().unwrap_or(0.0);
        groups.push(ExposureGroup {
            exposure,
            paths: members.iter().map(|&i| files[i].clone()).collect(),
            criteria: MatchCriteria::from_metadata(&representative),
            representative,
        });
    }
    groups.sort_by(|a, b| {
        a.exposure
            .partial_cmp(&b.exposure)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    groups
}
