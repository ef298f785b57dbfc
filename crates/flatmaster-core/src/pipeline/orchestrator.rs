//! Run orchestration: scan, match, integrate, summarize.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::error::{FlatError, Result};
use crate::matching::{group_diagnostics, select_dark};
use crate::meta::{exposure_key, MetadataCache};
use crate::pipeline::config::ProcessingConfig;
use crate::pipeline::integrate::integrate_group;
use crate::pipeline::report::{GroupOutcome, GroupReport, JobReport, RunSummary};
use crate::pipeline::types::{ProgressSink, Stage};
use crate::scan::{backfill_temperatures, scan_dark_roots, scan_flat_roots, DarkFrame};

/// Run a full calibration pass over the given roots.
///
/// The metadata cache lives for exactly one run. Per-group failures are
/// contained and reported; cancellation propagates.
pub fn run(
    flat_roots: &[PathBuf],
    dark_roots: &[PathBuf],
    config: &ProcessingConfig,
    output_override: Option<&Path>,
    cancel: &CancelToken,
    sink: &dyn ProgressSink,
) -> Result<RunSummary> {
    let run_start = Instant::now();
    let cache = MetadataCache::new();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.metadata_parallelism.max(1))
        .build()
        .map_err(|e| FlatError::Internal(format!("thread pool: {e}")))?;

    sink.begin_stage(Stage::ScanningDarks, None);
    let mut catalog = scan_dark_roots(dark_roots, &cache, &pool, cancel, sink)?;
    backfill_temperatures(&mut catalog);
    sink.finish_stage();

    sink.begin_stage(Stage::ScanningFlats, None);
    let jobs = scan_flat_roots(flat_roots, &cache, &pool, cancel, sink, output_override)?;
    sink.finish_stage();

    let mut summary = RunSummary::default();
    let mut darks_used: HashSet<PathBuf> = HashSet::new();
    let mut dark_temps: Vec<f64> = Vec::new();

    for job in &jobs {
        cancel.check()?;
        let job_start = Instant::now();
        let mut groups = Vec::with_capacity(job.groups.len());

        for group in &job.groups {
            cancel.check()?;
            let group_start = Instant::now();
            let key = exposure_key(Some(group.exposure));

            sink.begin_stage(Stage::MatchingDarks, None);
            let selection = select_dark(group.exposure, &group.criteria, &catalog, &config.dark_matching);
            sink.finish_stage();

            let Some(selection) = selection else {
                let report = if config.require_darks {
                    warn!(dir = %job.directory.display(), exposure = %key, "no matching dark, group failed");
                    GroupReport {
                        exposure_key: key,
                        frame_count: group.paths.len(),
                        match_kind: None,
                        outcome: GroupOutcome::Failed {
                            error: FlatError::NoMatchingDark {
                                exposure: group.exposure,
                            }
                            .to_string(),
                        },
                        diagnostics: Vec::new(),
                    }
                } else {
                    let reason = format!("no matching dark at {key}");
                    warn!(dir = %job.directory.display(), exposure = %key, "no matching dark, group skipped");
                    summary.warnings.push(format!(
                        "{}: {reason}",
                        job.directory.display()
                    ));
                    GroupReport {
                        exposure_key: key,
                        frame_count: group.paths.len(),
                        match_kind: None,
                        outcome: GroupOutcome::Skipped { reason },
                        diagnostics: Vec::new(),
                    }
                };
                groups.push(report);
                continue;
            };

            let dark = catalog
                .iter()
                .find(|d| d.path == selection.path)
                .cloned()
                .unwrap_or_else(|| fallback_dark(&selection.path));
            let diagnostics = group_diagnostics(group, &selection, &catalog, &config.dark_matching);
            for diag in &diagnostics {
                for warning in &diag.warnings {
                    let tagged = format!("{}: {warning}", diag.frame.display());
                    if !summary.warnings.contains(&tagged) {
                        summary.warnings.push(tagged);
                    }
                }
            }

            let outcome =
                match integrate_group(job, group, &selection, &dark, config, cancel, sink) {
                    Ok(output) => {
                        darks_used.insert(selection.path.clone());
                        if let Some(t) = dark.temperature {
                            dark_temps.push(t);
                        }
                        GroupOutcome::Succeeded {
                            master: output.master_path,
                            duration_ms: group_start.elapsed().as_millis() as u64,
                        }
                    }
                    Err(FlatError::Cancelled) => return Err(FlatError::Cancelled),
                    Err(err) => {
                        warn!(
                            dir = %job.directory.display(),
                            exposure = %key,
                            %err,
                            "group integration failed"
                        );
                        GroupOutcome::Failed {
                            error: err.to_string(),
                        }
                    }
                };

            groups.push(GroupReport {
                exposure_key: key,
                frame_count: group.paths.len(),
                match_kind: Some(selection.kind.clone()),
                outcome,
                diagnostics,
            });
        }

        summary.jobs.push(JobReport {
            directory: job.directory.clone(),
            duration_ms: job_start.elapsed().as_millis() as u64,
            groups,
        });
    }

    summary.total_duration_ms = run_start.elapsed().as_millis() as u64;
    summary.finalize(&darks_used, &dark_temps);
    info!(
        processed = summary.groups_processed,
        succeeded = summary.groups_succeeded,
        failed = summary.groups_failed,
        "run complete"
    );
    Ok(summary)
}

/// Catalog lookup misses only if the catalog changed under us; fall back
/// to a bare record so the selected path is still used.
fn fallback_dark(path: &Path) -> DarkFrame {
    DarkFrame {
        path: path.to_path_buf(),
        frame_type: crate::meta::FrameType::Dark,
        exposure: 0.0,
        binning: None,
        gain: None,
        offset: None,
        temperature: None,
        selected: true,
        origin: path.parent().unwrap_or(Path::new("")).to_path_buf(),
    }
}
