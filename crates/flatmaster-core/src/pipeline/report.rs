//! Run summary: counts, dark statistics, per-group outcomes.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;

use crate::matching::FrameDiagnostic;

/// Outcome of one exposure group.
#[derive(Clone, Debug, Serialize)]
pub enum GroupOutcome {
    Succeeded { master: PathBuf, duration_ms: u64 },
    Skipped { reason: String },
    Failed { error: String },
}

/// Record of one exposure group within a job.
#[derive(Clone, Debug, Serialize)]
pub struct GroupReport {
    pub exposure_key: String,
    pub frame_count: usize,
    pub match_kind: Option<String>,
    pub outcome: GroupOutcome,
    pub diagnostics: Vec<FrameDiagnostic>,
}

/// Record of one flat directory job.
#[derive(Clone, Debug, Serialize)]
pub struct JobReport {
    pub directory: PathBuf,
    pub duration_ms: u64,
    pub groups: Vec<GroupReport>,
}

/// Temperature spread of the darks actually used.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct TemperatureStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

impl TemperatureStats {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &v in values {
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }
        Some(Self {
            min,
            max,
            mean: sum / values.len() as f64,
            count: values.len(),
        })
    }
}

/// Structured result of a full run. Serializes directly for JSON
/// consumers; `Display` gives the textual rendering.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunSummary {
    pub groups_processed: usize,
    pub groups_succeeded: usize,
    pub groups_failed: usize,
    pub groups_skipped: usize,
    pub unique_darks_used: usize,
    pub dark_temperatures: Option<TemperatureStats>,
    pub masters_written: Vec<PathBuf>,
    pub warnings: Vec<String>,
    pub total_duration_ms: u64,
    pub jobs: Vec<JobReport>,
}

impl RunSummary {
    /// Fill the roll-up counters from the per-job records.
    pub fn finalize(&mut self, darks_used: &HashSet<PathBuf>, dark_temps: &[f64]) {
        self.unique_darks_used = darks_used.len();
        self.dark_temperatures = TemperatureStats::from_values(dark_temps);
        for job in &self.jobs {
            for group in &job.groups {
                self.groups_processed += 1;
                match &group.outcome {
                    GroupOutcome::Succeeded { master, .. } => {
                        self.groups_succeeded += 1;
                        self.masters_written.push(master.clone());
                    }
                    GroupOutcome::Skipped { .. } => self.groups_skipped += 1,
                    GroupOutcome::Failed { .. } => self.groups_failed += 1,
                }
            }
        }
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Master flat run summary")?;
        writeln!(
            f,
            "  groups: {} processed, {} succeeded, {} failed, {} skipped",
            self.groups_processed, self.groups_succeeded, self.groups_failed, self.groups_skipped
        )?;
        writeln!(f, "  unique darks used: {}", self.unique_darks_used)?;
        if let Some(t) = &self.dark_temperatures {
            writeln!(
                f,
                "  dark temperatures: {:.1}..{:.1} C (mean {:.1}, n={})",
                t.min, t.max, t.mean, t.count
            )?;
        }
        writeln!(f, "  total time: {} ms", self.total_duration_ms)?;
        for job in &self.jobs {
            writeln!(
                f,
                "  {} ({} ms)",
                job.directory.display(),
                job.duration_ms
            )?;
            for group in &job.groups {
                let status = match &group.outcome {
                    GroupOutcome::Succeeded { master, duration_ms } => {
                        format!("-> {} ({} ms)", master.display(), duration_ms)
                    }
                    GroupOutcome::Skipped { reason } => format!("skipped: {reason}"),
                    GroupOutcome::Failed { error } => format!("FAILED: {error}"),
                };
                writeln!(
                    f,
                    "    {} ({} frames) {}",
                    group.exposure_key, group.frame_count, status
                )?;
            }
        }
        for warning in &self.warnings {
            writeln!(f, "  warning: {warning}")?;
        }
        Ok(())
    }
}
