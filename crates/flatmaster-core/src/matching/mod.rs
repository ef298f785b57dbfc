//! Tiered dark/bias selection for an exposure group.
//!
//! Tier order, score weights, and every tie-break are total and
//! deterministic; candidate lists are sorted before consumption.

use std::cmp::Ordering;
use std::path::PathBuf;

use serde::Serialize;

use crate::consts::{
    EXPOSURE_EXACT_TOLERANCE, NEAREST_NO_OPTIMIZE_MAX_S, NEAREST_OPTIMIZE_MAX_S,
};
use crate::meta::FrameType;
use crate::pipeline::config::DarkMatchingConfig;
use crate::scan::{DarkFrame, ExposureGroup, MatchCriteria};

/// Outcome of dark selection for one exposure group.
#[derive(Clone, Debug, Serialize)]
pub struct DarkMatchResult {
    pub path: PathBuf,
    /// Apply exposure-ratio dark scaling before calibration.
    pub optimize_required: bool,
    /// Human-readable match tag, e.g. `MasterDark(exact)`.
    pub kind: String,
    pub score: f64,
}

/// Per-frame matching diagnostic, one per flat in the group.
#[derive(Clone, Debug, Serialize)]
pub struct FrameDiagnostic {
    pub frame: PathBuf,
    pub dark: PathBuf,
    pub reason: String,
    pub temperature_delta: Option<f64>,
    pub warnings: Vec<String>,
    pub alternatives: Vec<RejectedAlternative>,
}

/// A losing candidate and how far it trailed the winner.
#[derive(Clone, Debug, Serialize)]
pub struct RejectedAlternative {
    pub path: PathBuf,
    pub score_gap: f64,
}

/// Metadata affinity score; used only to break ties within a tier.
pub fn score(dark: &DarkFrame, criteria: &MatchCriteria, config: &DarkMatchingConfig) -> f64 {
    let mut score = 0.0;

    if config.enforce_binning {
        if let (Some(db), Some(cb)) = (&dark.binning, &criteria.binning) {
            if db == cb {
                score += 3.0;
            }
        }
    }
    if config.prefer_same_gain_offset {
        if let (Some(dg), Some(cg)) = (dark.gain, criteria.gain) {
            if (dg - cg).abs() < 0.01 {
                score += 2.0;
            }
        }
        if let (Some(doff), Some(coff)) = (dark.offset, criteria.offset) {
            if (doff - coff).abs() < 0.5 {
                score += 2.0;
            }
        }
    }
    if config.prefer_closest_temp {
        if let (Some(dt), Some(ct)) = (dark.temperature, criteria.temperature) {
            let delta = (dt - ct).abs();
            if delta <= config.max_temp_delta_c {
                score += 1.5 - 0.2 * delta;
            }
        }
    }
    score
}

/// Fixed tie-break ranking; lower is preferred.
fn type_priority(frame_type: FrameType) -> u8 {
    match frame_type {
        FrameType::MasterDarkFlat => 0,
        FrameType::DarkFlat => 1,
        FrameType::MasterDark => 2,
        FrameType::Dark => 3,
        FrameType::MasterBias => 4,
        FrameType::Bias => 5,
        _ => u8::MAX,
    }
}

struct Candidate<'a> {
    dark: &'a DarkFrame,
    score: f64,
    delta: f64,
}

fn ci_path(path: &PathBuf) -> String {
    path.to_string_lossy().to_ascii_lowercase()
}

/// Score-first ordering for tiers where exposure distance does not rank.
fn by_score(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| type_priority(a.dark.frame_type).cmp(&type_priority(b.dark.frame_type)))
        .then_with(|| ci_path(&a.dark.path).cmp(&ci_path(&b.dark.path)))
}

/// Distance-first ordering for the nearest-exposure tiers.
fn by_delta(a: &Candidate, b: &Candidate) -> Ordering {
    a.delta
        .partial_cmp(&b.delta)
        .unwrap_or(Ordering::Equal)
        .then_with(|| by_score(a, b))
}

/// Pick the best calibration frame for a group exposure, tier by tier:
///
/// 1. exact dark-class match (|Δ| < 1 ms)
/// 2. nearest dark-class within 2 s, no optimization
/// 3. nearest dark-class within 10 s, optimization required
/// 4. bias fallback
///
/// Tiers 2 and 3 only run when nearest-with-optimize matching is enabled.
pub fn select_dark(
    exposure: f64,
    criteria: &MatchCriteria,
    catalog: &[DarkFrame],
    config: &DarkMatchingConfig,
) -> Option<DarkMatchResult> {
    let candidates: Vec<Candidate> = catalog
        .iter()
        .filter(|d| d.selected)
        .map(|dark| Candidate {
            dark,
            score: score(dark, criteria, config),
            delta: (dark.exposure - exposure).abs(),
        })
        .collect();

    // Tier 1: exact.
    let mut exact: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.dark.frame_type.is_dark_class() && c.delta < EXPOSURE_EXACT_TOLERANCE)
        .collect();
    exact.sort_by(|a, b| by_score(a, b));
    if let Some(best) = exact.first() {
        return Some(result(best, false, format!("{}(exact)", best.dark.frame_type.tag())));
    }

    if config.allow_nearest_with_optimize {
        // Tier 2: near, no optimization. The 2.0 s boundary belongs here.
        let mut near: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| c.dark.frame_type.is_dark_class())
            .filter(|c| {
                c.delta >= EXPOSURE_EXACT_TOLERANCE && c.delta <= NEAREST_NO_OPTIMIZE_MAX_S
            })
            .collect();
        near.sort_by(|a, b| by_delta(a, b));
        if let Some(best) = near.first() {
            let kind = format!(
                "{}(nearest<=2s,{:.3}s)",
                best.dark.frame_type.tag(),
                best.dark.exposure
            );
            return Some(result(best, false, kind));
        }

        // Tier 3: near, with optimization. The 10.0 s boundary belongs here.
        let mut far: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| c.dark.frame_type.is_dark_class())
            .filter(|c| c.delta > NEAREST_NO_OPTIMIZE_MAX_S && c.delta <= NEAREST_OPTIMIZE_MAX_S)
            .collect();
        far.sort_by(|a, b| by_delta(a, b));
        if let Some(best) = far.first() {
            let kind = format!(
                "{}(nearest<=10s+optimize,{:.3}s)",
                best.dark.frame_type.tag(),
                best.dark.exposure
            );
            return Some(result(best, true, kind));
        }
    }

    // Tier 4: bias fallback.
    let mut bias: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.dark.frame_type.is_bias_class())
        .collect();
    bias.sort_by(|a, b| by_score(a, b));
    bias.first()
        .map(|best| result(best, false, best.dark.frame_type.tag().to_string()))
}

fn result(candidate: &Candidate, optimize_required: bool, kind: String) -> DarkMatchResult {
    DarkMatchResult {
        path: candidate.dark.path.clone(),
        optimize_required,
        kind,
        score: candidate.score,
    }
}

/// One diagnostic record per flat in the group: the selection, its
/// warnings, and up to five trailing alternatives with their score gaps.
pub fn group_diagnostics(
    group: &ExposureGroup,
    selection: &DarkMatchResult,
    catalog: &[DarkFrame],
    config: &DarkMatchingConfig,
) -> Vec<FrameDiagnostic> {
    let chosen = catalog.iter().find(|d| d.path == selection.path);
    let temperature_delta = chosen.and_then(|d| {
        match (d.temperature, group.criteria.temperature) {
            (Some(dt), Some(ct)) => Some((dt - ct).abs()),
            _ => None,
        }
    });

    let mut warnings = Vec::new();
    if selection.optimize_required {
        warnings.push(format!(
            "exposure optimization required ({})",
            selection.kind
        ));
    }
    if let Some(delta) = temperature_delta {
        if delta > 5.0 {
            warnings.push(format!(
                "dark temperature differs by {delta:.1} degrees C"
            ));
        }
    }

    let mut alternatives: Vec<RejectedAlternative> = catalog
        .iter()
        .filter(|d| d.selected && d.path != selection.path)
        .filter(|d| d.frame_type.is_dark_class() || d.frame_type.is_bias_class())
        .map(|d| RejectedAlternative {
            path: d.path.clone(),
            score_gap: selection.score - score(d, &group.criteria, config),
        })
        .collect();
    alternatives.sort_by(|a, b| {
        a.score_gap
            .partial_cmp(&b.score_gap)
            .unwrap_or(Ordering::Equal)
            .then_with(|| ci_path(&a.path).cmp(&ci_path(&b.path)))
    });
    alternatives.truncate(5);

    group
        .paths
        .iter()
        .map(|frame| FrameDiagnostic {
            frame: frame.clone(),
            dark: selection.path.clone(),
            reason: selection.kind.clone(),
            temperature_delta,
            warnings: warnings.clone(),
            alternatives: alternatives.clone(),
        })
        .collect()
}
