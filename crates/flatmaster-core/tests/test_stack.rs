mod common;

use flatmaster_core::image::ImageData;
use flatmaster_core::stack::{
    mean_combine, percentile_clip_combine, winsorized_sigma_clip_combine, SigmaThresholds,
    PERCENTILE_CLIP_HIGH, PERCENTILE_CLIP_LOW,
};

use common::constant_image;

fn frames_of(values: &[f64]) -> Vec<ImageData> {
    values.iter().map(|&v| constant_image(4, 4, v)).collect()
}

fn unit_factors(n: usize) -> Vec<f64> {
    vec![1.0; n]
}

// ---------------------------------------------------------------------------
// mean_combine
// ---------------------------------------------------------------------------

#[test]
fn test_mean_of_two() {
    let frames = frames_of(&[0.0, 1.0]);
    let result = mean_combine(&frames).unwrap();
    for &v in result.iter() {
        assert!((v - 0.5).abs() < 1e-12);
    }
}

#[test]
fn test_mean_empty_error() {
    assert!(mean_combine(&[]).is_err());
}

// ---------------------------------------------------------------------------
// percentile_clip_combine
// ---------------------------------------------------------------------------

#[test]
fn test_percentile_three_frames_drops_nothing() {
    // floor(3 * 0.20) = 0 low, floor(3 * 0.10) = 0 high.
    let frames = frames_of(&[0.9, 1.0, 1.1]);
    let result = percentile_clip_combine(
        &frames,
        &unit_factors(3),
        PERCENTILE_CLIP_LOW,
        PERCENTILE_CLIP_HIGH,
    )
    .unwrap();
    for &v in result.iter() {
        assert!((v - 1.0).abs() < 1e-12);
    }
}

#[test]
fn test_percentile_five_frames_drops_one_low() {
    // floor(5 * 0.20) = 1 low, floor(5 * 0.10) = 0 high: the 0.1 outlier
    // is dropped, the rest average.
    let frames = frames_of(&[0.1, 1.0, 1.0, 1.0, 1.0]);
    let result = percentile_clip_combine(
        &frames,
        &unit_factors(5),
        PERCENTILE_CLIP_LOW,
        PERCENTILE_CLIP_HIGH,
    )
    .unwrap();
    for &v in result.iter() {
        assert!((v - 1.0).abs() < 1e-12);
    }
}

#[test]
fn test_percentile_averages_original_not_equalized() {
    // Equalized ranking decides survival; the surviving original values
    // are what get averaged.
    let frames = frames_of(&[2.0, 1.0, 1.0, 1.0, 1.0]);
    let mut factors = unit_factors(5);
    factors[0] = 0.05; // equalized 0.1: ranked lowest, dropped
    let result = percentile_clip_combine(
        &frames,
        &factors,
        PERCENTILE_CLIP_LOW,
        PERCENTILE_CLIP_HIGH,
    )
    .unwrap();
    for &v in result.iter() {
        assert!((v - 1.0).abs() < 1e-12);
    }
}

// ---------------------------------------------------------------------------
// winsorized_sigma_clip_combine
// ---------------------------------------------------------------------------

fn sigmas(low: f64, high: f64) -> SigmaThresholds {
    SigmaThresholds { low, high }
}

#[test]
fn test_winsorized_rejects_single_outlier() {
    // Six frames, one extreme outlier; with 5-sigma thresholds the master
    // equals the mean of the five clean values.
    let frames = frames_of(&[0.5, 0.5, 0.5, 0.5, 0.5, 5.0]);
    let result =
        winsorized_sigma_clip_combine(&frames, &unit_factors(6), sigmas(5.0, 5.0)).unwrap();
    for &v in result.iter() {
        assert!((v - 0.5).abs() < 1e-9, "got {v}");
    }
}

#[test]
fn test_winsorized_low_outlier_rejected_too() {
    let frames = frames_of(&[1.0, 1.0, 1.0, 1.0, 1.0, -4.0]);
    let result =
        winsorized_sigma_clip_combine(&frames, &unit_factors(6), sigmas(5.0, 5.0)).unwrap();
    for &v in result.iter() {
        assert!((v - 1.0).abs() < 1e-9);
    }
}

#[test]
fn test_infinite_sigma_returns_plain_mean() {
    let values = [0.1, 0.4, 0.2, 0.9, 0.6, 0.8];
    let frames = frames_of(&values);
    let expected: f64 = values.iter().sum::<f64>() / values.len() as f64;
    let result = winsorized_sigma_clip_combine(
        &frames,
        &unit_factors(6),
        sigmas(f64::INFINITY, f64::INFINITY),
    )
    .unwrap();
    for &v in result.iter() {
        assert!((v - expected).abs() < 1e-12);
    }
}

#[test]
fn test_constant_column_short_circuits() {
    let frames = frames_of(&[0.5; 8]);
    let result =
        winsorized_sigma_clip_combine(&frames, &unit_factors(8), sigmas(5.0, 5.0)).unwrap();
    for &v in result.iter() {
        assert!((v - 0.5).abs() < 1e-12);
    }
}

#[test]
fn test_rejection_never_drops_below_three() {
    // Aggressive thresholds on a wildly spread column: at least three
    // values must survive.
    let frames = frames_of(&[0.0, 10.0, 20.0, 30.0, 40.0, 50.0]);
    let result =
        winsorized_sigma_clip_combine(&frames, &unit_factors(6), sigmas(0.01, 0.01)).unwrap();
    // Mean over >= 3 surviving values is finite and within the data range.
    for &v in result.iter() {
        assert!(v.is_finite());
        assert!((0.0..=50.0).contains(&v));
    }
}

#[test]
fn test_equalized_values_drive_rejection() {
    // The last frame's raw value looks like an outlier, but its equalize
    // factor brings it in line, so nothing is rejected.
    let frames = frames_of(&[1.0, 1.0, 1.0, 1.0, 1.0, 2.0]);
    let mut factors = unit_factors(6);
    factors[5] = 0.5;
    let result =
        winsorized_sigma_clip_combine(&frames, &factors, sigmas(5.0, 5.0)).unwrap();
    let expected = (5.0 + 2.0) / 6.0;
    for &v in result.iter() {
        assert!((v - expected).abs() < 1e-12);
    }
}
