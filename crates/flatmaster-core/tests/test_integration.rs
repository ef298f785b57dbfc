mod common;

use std::path::PathBuf;

use flatmaster_core::cancel::CancelToken;
use flatmaster_core::io;
use flatmaster_core::pipeline::report::GroupOutcome;
use flatmaster_core::pipeline::types::NoOpSink;
use flatmaster_core::pipeline::{run, ProcessingConfig};

use common::{build_fits_f32, build_xisf_f32, write_file};

fn flat_cards<'a>() -> Vec<(&'a str, &'a str)> {
    vec![("EXPTIME", "1.5"), ("IMAGETYP", "Flat")]
}

/// Three constant flats, one exact master dark: every master pixel equals
/// the calibrated level restored by the reference median.
#[test]
fn test_constant_flats_produce_flat_master() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("flats");
    let library = dir.path().join("darklib");
    std::fs::create_dir(&base).unwrap();
    std::fs::create_dir(&library).unwrap();

    for name in ["flat_001.fits", "flat_002.fits", "flat_003.fits"] {
        write_file(&base, name, &build_fits_f32(4, 4, &flat_cards(), 0.5));
    }
    write_file(
        &library,
        "masterdark_1.5s.xisf",
        &build_xisf_f32(4, 4, 1, &[("EXPTIME", "1.5")], 0.1),
    );

    let config = ProcessingConfig::default();
    let summary = run(
        &[base.clone()],
        &[library],
        &config,
        None,
        &CancelToken::new(),
        &NoOpSink,
    )
    .unwrap();

    assert_eq!(summary.groups_processed, 1);
    assert_eq!(summary.groups_succeeded, 1);
    assert_eq!(summary.groups_failed, 0);
    assert_eq!(summary.unique_darks_used, 1);
    assert_eq!(summary.masters_written.len(), 1);

    // Mirrored output root, flats at the base root itself.
    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
    let expected = dir
        .path()
        .join("flats_processed")
        .join(format!("MasterFlat_{today}_UNKNOWN_Bin1_1.5s.xisf"));
    assert_eq!(summary.masters_written[0], expected);
    assert!(expected.is_file());

    // Calibrated 0.5 - 0.1 = 0.4, normalized to 1.0, percentile clip keeps
    // all three, rescaled by the reference median 0.4.
    let master = io::read(&expected).unwrap();
    assert_eq!(master.width(), 4);
    assert_eq!(master.height(), 4);
    for &v in master.samples() {
        assert!((v - 0.4).abs() < 1e-6, "got {v}");
    }
    assert_eq!(master.keywords.get("IMAGETYP"), Some("Master Flat"));
    assert_eq!(master.keywords.get("EXPTIME"), Some("1.5"));

    // Exact match, no optimization, reported per group.
    let group = &summary.jobs[0].groups[0];
    assert_eq!(group.match_kind.as_deref(), Some("MasterDark(exact)"));
    assert_eq!(group.exposure_key, "1.5s");

    // delete_calibrated defaults on: no staging directory survives.
    assert!(!dir
        .path()
        .join("flats_processed")
        .join("_CalibratedFlats_1.5s")
        .exists());
}

#[test]
fn test_calibrated_intermediates_can_be_retained() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("flats");
    let library = dir.path().join("darklib");
    std::fs::create_dir(&base).unwrap();
    std::fs::create_dir(&library).unwrap();

    for name in ["flat_001.fits", "flat_002.fits", "flat_003.fits"] {
        write_file(&base, name, &build_fits_f32(4, 4, &flat_cards(), 0.5));
    }
    write_file(
        &library,
        "masterdark_1.5s.xisf",
        &build_xisf_f32(4, 4, 1, &[], 0.1),
    );

    let config = ProcessingConfig {
        delete_calibrated: false,
        ..ProcessingConfig::default()
    };
    run(
        &[base],
        &[library],
        &config,
        None,
        &CancelToken::new(),
        &NoOpSink,
    )
    .unwrap();

    let staged = dir.path().join("flats_processed").join("_CalibratedFlats_1.5s");
    assert!(staged.is_dir());
    let mut entries: Vec<String> = std::fs::read_dir(&staged)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    entries.sort();
    assert_eq!(
        entries,
        vec!["flat_001_c.xisf", "flat_002_c.xisf", "flat_003_c.xisf"]
    );

    // Calibrated staging carries the dark-subtracted values.
    let staged_frame = io::read(&staged.join("flat_001_c.xisf")).unwrap();
    for &v in staged_frame.samples() {
        assert!((v - 0.4).abs() < 1e-6);
    }
}

#[test]
fn test_group_without_dark_is_skipped_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("flats");
    std::fs::create_dir(&base).unwrap();
    for name in ["flat_001.fits", "flat_002.fits", "flat_003.fits"] {
        write_file(&base, name, &build_fits_f32(4, 4, &flat_cards(), 0.5));
    }

    let config = ProcessingConfig::default();
    let summary = run(
        &[base],
        &[],
        &config,
        None,
        &CancelToken::new(),
        &NoOpSink,
    )
    .unwrap();

    assert_eq!(summary.groups_processed, 1);
    assert_eq!(summary.groups_skipped, 1);
    assert_eq!(summary.groups_failed, 0);
    assert!(!summary.warnings.is_empty());
    assert!(matches!(
        &summary.jobs[0].groups[0].outcome,
        GroupOutcome::Skipped { .. }
    ));
}

#[test]
fn test_group_without_dark_fails_when_required() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("flats");
    std::fs::create_dir(&base).unwrap();
    for name in ["flat_001.fits", "flat_002.fits", "flat_003.fits"] {
        write_file(&base, name, &build_fits_f32(4, 4, &flat_cards(), 0.5));
    }

    let config = ProcessingConfig {
        require_darks: true,
        ..ProcessingConfig::default()
    };
    let summary = run(
        &[base],
        &[],
        &config,
        None,
        &CancelToken::new(),
        &NoOpSink,
    )
    .unwrap();

    assert_eq!(summary.groups_failed, 1);
    assert_eq!(summary.groups_succeeded, 0);
}

#[test]
fn test_mismatched_geometry_fails_only_that_group() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("flats");
    let library = dir.path().join("darklib");
    std::fs::create_dir(&base).unwrap();
    std::fs::create_dir(&library).unwrap();

    for name in ["flat_001.fits", "flat_002.fits", "flat_003.fits"] {
        write_file(&base, name, &build_fits_f32(4, 4, &flat_cards(), 0.5));
    }
    // Dark is 8x8: geometry mismatch.
    write_file(
        &library,
        "masterdark_1.5s.xisf",
        &build_xisf_f32(8, 8, 1, &[], 0.1),
    );

    let config = ProcessingConfig::default();
    let summary = run(
        &[base],
        &[library],
        &config,
        None,
        &CancelToken::new(),
        &NoOpSink,
    )
    .unwrap();

    assert_eq!(summary.groups_failed, 1);
    assert_eq!(summary.groups_succeeded, 0);
    match &summary.jobs[0].groups[0].outcome {
        GroupOutcome::Failed { error } => assert!(error.contains("geometry")),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn test_optimized_dark_scaling_is_linear() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("flats");
    let library = dir.path().join("darklib");
    std::fs::create_dir(&base).unwrap();
    std::fs::create_dir(&library).unwrap();

    // Flats at 15 s; only an 5 s dark exists, so the matcher optimizes and
    // the engine scales the dark by 15/5 = 3: 0.05 * 3 = 0.15.
    let cards = vec![("EXPTIME", "15"), ("IMAGETYP", "Flat")];
    for name in ["flat_001.fits", "flat_002.fits", "flat_003.fits"] {
        write_file(&base, name, &build_fits_f32(4, 4, &cards, 0.65));
    }
    write_file(
        &library,
        "masterdark_5s.xisf",
        &build_xisf_f32(4, 4, 1, &[("EXPTIME", "5")], 0.05),
    );

    let config = ProcessingConfig::default();
    let summary = run(
        &[base],
        &[library],
        &config,
        None,
        &CancelToken::new(),
        &NoOpSink,
    )
    .unwrap();

    assert_eq!(summary.groups_succeeded, 1);
    let group = &summary.jobs[0].groups[0];
    assert_eq!(
        group.match_kind.as_deref(),
        Some("MasterDark(nearest<=10s+optimize,5.000s)")
    );

    // Calibrated level 0.65 - 0.15 = 0.5.
    let master = io::read(&summary.masters_written[0]).unwrap();
    for &v in master.samples() {
        assert!((v - 0.5).abs() < 1e-6, "got {v}");
    }
}

#[test]
fn test_date_token_in_path_names_the_master() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("flats");
    let session = base.join("2025-11-01").join("Ha");
    let library = dir.path().join("darklib");
    std::fs::create_dir_all(&session).unwrap();
    std::fs::create_dir(&library).unwrap();

    for name in ["flat_001.fits", "flat_002.fits", "flat_003.fits"] {
        write_file(&session, name, &build_fits_f32(4, 4, &flat_cards(), 0.5));
    }
    write_file(
        &library,
        "masterdark_1.5s.xisf",
        &build_xisf_f32(4, 4, 1, &[], 0.1),
    );

    let config = ProcessingConfig::default();
    let summary = run(
        &[base],
        &[library],
        &config,
        None,
        &CancelToken::new(),
        &NoOpSink,
    )
    .unwrap();

    assert_eq!(summary.masters_written.len(), 1);
    let expected: PathBuf = dir
        .path()
        .join("flats_processed")
        .join("2025-11-01")
        .join("Ha")
        .join("MasterFlat_2025-11-01_HA_Bin1_1.5s.xisf");
    assert_eq!(summary.masters_written[0], expected);
}

#[test]
fn test_output_override_replaces_processed_root() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("flats");
    let library = dir.path().join("darklib");
    let out = dir.path().join("elsewhere");
    std::fs::create_dir(&base).unwrap();
    std::fs::create_dir(&library).unwrap();

    for name in ["flat_001.fits", "flat_002.fits", "flat_003.fits"] {
        write_file(&base, name, &build_fits_f32(4, 4, &flat_cards(), 0.5));
    }
    write_file(
        &library,
        "masterdark_1.5s.xisf",
        &build_xisf_f32(4, 4, 1, &[], 0.1),
    );

    let config = ProcessingConfig::default();
    let summary = run(
        &[base],
        &[library],
        &config,
        Some(&out),
        &CancelToken::new(),
        &NoOpSink,
    )
    .unwrap();

    assert!(summary.masters_written[0].starts_with(&out));
}

#[test]
fn test_summary_serializes_to_json() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("flats");
    std::fs::create_dir(&base).unwrap();
    for name in ["flat_001.fits", "flat_002.fits", "flat_003.fits"] {
        write_file(&base, name, &build_fits_f32(4, 4, &flat_cards(), 0.5));
    }

    let config = ProcessingConfig::default();
    let summary = run(
        &[base],
        &[],
        &config,
        None,
        &CancelToken::new(),
        &NoOpSink,
    )
    .unwrap();

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["groups_processed"], 1);
    assert_eq!(json["groups_skipped"], 1);

    let text = summary.to_string();
    assert!(text.contains("groups: 1 processed"));
}

#[test]
fn test_cancelled_run_returns_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("flats");
    std::fs::create_dir(&base).unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();
    let config = ProcessingConfig::default();
    let result = run(&[base], &[], &config, None, &cancel, &NoOpSink);
    assert!(matches!(
        result,
        Err(flatmaster_core::error::FlatError::Cancelled)
    ));
}
