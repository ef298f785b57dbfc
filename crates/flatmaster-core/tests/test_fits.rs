mod common;

use flatmaster_core::error::FlatError;
use flatmaster_core::io::fits;

use common::{build_fits_f32, build_fits_i16, constant_image, write_file};

#[test]
fn test_read_constant_f32_plane() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = build_fits_f32(4, 3, &[("EXPTIME", "1.5")], 0.25);
    let path = write_file(dir.path(), "flat.fits", &bytes);

    let image = fits::read(&path).unwrap();
    assert_eq!(image.width(), 4);
    assert_eq!(image.height(), 3);
    assert_eq!(image.channels(), 1);
    for &v in image.samples() {
        assert!((v - 0.25).abs() < 1e-7);
    }
    assert_eq!(image.keywords.get("EXPTIME"), Some("1.5"));
}

#[test]
fn test_read_headers_only() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = build_fits_f32(4, 4, &[("IMAGETYP", "Flat"), ("GAIN", "100")], 0.5);
    let path = write_file(dir.path(), "flat.fits", &bytes);

    let keywords = fits::read_headers(&path).unwrap();
    assert_eq!(keywords.get("IMAGETYP"), Some("Flat"));
    assert_eq!(keywords.get("GAIN"), Some("100"));
    assert_eq!(keywords.get("NAXIS1"), Some("4"));
}

#[test]
fn test_unsigned_16_bit_decode_with_bzero() {
    // Producers store unsigned 16-bit data as signed with BZERO=32768:
    // stored -32768 + 32768 = 0, stored 0 + 32768 = 32768.
    let dir = tempfile::tempdir().unwrap();
    let raw: Vec<i16> = vec![-32768, 0, 0, -32768];
    let bytes = build_fits_i16(2, 2, &[("BZERO", "32768"), ("BSCALE", "1")], &raw);
    let path = write_file(dir.path(), "dark.fits", &bytes);

    let image = fits::read(&path).unwrap();
    let s = image.samples();
    assert!((s[0] - 0.0).abs() < 1e-9);
    assert!((s[1] - 32768.0 / 65535.0).abs() < 1e-9);
}

#[test]
fn test_bscale_applies_before_normalization() {
    let dir = tempfile::tempdir().unwrap();
    let raw: Vec<i16> = vec![100; 4];
    let bytes = build_fits_i16(2, 2, &[("BSCALE", "2.0")], &raw);
    let path = write_file(dir.path(), "dark.fits", &bytes);

    let image = fits::read(&path).unwrap();
    assert!((image.samples()[0] - 200.0 / 65535.0).abs() < 1e-9);
}

#[test]
fn test_quoted_string_value_with_comment() {
    let dir = tempfile::tempdir().unwrap();
    let mut card = b"IMAGETYP= 'Master Flat'        / type of image".to_vec();
    card.resize(80, b' ');
    let mut header = card;
    let mut end = b"END".to_vec();
    end.resize(80, b' ');
    header.extend_from_slice(&end);
    header.resize(2880, b' ');
    // NAXIS cards are absent on purpose; only the header parse is tested.
    let path = write_file(dir.path(), "h.fits", &header);

    let keywords = fits::read_headers(&path).unwrap();
    assert_eq!(keywords.get("IMAGETYP"), Some("Master Flat"));
}

#[test]
fn test_truncated_header_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "bad.fits", &vec![b' '; 100]);
    match fits::read_headers(&path) {
        Err(FlatError::TruncatedHeader(_)) => {}
        other => panic!("expected TruncatedHeader, got {other:?}"),
    }
}

#[test]
fn test_unsupported_bitpix() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = common::fits_header(&[
        ("SIMPLE", "T"),
        ("BITPIX", "64"),
        ("NAXIS", "2"),
        ("NAXIS1", "2"),
        ("NAXIS2", "2"),
    ]);
    let path = write_file(dir.path(), "odd.fits", &bytes);
    match fits::read(&path) {
        Err(FlatError::UnsupportedFormat { .. }) => {}
        other => panic!("expected UnsupportedFormat, got {other:?}"),
    }
}

#[test]
fn test_short_pixel_data_is_bad_geometry() {
    let dir = tempfile::tempdir().unwrap();
    let mut bytes = build_fits_f32(8, 8, &[], 0.5);
    bytes.truncate(bytes.len() - 2880);
    let path = write_file(dir.path(), "short.fits", &bytes);
    match fits::read(&path) {
        Err(FlatError::BadGeometry { .. }) => {}
        other => panic!("expected BadGeometry, got {other:?}"),
    }
}

#[test]
fn test_write_read_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut image = constant_image(5, 4, 0.75);
    image.keywords.push("EXPTIME", "2.5");
    image.keywords.push("IMAGETYP", "Master Flat");

    let path = dir.path().join("master.fits");
    fits::write(&path, &image).unwrap();
    let back = fits::read(&path).unwrap();

    assert_eq!(back.width(), 5);
    assert_eq!(back.height(), 4);
    for &v in back.samples() {
        assert!((v - 0.75).abs() < 1e-7);
    }
    assert_eq!(back.keywords.get("EXPTIME"), Some("2.5"));
    assert_eq!(back.keywords.get("IMAGETYP"), Some("Master Flat"));
    assert_eq!(back.keywords.get("BITPIX"), Some("-32"));
}

#[test]
fn test_written_file_is_block_aligned() {
    let dir = tempfile::tempdir().unwrap();
    let image = constant_image(7, 3, 0.1);
    let path = dir.path().join("aligned.fits");
    fits::write(&path, &image).unwrap();
    let len = std::fs::metadata(&path).unwrap().len();
    assert_eq!(len % 2880, 0);
}
