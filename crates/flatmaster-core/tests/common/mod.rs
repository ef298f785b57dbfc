#![allow(dead_code)]

use std::path::Path;

use ndarray::Array3;

use flatmaster_core::image::ImageData;

/// Format one 80-byte FITS header card.
pub fn fits_card(name: &str, value: &str) -> Vec<u8> {
    let text = if value.parse::<f64>().is_ok() || value == "T" || value == "F" {
        format!("{name:<8}= {value:>20}")
    } else {
        format!("{name:<8}= '{value}'")
    };
    let mut card = text.into_bytes();
    card.resize(80, b' ');
    card
}

/// Build a complete FITS header block sequence for the given cards.
pub fn fits_header(cards: &[(&str, &str)]) -> Vec<u8> {
    let mut buf = Vec::new();
    for (name, value) in cards {
        buf.extend_from_slice(&fits_card(name, value));
    }
    let mut end = b"END".to_vec();
    end.resize(80, b' ');
    buf.extend_from_slice(&end);
    pad_block(&mut buf, b' ');
    buf
}

fn pad_block(buf: &mut Vec<u8>, fill: u8) {
    let rem = buf.len() % 2880;
    if rem != 0 {
        buf.resize(buf.len() + 2880 - rem, fill);
    }
}

/// Build a BITPIX=-32 FITS file with a constant-valued plane plus the
/// given extra header cards.
pub fn build_fits_f32(width: usize, height: usize, extra: &[(&str, &str)], fill: f32) -> Vec<u8> {
    let w = width.to_string();
    let h = height.to_string();
    let mut cards: Vec<(&str, &str)> = vec![
        ("SIMPLE", "T"),
        ("BITPIX", "-32"),
        ("NAXIS", "2"),
        ("NAXIS1", &w),
        ("NAXIS2", &h),
    ];
    cards.extend_from_slice(extra);
    let mut buf = fits_header(&cards);
    for _ in 0..width * height {
        buf.extend_from_slice(&fill.to_be_bytes());
    }
    pad_block(&mut buf, 0);
    buf
}

/// Build a BITPIX=16 FITS file from raw signed samples, with BZERO/BSCALE
/// cards included in `extra` if desired.
pub fn build_fits_i16(width: usize, height: usize, extra: &[(&str, &str)], raw: &[i16]) -> Vec<u8> {
    assert_eq!(raw.len(), width * height);
    let w = width.to_string();
    let h = height.to_string();
    let mut cards: Vec<(&str, &str)> = vec![
        ("SIMPLE", "T"),
        ("BITPIX", "16"),
        ("NAXIS", "2"),
        ("NAXIS1", &w),
        ("NAXIS2", &h),
    ];
    cards.extend_from_slice(extra);
    let mut buf = fits_header(&cards);
    for &v in raw {
        buf.extend_from_slice(&v.to_be_bytes());
    }
    pad_block(&mut buf, 0);
    buf
}

/// Build a monolithic XISF file by hand: Float32 little-endian samples,
/// constant fill, the given FITSKeyword elements.
pub fn build_xisf_f32(
    width: usize,
    height: usize,
    channels: usize,
    keywords: &[(&str, &str)],
    fill: f32,
) -> Vec<u8> {
    let data_len = width * height * channels * 4;
    let mut kw_xml = String::new();
    for (name, value) in keywords {
        kw_xml.push_str(&format!(
            "<FITSKeyword name=\"{name}\" value=\"{value}\"/>"
        ));
    }

    // Mirror the writer's layout: header padded to 4096, attachment after.
    let build = |offset: usize| {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <xisf version=\"1.0\" xmlns=\"http://www.pixinsight.com/xisf\">\
             <Image geometry=\"{width}:{height}:{channels}\" sampleFormat=\"Float32\" \
             colorSpace=\"Gray\" location=\"attachment:{offset}:{data_len}\">{kw_xml}</Image>\
             </xisf>"
        )
    };
    let mut padded = build(0).len().div_ceil(4096) * 4096;
    let mut xml = build(16 + padded);
    if xml.len().div_ceil(4096) * 4096 != padded {
        padded = xml.len().div_ceil(4096) * 4096;
        xml = build(16 + padded);
    }

    let mut buf = Vec::new();
    buf.extend_from_slice(b"XISF0100");
    buf.extend_from_slice(&(padded as u32).to_le_bytes());
    buf.extend_from_slice(&[0u8; 4]);
    buf.extend_from_slice(xml.as_bytes());
    buf.resize(16 + padded, b' ');
    for _ in 0..width * height * channels {
        buf.extend_from_slice(&fill.to_le_bytes());
    }
    buf
}

/// Write raw bytes to `dir/name` and return the full path.
pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("write test file");
    path
}

/// Constant-valued single-channel image for writer tests.
pub fn constant_image(width: usize, height: usize, fill: f64) -> ImageData {
    ImageData::new(Array3::from_elem((1, height, width), fill))
}
