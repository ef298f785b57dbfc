//! FITS reader and writer.
//!
//! Covers the subset of the standard seen in flat/dark calibration
//! pipelines: a primary HDU with BITPIX in {8, 16, 32, -32, -64},
//! NAXIS 2 or 3, big-endian samples, 2880-byte blocks of 80-byte cards.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use memmap2::Mmap;
use tracing::warn;

use crate::consts::{FITS_BLOCK_SIZE, FITS_CARD_SIZE};
use crate::error::{FlatError, Result};
use crate::image::{ImageData, KeywordList};

/// Hard cap on header size: no calibration frame carries more.
const MAX_HEADER_BLOCKS: usize = 1000;

/// Read only the primary header keywords.
pub fn read_headers(path: &Path) -> Result<KeywordList> {
    let mut file = File::open(path)?;
    let (keywords, _) = read_header_blocks(&mut file, path)?;
    Ok(keywords)
}

/// Read keywords and the full pixel plane.
pub fn read(path: &Path) -> Result<ImageData> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };

    let mut cursor = &mmap[..];
    let (keywords, header_len) = read_header_blocks(&mut cursor, path)?;

    let geom = Geometry::from_keywords(path, &keywords)?;
    let data_len = geom.data_byte_len();
    let data_end = header_len + data_len;
    if mmap.len() < data_end {
        return Err(FlatError::BadGeometry {
            path: path.to_path_buf(),
            expected: format!("{data_len} data bytes"),
            actual: format!("{} bytes past header", mmap.len().saturating_sub(header_len)),
        });
    }

    let buf = decode_samples(&mmap[header_len..data_end], &geom);
    let mut image = ImageData::from_flat(path, geom.width, geom.height, geom.channels, buf)?;
    image.keywords = keywords;
    Ok(image)
}

/// Write a primary HDU with BITPIX=-32, big-endian Float32 samples.
pub fn write(path: &Path, image: &ImageData) -> Result<()> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);

    let mut cards: Vec<String> = Vec::new();
    cards.push(format_card("SIMPLE", "T"));
    cards.push(format_card("BITPIX", "-32"));
    let naxis = if image.channels() > 1 { 3 } else { 2 };
    cards.push(format_card("NAXIS", &naxis.to_string()));
    cards.push(format_card("NAXIS1", &image.width().to_string()));
    cards.push(format_card("NAXIS2", &image.height().to_string()));
    if naxis == 3 {
        cards.push(format_card("NAXIS3", &image.channels().to_string()));
    }
    for kw in image.keywords.without_structural().iter() {
        cards.push(format_card(&kw.name, &kw.value));
    }
    cards.push(format!("{:<80}", "END"));

    let mut header: Vec<u8> = cards.concat().into_bytes();
    pad_to_block(&mut header, b' ');
    out.write_all(&header)?;

    let mut data = Vec::with_capacity(image.sample_count() * 4);
    for &v in image.samples() {
        data.extend_from_slice(&(v as f32).to_be_bytes());
    }
    pad_to_block(&mut data, 0);
    out.write_all(&data)?;
    out.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Header parsing
// ---------------------------------------------------------------------------

/// Consume 2880-byte blocks until the END card; return the keywords and the
/// number of header bytes consumed.
fn read_header_blocks(reader: &mut impl Read, path: &Path) -> Result<(KeywordList, usize)> {
    let mut keywords = KeywordList::new();
    let mut block = [0u8; FITS_BLOCK_SIZE];
    let mut consumed = 0usize;

    for _ in 0..MAX_HEADER_BLOCKS {
        if reader.read_exact(&mut block).is_err() {
            return Err(FlatError::TruncatedHeader(path.to_path_buf()));
        }
        consumed += FITS_BLOCK_SIZE;

        for card in block.chunks_exact(FITS_CARD_SIZE) {
            let text = String::from_utf8_lossy(card);
            let trimmed = text.trim_end();
            if trimmed == "END" || trimmed.starts_with("END ") {
                return Ok((keywords, consumed));
            }
            if trimmed.is_empty() {
                continue;
            }
            match parse_card(&text) {
                Some((name, value)) => keywords.push(name, value),
                None => {
                    // COMMENT/HISTORY and free-text cards carry no value.
                    if !text.starts_with("COMMENT") && !text.starts_with("HISTORY") {
                        warn!(path = %path.display(), card = trimmed, "skipping unparsable card");
                    }
                }
            }
        }
    }

    Err(FlatError::MalformedHeader {
        path: path.to_path_buf(),
        detail: format!("no END card within {MAX_HEADER_BLOCKS} blocks"),
    })
}

/// Split one `KEY = VALUE / COMMENT` card. Returns `None` for cards without
/// a value indicator.
fn parse_card(card: &str) -> Option<(String, String)> {
    let eq = card.find('=')?;
    if eq > 8 {
        return None;
    }
    let name = card[..eq].trim().to_string();
    if name.is_empty() {
        return None;
    }

    let rest = &card[eq + 1..];
    let value = if rest.trim_start().starts_with('\'') {
        // Quoted string: the comment separator only counts after the close
        // quote. Embedded quotes are doubled per the standard.
        let body = &rest[rest.find('\'').unwrap_or(0) + 1..];
        let mut out = String::new();
        let mut chars = body.chars().peekable();
        let mut closed = false;
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    out.push('\'');
                    chars.next();
                } else {
                    closed = true;
                    break;
                }
            } else {
                out.push(c);
            }
        }
        if !closed {
            return None;
        }
        out.trim().to_string()
    } else {
        let before_comment = match rest.find('/') {
            Some(slash) => &rest[..slash],
            None => rest,
        };
        before_comment.trim().to_string()
    };

    Some((name, value))
}

// ---------------------------------------------------------------------------
// Pixel geometry and decoding
// ---------------------------------------------------------------------------

struct Geometry {
    width: usize,
    height: usize,
    channels: usize,
    bitpix: i32,
    bscale: f64,
    bzero: f64,
}

impl Geometry {
    fn from_keywords(path: &Path, keywords: &KeywordList) -> Result<Self> {
        let get_usize = |name: &str| -> Option<usize> {
            keywords.get(name).and_then(|v| v.trim().parse().ok())
        };
        let get_f64 = |name: &str| -> Option<f64> {
            keywords.get(name).and_then(|v| v.trim().parse().ok())
        };

        let naxis = get_usize("NAXIS").ok_or_else(|| FlatError::MalformedHeader {
            path: path.to_path_buf(),
            detail: "missing NAXIS".into(),
        })?;
        if !(2..=3).contains(&naxis) {
            return Err(FlatError::BadGeometry {
                path: path.to_path_buf(),
                expected: "NAXIS 2 or 3".into(),
                actual: format!("NAXIS {naxis}"),
            });
        }

        let width = get_usize("NAXIS1").unwrap_or(0);
        let height = get_usize("NAXIS2").unwrap_or(0);
        let channels = if naxis == 3 {
            get_usize("NAXIS3").unwrap_or(0)
        } else {
            1
        };
        if width == 0 || height == 0 || channels == 0 {
            return Err(FlatError::BadGeometry {
                path: path.to_path_buf(),
                expected: "non-zero NAXIS1..3".into(),
                actual: format!("{width}x{height}x{channels}"),
            });
        }

        let bitpix: i32 = keywords
            .get("BITPIX")
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| FlatError::MalformedHeader {
                path: path.to_path_buf(),
                detail: "missing BITPIX".into(),
            })?;
        if !matches!(bitpix, 8 | 16 | 32 | -32 | -64) {
            return Err(FlatError::UnsupportedFormat {
                path: path.to_path_buf(),
                detail: format!("BITPIX {bitpix}"),
            });
        }

        Ok(Self {
            width,
            height,
            channels,
            bitpix,
            bscale: get_f64("BSCALE").unwrap_or(1.0),
            bzero: get_f64("BZERO").unwrap_or(0.0),
        })
    }

    fn data_byte_len(&self) -> usize {
        self.width * self.height * self.channels * (self.bitpix.unsigned_abs() as usize / 8)
    }
}

/// Decode big-endian samples to f64, applying BSCALE/BZERO and the
/// integer-range normalization rules.
fn decode_samples(raw: &[u8], geom: &Geometry) -> Vec<f64> {
    let n = geom.width * geom.height * geom.channels;
    let mut out = Vec::with_capacity(n);
    let (scale, zero) = (geom.bscale, geom.bzero);

    match geom.bitpix {
        8 => {
            for &b in &raw[..n] {
                out.push((b as f64 * scale + zero) / 255.0);
            }
        }
        16 => {
            for chunk in raw[..n * 2].chunks_exact(2) {
                let v = BigEndian::read_i16(chunk) as f64;
                out.push((v * scale + zero) / 65535.0);
            }
        }
        32 => {
            for chunk in raw[..n * 4].chunks_exact(4) {
                let v = BigEndian::read_i32(chunk) as f64;
                out.push(v * scale + zero);
            }
        }
        -32 => {
            for chunk in raw[..n * 4].chunks_exact(4) {
                let v = BigEndian::read_f32(chunk) as f64;
                out.push(v * scale + zero);
            }
        }
        -64 => {
            for chunk in raw[..n * 8].chunks_exact(8) {
                let v = BigEndian::read_f64(chunk);
                out.push(v * scale + zero);
            }
        }
        _ => unreachable!("geometry constructor rejects other BITPIX values"),
    }
    out
}

// ---------------------------------------------------------------------------
// Card formatting
// ---------------------------------------------------------------------------

/// Format one 80-byte card. Numeric and logical values are right-justified
/// in the fixed field; everything else is written as a quoted string.
/// Cards are ASCII by contract; anything else is replaced.
fn format_card(name: &str, value: &str) -> String {
    let value: String = value
        .chars()
        .map(|c| if c.is_ascii() { c } else { '?' })
        .collect();
    let mut card = format!("{:<8}= ", truncate_name(name));
    if is_bare_value(&value) {
        card.push_str(&format!("{value:>20}"));
    } else {
        let escaped = value.replace('\'', "''");
        card.push('\'');
        card.push_str(&escaped);
        card.push('\'');
    }
    card.truncate(FITS_CARD_SIZE);
    format!("{card:<80}")
}

fn truncate_name(name: &str) -> String {
    name.to_ascii_uppercase().chars().take(8).collect()
}

fn is_bare_value(value: &str) -> bool {
    value == "T" || value == "F" || value.parse::<f64>().is_ok()
}

fn pad_to_block(buf: &mut Vec<u8>, fill: u8) {
    let rem = buf.len() % FITS_BLOCK_SIZE;
    if rem != 0 {
        buf.resize(buf.len() + FITS_BLOCK_SIZE - rem, fill);
    }
}
