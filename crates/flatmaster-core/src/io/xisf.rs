//! XISF monolithic reader and writer.
//!
//! Reads the formats calibration software emits (uint8/16/32, float32/64
//! attachments); writes a single attached Float32 image. The XML envelope
//! is small and regular, so it is scanned with local element/attribute
//! helpers rather than a full XML stack.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;

use crate::consts::{XISF_HEADER_ALIGNMENT, XISF_PREAMBLE_SIZE, XISF_SIGNATURE};
use crate::error::{FlatError, Result};
use crate::image::{ImageData, Keyword, KeywordList};

/// Read only the FITSKeyword entries from the XML envelope.
pub fn read_headers(path: &Path) -> Result<KeywordList> {
    let mut file = File::open(path)?;
    let xml = read_envelope(&mut file, path)?;
    Ok(parse_keywords(&xml))
}

/// Read keywords and the attached pixel block.
pub fn read(path: &Path) -> Result<ImageData> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };

    if mmap.len() < XISF_PREAMBLE_SIZE || &mmap[..8] != XISF_SIGNATURE {
        return Err(FlatError::MalformedHeader {
            path: path.to_path_buf(),
            detail: "missing XISF0100 signature".into(),
        });
    }
    let header_len = LittleEndian::read_u32(&mmap[8..12]) as usize;
    let header_end = XISF_PREAMBLE_SIZE + header_len;
    if mmap.len() < header_end {
        return Err(FlatError::TruncatedHeader(path.to_path_buf()));
    }
    let xml = std::str::from_utf8(&mmap[XISF_PREAMBLE_SIZE..header_end])
        .map_err(|_| FlatError::MalformedHeader {
            path: path.to_path_buf(),
            detail: "header is not UTF-8".into(),
        })?
        .to_string();

    let keywords = parse_keywords(&xml);
    let desc = parse_image_element(path, &xml)?;

    let expected = desc.width * desc.height * desc.channels * desc.format.bytes_per_sample();
    if desc.length < expected || mmap.len() < desc.offset + expected {
        return Err(FlatError::BadGeometry {
            path: path.to_path_buf(),
            expected: format!("{expected} attachment bytes"),
            actual: format!("{} declared, {} in file", desc.length, mmap.len()),
        });
    }

    let raw = &mmap[desc.offset..desc.offset + expected];
    let buf = desc.format.decode(raw);
    let mut image = ImageData::from_flat(path, desc.width, desc.height, desc.channels, buf)?;
    image.keywords = keywords;
    Ok(image)
}

/// Write a monolithic XISF file with one attached Float32 image.
///
/// Two-pass layout: the XML is first built with a placeholder offset, the
/// header region is rounded up to the 4096-byte alignment, and the XML is
/// rebuilt with the final offset. If the rebuilt text crosses an alignment
/// boundary the layout is recomputed once more.
pub fn write(path: &Path, image: &ImageData) -> Result<()> {
    let data_len = image.sample_count() * 4;

    let mut padded = padded_len(build_xml(image, 0, data_len).len());
    let mut xml = build_xml(image, XISF_PREAMBLE_SIZE + padded, data_len);
    if padded_len(xml.len()) != padded {
        padded = padded_len(xml.len());
        xml = build_xml(image, XISF_PREAMBLE_SIZE + padded, data_len);
    }

    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    out.write_all(XISF_SIGNATURE)?;
    out.write_all(&(padded as u32).to_le_bytes())?;
    out.write_all(&[0u8; 4])?;
    out.write_all(xml.as_bytes())?;
    // Space-pad the rest of the header region.
    let pad = padded - xml.len();
    out.write_all(&vec![b' '; pad])?;

    for &v in image.samples() {
        out.write_all(&(v as f32).to_le_bytes())?;
    }
    out.flush()?;
    Ok(())
}

fn padded_len(xml_len: usize) -> usize {
    xml_len.div_ceil(XISF_HEADER_ALIGNMENT) * XISF_HEADER_ALIGNMENT
}

// ---------------------------------------------------------------------------
// Envelope scanning
// ---------------------------------------------------------------------------

/// Read the preamble and the declared header region from a stream.
fn read_envelope(reader: &mut impl Read, path: &Path) -> Result<String> {
    let mut preamble = [0u8; XISF_PREAMBLE_SIZE];
    reader
        .read_exact(&mut preamble)
        .map_err(|_| FlatError::TruncatedHeader(path.to_path_buf()))?;
    if &preamble[..8] != XISF_SIGNATURE {
        return Err(FlatError::MalformedHeader {
            path: path.to_path_buf(),
            detail: "missing XISF0100 signature".into(),
        });
    }
    let header_len = LittleEndian::read_u32(&preamble[8..12]) as usize;
    let mut buf = vec![0u8; header_len];
    reader
        .read_exact(&mut buf)
        .map_err(|_| FlatError::TruncatedHeader(path.to_path_buf()))?;
    String::from_utf8(buf).map_err(|_| FlatError::MalformedHeader {
        path: path.to_path_buf(),
        detail: "header is not UTF-8".into(),
    })
}

/// Collect `FITSKeyword` elements in document order. Single-quote wrappers
/// around values are stripped to match FITS string conventions.
fn parse_keywords(xml: &str) -> KeywordList {
    elements(xml, "FITSKeyword")
        .into_iter()
        .filter_map(|attrs| {
            let name = attr(&attrs, "name")?;
            let value = attr(&attrs, "value").unwrap_or_default();
            let value = value.trim().trim_matches('\'').trim().to_string();
            Some(Keyword::new(name, value))
        })
        .collect()
}

struct ImageDesc {
    width: usize,
    height: usize,
    channels: usize,
    format: SampleFormat,
    offset: usize,
    length: usize,
}

fn parse_image_element(path: &Path, xml: &str) -> Result<ImageDesc> {
    let malformed = |detail: &str| FlatError::MalformedHeader {
        path: path.to_path_buf(),
        detail: detail.into(),
    };

    let attrs = elements(xml, "Image")
        .into_iter()
        .next()
        .ok_or_else(|| malformed("no Image element"))?;

    let geometry = attr(&attrs, "geometry").ok_or_else(|| malformed("Image lacks geometry"))?;
    let mut dims = geometry.split(':').map(|d| d.trim().parse::<usize>());
    let width = dims
        .next()
        .and_then(|d| d.ok())
        .ok_or_else(|| malformed("bad geometry"))?;
    let height = dims
        .next()
        .and_then(|d| d.ok())
        .ok_or_else(|| malformed("bad geometry"))?;
    let channels = match dims.next() {
        Some(Ok(c)) => c,
        Some(Err(_)) => return Err(malformed("bad geometry")),
        None => 1,
    };
    if width == 0 || height == 0 || channels == 0 {
        return Err(FlatError::BadGeometry {
            path: path.to_path_buf(),
            expected: "non-zero geometry".into(),
            actual: geometry,
        });
    }

    let format_name =
        attr(&attrs, "sampleFormat").ok_or_else(|| malformed("Image lacks sampleFormat"))?;
    let format = SampleFormat::parse(&format_name).ok_or_else(|| FlatError::UnsupportedFormat {
        path: path.to_path_buf(),
        detail: format_name.clone(),
    })?;

    let location = attr(&attrs, "location").ok_or_else(|| malformed("Image lacks location"))?;
    let mut parts = location.split(':');
    if parts.next() != Some("attachment") {
        return Err(malformed("only attachment locations are supported"));
    }
    let offset = parts
        .next()
        .and_then(|p| p.trim().parse::<usize>().ok())
        .ok_or_else(|| malformed("bad attachment offset"))?;
    let length = parts
        .next()
        .and_then(|p| p.trim().parse::<usize>().ok())
        .ok_or_else(|| malformed("bad attachment length"))?;

    Ok(ImageDesc {
        width,
        height,
        channels,
        format,
        offset,
        length,
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SampleFormat {
    UInt8,
    UInt16,
    UInt32,
    Float32,
    Float64,
}

impl SampleFormat {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uint8" => Some(Self::UInt8),
            "uint16" => Some(Self::UInt16),
            "uint32" => Some(Self::UInt32),
            "float32" => Some(Self::Float32),
            "float64" => Some(Self::Float64),
            _ => None,
        }
    }

    fn bytes_per_sample(self) -> usize {
        match self {
            Self::UInt8 => 1,
            Self::UInt16 => 2,
            Self::UInt32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    /// Little-endian decode; integer formats normalize by their type max.
    fn decode(self, raw: &[u8]) -> Vec<f64> {
        match self {
            Self::UInt8 => raw.iter().map(|&b| b as f64 / u8::MAX as f64).collect(),
            Self::UInt16 => raw
                .chunks_exact(2)
                .map(|c| LittleEndian::read_u16(c) as f64 / u16::MAX as f64)
                .collect(),
            Self::UInt32 => raw
                .chunks_exact(4)
                .map(|c| LittleEndian::read_u32(c) as f64 / u32::MAX as f64)
                .collect(),
            Self::Float32 => raw
                .chunks_exact(4)
                .map(|c| LittleEndian::read_f32(c) as f64)
                .collect(),
            Self::Float64 => raw.chunks_exact(8).map(LittleEndian::read_f64).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Minimal XML helpers
// ---------------------------------------------------------------------------

/// Attribute strings of every element with the given local name.
fn elements(xml: &str, local: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = xml;
    while let Some(pos) = find_element(rest, local) {
        let after = &rest[pos..];
        match after.find('>') {
            Some(end) => {
                let tag = &after[..end];
                let attrs_start = tag.find(char::is_whitespace).unwrap_or(tag.len());
                out.push(tag[attrs_start..].trim_end_matches('/').to_string());
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    out
}

/// Position of the next `<local` or `<ns:local` opening tag.
fn find_element(xml: &str, local: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(rel) = xml[from..].find('<') {
        let at = from + rel;
        let name_start = at + 1;
        let tail = &xml[name_start..];
        let name_len = tail
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(tail.len());
        let name = &tail[..name_len];
        let local_name = name.rsplit(':').next().unwrap_or(name);
        if local_name == local {
            return Some(at);
        }
        from = name_start + name_len.max(1);
    }
    None
}

/// Value of a named attribute within an element's attribute string.
fn attr(attrs: &str, name: &str) -> Option<String> {
    let mut rest = attrs;
    while let Some(eq) = rest.find('=') {
        let key = rest[..eq].trim();
        let after = rest[eq + 1..].trim_start();
        let quote = after.chars().next()?;
        if quote != '"' && quote != '\'' {
            return None;
        }
        let body = &after[1..];
        let close = body.find(quote)?;
        if key.eq_ignore_ascii_case(name) {
            return Some(unescape_xml(&body[..close]));
        }
        rest = &body[close + 1..];
    }
    None
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

fn build_xml(image: &ImageData, offset: usize, data_len: usize) -> String {
    let mut xml = String::with_capacity(1024);
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<xisf version=\"1.0\" xmlns=\"http://www.pixinsight.com/xisf\">\n");
    let color_space = if image.channels() == 3 { "RGB" } else { "Gray" };
    xml.push_str(&format!(
        "<Image geometry=\"{}:{}:{}\" sampleFormat=\"Float32\" colorSpace=\"{}\" location=\"attachment:{}:{}\">\n",
        image.width(),
        image.height(),
        image.channels(),
        color_space,
        offset,
        data_len,
    ));
    for kw in image.keywords.without_structural().iter() {
        xml.push_str(&format!(
            "<FITSKeyword name=\"{}\" value=\"{}\" comment=\"\"/>\n",
            escape_xml(&kw.name),
            escape_xml(&kw.value),
        ));
    }
    xml.push_str("</Image>\n");
    xml.push_str("</xisf>\n");
    xml
}
