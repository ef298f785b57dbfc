pub mod fits;
pub mod xisf;

use std::path::Path;

use crate::error::{FlatError, Result};
use crate::image::{ImageData, KeywordList};

/// Supported container formats, dispatched on file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    Fits,
    Xisf,
}

impl ImageFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "fits" | "fit" => Some(Self::Fits),
            "xisf" => Some(Self::Xisf),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

fn format_for(path: &Path) -> Result<ImageFormat> {
    ImageFormat::from_path(path).ok_or_else(|| FlatError::UnsupportedFormat {
        path: path.to_path_buf(),
        detail: "unrecognized extension".into(),
    })
}

/// Read only the header keywords, as far into the file as needed.
pub fn read_headers(path: &Path) -> Result<KeywordList> {
    match format_for(path)? {
        ImageFormat::Fits => fits::read_headers(path),
        ImageFormat::Xisf => xisf::read_headers(path),
    }
}

/// Read keywords and the full pixel plane.
pub fn read(path: &Path) -> Result<ImageData> {
    match format_for(path)? {
        ImageFormat::Fits => fits::read(path),
        ImageFormat::Xisf => xisf::read(path),
    }
}

/// Write an image in the format implied by the extension.
pub fn write(path: &Path, image: &ImageData) -> Result<()> {
    match format_for(path)? {
        ImageFormat::Fits => fits::write(path, image),
        ImageFormat::Xisf => xisf::write(path, image),
    }
}
