use std::path::Path;

use ndarray::Array3;

use crate::error::{FlatError, Result};

/// A single preserved header keyword.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keyword {
    pub name: String,
    pub value: String,
}

impl Keyword {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered keyword collection. Order and duplicates are preserved so a
/// written file replays its source header; lookups take the first match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeywordList {
    entries: Vec<Keyword>,
}

impl KeywordList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push(Keyword::new(name, value));
    }

    /// First value recorded under `name` (ASCII case-insensitive), if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|k| k.name.eq_ignore_ascii_case(name))
            .map(|k| k.value.as_str())
    }

    /// Drop every entry named `name` and append the replacement.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .retain(|k| !k.name.eq_ignore_ascii_case(name));
        self.entries.push(Keyword::new(name, value));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keyword> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of this list without the structural keywords a writer owns.
    pub fn without_structural(&self) -> KeywordList {
        KeywordList {
            entries: self
                .entries
                .iter()
                .filter(|k| !is_structural(&k.name))
                .cloned()
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a KeywordList {
    type Item = &'a Keyword;
    type IntoIter = std::slice::Iter<'a, Keyword>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<Keyword> for KeywordList {
    fn from_iter<T: IntoIterator<Item = Keyword>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Keywords owned by the codecs; never replayed from an input header.
pub fn is_structural(name: &str) -> bool {
    matches!(
        name.to_ascii_uppercase().as_str(),
        "SIMPLE" | "BITPIX" | "NAXIS" | "NAXIS1" | "NAXIS2" | "NAXIS3" | "EXTEND" | "BSCALE"
            | "BZERO" | "END"
    )
}

/// An in-memory pixel plane with its preserved keywords.
///
/// Pixel storage is `(channels, height, width)` in standard layout, so the
/// flat slice is planar row-major and maps one-to-one onto both the FITS
/// and the XISF attachment layouts.
#[derive(Clone, Debug)]
pub struct ImageData {
    pub data: Array3<f64>,
    pub keywords: KeywordList,
}

impl ImageData {
    pub fn new(data: Array3<f64>) -> Self {
        Self {
            data,
            keywords: KeywordList::new(),
        }
    }

    /// Build from a planar row-major buffer; length must equal `c * h * w`.
    pub fn from_flat(
        path: &Path,
        width: usize,
        height: usize,
        channels: usize,
        buf: Vec<f64>,
    ) -> Result<Self> {
        let data = Array3::from_shape_vec((channels, height, width), buf).map_err(|_| {
            FlatError::BadGeometry {
                path: path.to_path_buf(),
                expected: format!("{channels}x{height}x{width} samples"),
                actual: "buffer of different length".into(),
            }
        })?;
        Ok(Self::new(data))
    }

    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    pub fn channels(&self) -> usize {
        self.data.dim().0
    }

    pub fn sample_count(&self) -> usize {
        self.data.len()
    }

    /// Planar row-major view of all samples.
    pub fn samples(&self) -> &[f64] {
        self.data
            .as_slice()
            .expect("pixel array is contiguous standard layout")
    }

    pub fn samples_mut(&mut self) -> &mut [f64] {
        self.data
            .as_slice_mut()
            .expect("pixel array is contiguous standard layout")
    }

    /// True when `other` covers the same pixel grid.
    pub fn same_geometry(&self, other: &ImageData) -> bool {
        self.data.dim() == other.data.dim()
    }
}
