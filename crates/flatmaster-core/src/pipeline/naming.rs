//! Master file naming: filter and date inference.

use std::path::Path;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;

use crate::meta::types::format_exposure;

static FILTER_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[_\-])(?:FILTER[_\-]?)?(Ha|SII|OIII|NII|[LRGBSHO]a?)(?:[_\-.]|$)")
        .expect("valid regex")
});
static DATE_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(20\d{2}-\d{2}-\d{2})\b").expect("valid regex"));
static DATE_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));

/// Infer the filter tag for a master from its input file names, falling
/// back to the relative directory name, else `UNKNOWN`.
pub fn infer_filter(paths: &[std::path::PathBuf], relative_dir: &Path) -> String {
    for path in paths {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if let Some(m) = FILTER_TOKEN_RE.captures(name).and_then(|c| c.get(1)) {
            return m.as_str().to_ascii_uppercase();
        }
    }
    let leaf = relative_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    if !leaf.is_empty() && !DATE_ONLY_RE.is_match(leaf) {
        return leaf.to_ascii_uppercase();
    }
    "UNKNOWN".to_string()
}

/// First `20YY-MM-DD` token in the directory path, else today's UTC date.
pub fn infer_date(directory: &Path) -> String {
    let text = directory.to_string_lossy();
    match DATE_TOKEN_RE.captures(&text).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().to_string(),
        None => Utc::now().format("%Y-%m-%d").to_string(),
    }
}

/// `MasterFlat_<DATE>_<FILTER>_Bin<BINNING>_<EXP>s.xisf`
pub fn master_file_name(date: &str, filter: &str, binning: Option<&str>, exposure: f64) -> String {
    format!(
        "MasterFlat_{date}_{filter}_Bin{}_{}s.xisf",
        binning.unwrap_or("1"),
        format_exposure(exposure),
    )
}
