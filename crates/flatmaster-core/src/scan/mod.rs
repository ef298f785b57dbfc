pub mod darks;
pub mod scanner;

pub use darks::{backfill_temperatures, scan_dark_roots, DarkFrame};
pub use scanner::{scan_flat_roots, DirectoryJob, ExposureGroup, MatchCriteria};
