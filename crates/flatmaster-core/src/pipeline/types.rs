use std::path::PathBuf;
use std::sync::mpsc::Sender;

use serde::Serialize;

/// Pipeline stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Stage {
    ScanningDarks,
    ScanningFlats,
    MatchingDarks,
    LoadingDark,
    Calibrating,
    Integrating,
    Writing,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ScanningDarks => write!(f, "Scanning dark library"),
            Self::ScanningFlats => write!(f, "Scanning flat directories"),
            Self::MatchingDarks => write!(f, "Matching darks"),
            Self::LoadingDark => write!(f, "Loading dark"),
            Self::Calibrating => write!(f, "Calibrating flats"),
            Self::Integrating => write!(f, "Integrating"),
            Self::Writing => write!(f, "Writing master"),
        }
    }
}

/// Running scan counters, emitted after each visited directory.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ScanProgress {
    pub directories: usize,
    pub files: usize,
    pub fits_files: usize,
    pub fit_files: usize,
    pub xisf_files: usize,
    pub current: PathBuf,
}

/// Progress event stream payload for channel consumers.
#[derive(Clone, Debug, Serialize)]
pub enum ProgressEvent {
    Scan(ScanProgress),
    StageBegun { stage: Stage, total: Option<usize> },
    Advanced { done: usize },
    StageFinished,
}

/// Thread-safe progress reporting.
///
/// Events from parallel scans may interleave; implementors must be fast or
/// lossy and must not rely on event order reflecting filesystem order. All
/// methods default to no-ops.
pub trait ProgressSink: Send + Sync {
    fn scan_progress(&self, _progress: &ScanProgress) {}

    fn begin_stage(&self, _stage: Stage, _total: Option<usize>) {}

    fn advance(&self, _done: usize) {}

    fn finish_stage(&self) {}
}

/// No-op sink for callers without progress needs.
pub struct NoOpSink;

impl ProgressSink for NoOpSink {}

/// Forwards progress as `ProgressEvent` values over an mpsc channel.
/// Send failures (a dropped receiver) are ignored.
pub struct ChannelSink {
    tx: Sender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(tx: Sender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelSink {
    fn scan_progress(&self, progress: &ScanProgress) {
        let _ = self.tx.send(ProgressEvent::Scan(progress.clone()));
    }

    fn begin_stage(&self, stage: Stage, total: Option<usize>) {
        let _ = self.tx.send(ProgressEvent::StageBegun { stage, total });
    }

    fn advance(&self, done: usize) {
        let _ = self.tx.send(ProgressEvent::Advanced { done });
    }

    fn finish_stage(&self) {
        let _ = self.tx.send(ProgressEvent::StageFinished);
    }
}
