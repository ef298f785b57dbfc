pub mod config;
pub mod integrate;
pub mod naming;
pub mod orchestrator;
pub mod report;
pub mod types;

pub use config::{DarkMatchingConfig, ProcessingConfig, RejectionConfig};
pub use orchestrator::run;
pub use report::RunSummary;
pub use types::{ChannelSink, NoOpSink, ProgressEvent, ProgressSink, ScanProgress, Stage};
