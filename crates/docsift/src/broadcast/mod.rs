//! Real-time analysis progress streaming.

pub mod analysis_progress;

pub use analysis_progress::{AnalysisEvent, EventKind, JobTracker, ProgressBroadcaster};
