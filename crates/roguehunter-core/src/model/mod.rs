//! Data model types shared by every component: semantic value wrappers,
//! the per-process sample record, the per-tick batch, and the persisted
//! event/snapshot/forensic-capture shapes.

mod event;
mod metric;
mod process_score;
mod sample_batch;

pub use event::{
    BufferContext, Event, ForensicCapture, LogEntry, ProcessSnapshot, SnapshotType,
    SpindumpProcess, SpindumpThread, StepStatus,
};
pub use metric::{severity_low_high, Band, DominantResource, MetricValue, MetricValueStr, ProcessState};
pub use process_score::ProcessScore;
pub use sample_batch::SampleBatch;
