use serde::{Deserialize, Serialize};

use super::metric::Band;
use super::process_score::ProcessScore;

/// One rogue episode of a given `(pid, boot_time)`. Exactly one row is
/// "open" per PID at any time (`exit_time.is_none()`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub pid: u32,
    pub command: String,
    pub boot_time: f64,
    pub entry_time: f64,
    pub exit_time: Option<f64>,
    pub entry_band: Band,
    pub peak_band: Band,
    pub peak_score: i32,
    pub peak_snapshot_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotType {
    Entry,
    Checkpoint,
    Exit,
}

impl SnapshotType {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotType::Entry => "entry",
            SnapshotType::Checkpoint => "checkpoint",
            SnapshotType::Exit => "exit",
        }
    }
}

/// One recorded moment of an [`Event`]: a full [`ProcessScore`] tied to an
/// event id and a snapshot kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub id: i64,
    pub event_id: i64,
    pub snapshot_type: SnapshotType,
    pub captured_at: f64,
    pub score: ProcessScore,
}

/// A bundled kernel-trace + log dump triggered when a process enters the
/// forensics band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForensicCapture {
    pub id: i64,
    pub event_id: i64,
    pub captured_at: f64,
    pub trigger: String,
    pub tailspin_status: StepStatus,
    pub logs_status: StepStatus,
    pub buffer_context_id: Option<i64>,
}

/// Outcome of one capture sub-step. `Failed` carries no payload by
/// design — failures are observable as an absence of the corresponding
/// child rows, per spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Failed,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Ok => "ok",
            StepStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpindumpProcess {
    pub id: i64,
    pub capture_id: i64,
    pub pid: u32,
    pub name: String,
    pub path: Option<String>,
    pub parent_pid: Option<u32>,
    pub parent_name: Option<String>,
    pub footprint_mb: Option<f64>,
    pub cpu_time_sec: Option<f64>,
    pub thread_count: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpindumpThread {
    pub id: i64,
    pub process_id: i64,
    pub thread_id: String,
    pub thread_name: Option<String>,
    pub sample_count: Option<i32>,
    pub priority: Option<i32>,
    pub cpu_time_sec: Option<f64>,
    pub state: Option<String>,
    pub blocked_on: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub capture_id: i64,
    pub timestamp: String,
    pub mach_timestamp: Option<i64>,
    pub subsystem: String,
    pub category: String,
    pub process_name: String,
    pub process_id: u32,
    pub message_type: String,
    pub event_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferContext {
    pub id: i64,
    pub capture_id: i64,
    pub sample_count: i64,
    pub peak_score: i32,
    /// JSON-encoded list of the most frequent top-N culprits across the
    /// window, e.g. `[{"pid":123,"command":"foo","count":12}, ...]`.
    pub culprits_json: String,
}
