use serde::{Deserialize, Serialize};

use super::process_score::ProcessScore;

/// One full sweep's worth of scored processes.
///
/// `rogues` is ordered descending by `score`, ties broken by `pid`
/// ascending. `max_score` is the maximum score across *all* processes
/// read this tick, not just those retained in `rogues`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleBatch {
    pub timestamp: f64,
    pub elapsed_ms: i64,
    pub process_count: i64,
    pub max_score: i32,
    pub rogues: Vec<ProcessScore>,
}

impl SampleBatch {
    pub fn empty(timestamp: f64) -> Self {
        Self {
            timestamp,
            elapsed_ms: 0,
            process_count: 0,
            max_score: 0,
            rogues: Vec::new(),
        }
    }

    pub fn find_pid(&self, pid: u32) -> Option<&ProcessScore> {
        self.rogues.iter().find(|p| p.pid == pid)
    }
}
