//! C4: debounced capture of a kernel trace buffer and system log window,
//! decoded and parsed into structured records, on entry into the
//! forensics band.

pub mod parser;

use crate::model::{
    BufferContext, ForensicCapture, LogEntry, SpindumpProcess, SpindumpThread, StepStatus,
};
use crate::ringbuffer::RingBufferSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum ForensicsError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// The external-process boundary: real commands shell out via
/// `std::process::Command`; tests substitute scripted output so the
/// pipeline is verifiable without `tailspin`/`spindump`/`log show`.
pub trait CommandRunner {
    /// Runs the privileged kernel-trace dump, returning the decoded text
    /// on success.
    fn run_tailspin(&mut self, pid: u32) -> Result<String, String>;
    /// Runs the unprivileged system-log dump for the given window,
    /// returning newline-delimited JSON text on success.
    fn run_log_show(&mut self, window_secs: f64) -> Result<String, String>;
}

pub struct CaptureResult {
    pub capture: ForensicCapture,
    pub processes: Vec<SpindumpProcess>,
    pub threads: Vec<SpindumpThread>,
    pub log_entries: Vec<LogEntry>,
    pub buffer_context: BufferContext,
}

pub struct ForensicsOrchestrator<R: CommandRunner> {
    runner: R,
    debounce_secs: f64,
    last_capture_at: Option<f64>,
}

impl<R: CommandRunner> ForensicsOrchestrator<R> {
    pub fn new(runner: R, debounce_secs: f64) -> Self {
        Self {
            runner,
            debounce_secs,
            last_capture_at: None,
        }
    }

    /// Returns `true` if a capture would be dropped right now due to the
    /// debounce window.
    pub fn is_debounced(&self, now: f64) -> bool {
        self.last_capture_at
            .is_some_and(|last| now - last < self.debounce_secs)
    }

    /// Runs the full capture pipeline for `pid`/`event_id`. Returns
    /// `None` if the request is dropped by the debounce window.
    pub fn capture(
        &mut self,
        event_id: i64,
        pid: u32,
        trigger: &str,
        now: f64,
        window: &RingBufferSnapshot,
    ) -> Option<CaptureResult> {
        if self.is_debounced(now) {
            return None;
        }
        self.last_capture_at = Some(now);

        let (tailspin_status, processes, threads) = match self.runner.run_tailspin(pid) {
            Ok(text) => {
                let parsed = parser::parse_spindump_text(&text);
                (StepStatus::Ok, parsed.processes, parsed.threads)
            }
            Err(e) => {
                tracing::warn!(pid, error = %e, "tailspin capture failed");
                (StepStatus::Failed, Vec::new(), Vec::new())
            }
        };

        let (logs_status, log_entries) = match self.runner.run_log_show(self.debounce_secs) {
            Ok(text) => (StepStatus::Ok, parser::parse_log_ndjson(&text)),
            Err(e) => {
                tracing::warn!(pid, error = %e, "log show capture failed");
                (StepStatus::Failed, Vec::new())
            }
        };

        let buffer_context = summarize_window(window);

        Some(CaptureResult {
            capture: ForensicCapture {
                id: 0,
                event_id,
                captured_at: now,
                trigger: trigger.to_string(),
                tailspin_status,
                logs_status,
                buffer_context_id: None,
            },
            processes,
            threads,
            log_entries,
            buffer_context,
        })
    }
}

/// Summarizes a ring-buffer window into `{sample_count, peak_score,
/// culprits}`, where culprits are the processes appearing most
/// frequently in the top-N across the window.
fn summarize_window(window: &RingBufferSnapshot) -> BufferContext {
    use std::collections::HashMap;

    let batches = window.batches();
    let sample_count = batches.len() as i64;
    let peak_score = batches.iter().map(|b| b.max_score).max().unwrap_or(0);

    let mut counts: HashMap<u32, (String, i64)> = HashMap::new();
    for batch in batches {
        for rogue in &batch.rogues {
            let entry = counts.entry(rogue.pid).or_insert((rogue.command.clone(), 0));
            entry.1 += 1;
        }
    }
    let mut culprits: Vec<_> = counts.into_iter().collect();
    culprits.sort_by(|a, b| b.1 .1.cmp(&a.1 .1).then(a.0.cmp(&b.0)));
    culprits.truncate(10);

    let culprits_json = serde_json::to_string(
        &culprits
            .into_iter()
            .map(|(pid, (command, count))| {
                serde_json::json!({ "pid": pid, "command": command, "count": count })
            })
            .collect::<Vec<_>>(),
    )
    .unwrap_or_else(|_| "[]".to_string());

    BufferContext {
        id: 0,
        capture_id: 0,
        sample_count,
        peak_score,
        culprits_json,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SampleBatch;
    use crate::ringbuffer::RingBuffer;

    struct FailingRunner;
    impl CommandRunner for FailingRunner {
        fn run_tailspin(&mut self, _pid: u32) -> Result<String, String> {
            Err("permission denied".into())
        }
        fn run_log_show(&mut self, _window_secs: f64) -> Result<String, String> {
            Ok(String::new())
        }
    }

    struct SucceedingRunner;
    impl CommandRunner for SucceedingRunner {
        fn run_tailspin(&mut self, _pid: u32) -> Result<String, String> {
            Ok(String::new())
        }
        fn run_log_show(&mut self, _window_secs: f64) -> Result<String, String> {
            Ok(String::new())
        }
    }

    fn empty_window() -> RingBufferSnapshot {
        RingBuffer::new(5).freeze()
    }

    #[test]
    fn debounce_drops_second_request_within_window() {
        let mut orch = ForensicsOrchestrator::new(SucceedingRunner, 5.0);
        let first = orch.capture(1, 100, "entry", 0.0, &empty_window());
        assert!(first.is_some());
        let second = orch.capture(1, 100, "entry", 2.0, &empty_window());
        assert!(second.is_none());
        let third = orch.capture(1, 100, "entry", 6.0, &empty_window());
        assert!(third.is_some());
    }

    #[test]
    fn tailspin_failure_does_not_abort_log_processing() {
        let mut orch = ForensicsOrchestrator::new(FailingRunner, 5.0);
        let result = orch.capture(1, 100, "entry", 0.0, &empty_window()).unwrap();
        assert_eq!(result.capture.tailspin_status, StepStatus::Failed);
        assert_eq!(result.capture.logs_status, StepStatus::Ok);
        assert!(result.processes.is_empty());
    }

    #[test]
    fn summarize_window_counts_top_n_frequency() {
        let mut rb = RingBuffer::new(5);
        for i in 0..3 {
            rb.push(SampleBatch {
                timestamp: i as f64,
                elapsed_ms: 0,
                process_count: 1,
                max_score: 90,
                rogues: vec![],
            });
        }
        let ctx = summarize_window(&rb.freeze());
        assert_eq!(ctx.sample_count, 3);
        assert_eq!(ctx.peak_score, 90);
        assert_eq!(ctx.culprits_json, "[]");
    }
}
