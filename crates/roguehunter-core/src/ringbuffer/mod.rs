//! C2: a fixed-capacity FIFO of [`SampleBatch`] values used both for
//! per-metric low/high enrichment and as forensics context.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::model::{MetricValueStr, ProcessScore, SampleBatch};

/// A cheap immutable view of the ring buffer's current contents, handed
/// to the tracker and the forensics orchestrator. Cloning an `Arc` is
/// O(1); the contents themselves are never mutated once frozen.
#[derive(Debug, Clone)]
pub struct RingBufferSnapshot(Arc<Vec<SampleBatch>>);

impl RingBufferSnapshot {
    pub fn batches(&self) -> &[SampleBatch] {
        &self.0
    }
}

pub struct RingBuffer {
    capacity: usize,
    batches: VecDeque<SampleBatch>,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "ring buffer capacity must be >= 1");
        Self {
            capacity,
            batches: VecDeque::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `batch`, evicting the oldest entry if full. The caller
    /// must push batches in strictly ascending `timestamp` order.
    pub fn push(&mut self, batch: SampleBatch) {
        if let Some(last) = self.batches.back() {
            debug_assert!(
                batch.timestamp > last.timestamp,
                "batches must be pushed in strictly ascending timestamp order"
            );
        }
        if self.batches.len() == self.capacity {
            self.batches.pop_front();
        }
        self.batches.push_back(batch);
    }

    /// Replaces the most recently pushed batch in place, used after
    /// enrichment writes low/high back into it.
    pub fn update_latest(&mut self, batch: SampleBatch) {
        if let Some(last) = self.batches.back_mut() {
            *last = batch;
        } else {
            self.batches.push_back(batch);
        }
    }

    pub fn freeze(&self) -> RingBufferSnapshot {
        RingBufferSnapshot(Arc::new(self.batches.iter().cloned().collect()))
    }

    /// For every numeric `MetricValue` field and the `state`/`band`
    /// `MetricValueStr` fields of every rogue in `current_batch`, walks
    /// the window (which already includes `current_batch` if it has been
    /// pushed) and sets `low`/`high` to the min/max observed for that
    /// PID. Idempotent: running this twice on the same batch is a no-op
    /// the second time, since the enriched values are already the window
    /// extremes.
    pub fn compute_low_high(&self, current_batch: &SampleBatch) -> SampleBatch {
        let mut enriched = current_batch.clone();
        for rogue in &mut enriched.rogues {
            let history: Vec<&ProcessScore> = self
                .batches
                .iter()
                .filter_map(|b| b.find_pid(rogue.pid))
                .collect();
            enrich_one(rogue, &history);
        }
        enriched
    }
}

fn enrich_one(rogue: &mut ProcessScore, history: &[&ProcessScore]) {
    macro_rules! enrich_numeric {
        ($field:ident) => {{
            let low = history
                .iter()
                .map(|p| p.$field.current)
                .fold(rogue.$field.current, |acc, v| if v < acc { v } else { acc });
            let high = history
                .iter()
                .map(|p| p.$field.current)
                .fold(rogue.$field.current, |acc, v| if v > acc { v } else { acc });
            rogue.$field.low = low;
            rogue.$field.high = high;
        }};
    }

    enrich_numeric!(cpu);
    enrich_numeric!(mem);
    enrich_numeric!(disk_io);
    enrich_numeric!(priority);

    enrich_str(&mut rogue.state, history.iter().map(|p| p.state.current.clone()));
    enrich_str(&mut rogue.band, history.iter().map(|p| p.band.current.clone()));
}

/// State/band ordering is severity-based, not lexical. Both fields are
/// stored as strings on the wire and in storage, so we parse back to the
/// ordered enum just for comparison and re-serialize the winners.
fn enrich_str(field: &mut MetricValueStr, values: impl Iterator<Item = String>) {
    use crate::model::{Band, ProcessState};

    fn state_rank(s: &str) -> Option<ProcessState> {
        Some(match s {
            "idle" => ProcessState::Idle,
            "sleeping" => ProcessState::Sleeping,
            "running" => ProcessState::Running,
            "stopped" => ProcessState::Stopped,
            "halted" => ProcessState::Halted,
            "zombie" => ProcessState::Zombie,
            "stuck" => ProcessState::Stuck,
            _ => return None,
        })
    }
    fn band_rank(s: &str) -> Option<Band> {
        Some(match s {
            "low" => Band::Low,
            "medium" => Band::Medium,
            "elevated" => Band::Elevated,
            "high" => Band::High,
            "critical" => Band::Critical,
            _ => return None,
        })
    }

    let mut low = field.current.clone();
    let mut high = field.current.clone();

    for v in values {
        if let (Some(rank_v), Some(rank_low)) = (state_rank(&v), state_rank(&low)) {
            if rank_v < rank_low {
                low = v.clone();
            }
        } else if let (Some(rank_v), Some(rank_low)) = (band_rank(&v), band_rank(&low)) {
            if rank_v < rank_low {
                low = v.clone();
            }
        }

        if let (Some(rank_v), Some(rank_high)) = (state_rank(&v), state_rank(&high)) {
            if rank_v > rank_high {
                high = v.clone();
            }
        } else if let (Some(rank_v), Some(rank_high)) = (band_rank(&v), band_rank(&high)) {
            if rank_v > rank_high {
                high = v;
            }
        }
    }

    field.low = low;
    field.high = high;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DominantResource, MetricValue, ProcessScore};

    fn score(pid: u32, ts: f64, cpu: f64, state: &str, band: &str) -> ProcessScore {
        ProcessScore {
            pid,
            command: "x".into(),
            captured_at: ts,
            cpu: MetricValue::new(cpu),
            mem: MetricValue::new(0),
            mem_peak: 0,
            pageins: 0,
            pageins_rate: 0.0,
            faults: 0,
            faults_rate: 0.0,
            disk_io: MetricValue::new(0),
            disk_io_rate: 0.0,
            csw: 0,
            csw_rate: 0.0,
            syscalls: 0,
            syscalls_rate: 0.0,
            threads: 1,
            mach_msgs: 0,
            mach_msgs_rate: 0.0,
            instructions: 0,
            cycles: 0,
            ipc: 0.0,
            energy: 0,
            energy_rate: 0.0,
            wakeups: 0,
            wakeups_rate: 0.0,
            runnable_time: 0,
            runnable_time_rate: 0.0,
            qos_interactive: 0,
            qos_interactive_rate: 0.0,
            state: MetricValueStr::new(state),
            priority: MetricValue::new(0),
            score: 0,
            band: MetricValueStr::new(band),
            cpu_share: 0.0,
            gpu_share: 0.0,
            mem_share: 0.0,
            disk_share: 0.0,
            wakeups_share: 0.0,
            disproportionality: 0.0,
            dominant_resource: DominantResource::None,
        }
    }

    fn batch(ts: f64, rogues: Vec<ProcessScore>) -> SampleBatch {
        SampleBatch {
            timestamp: ts,
            elapsed_ms: 0,
            process_count: rogues.len() as i64,
            max_score: 0,
            rogues,
        }
    }

    #[test]
    fn push_evicts_oldest_when_full() {
        let mut rb = RingBuffer::new(2);
        rb.push(batch(1.0, vec![]));
        rb.push(batch(2.0, vec![]));
        rb.push(batch(3.0, vec![]));
        assert_eq!(rb.len(), 2);
        assert_eq!(rb.freeze().batches()[0].timestamp, 2.0);
    }

    #[test]
    fn compute_low_high_tracks_extremes_across_window() {
        let mut rb = RingBuffer::new(10);
        rb.push(batch(1.0, vec![score(1, 1.0, 10.0, "running", "low")]));
        rb.push(batch(2.0, vec![score(1, 2.0, 90.0, "stuck", "critical")]));
        let current = batch(3.0, vec![score(1, 3.0, 50.0, "idle", "medium")]);
        rb.push(current.clone());

        let enriched = rb.compute_low_high(&current);
        let p = &enriched.rogues[0];
        assert_eq!(p.cpu.low, 10.0);
        assert_eq!(p.cpu.high, 90.0);
        assert_eq!(p.state.low, "idle");
        assert_eq!(p.state.high, "stuck");
        assert_eq!(p.band.low, "low");
        assert_eq!(p.band.high, "critical");
    }

    #[test]
    fn enrichment_is_idempotent() {
        let mut rb = RingBuffer::new(10);
        rb.push(batch(1.0, vec![score(1, 1.0, 10.0, "running", "low")]));
        let current = batch(2.0, vec![score(1, 2.0, 90.0, "stuck", "critical")]);
        rb.push(current.clone());

        let once = rb.compute_low_high(&current);
        rb.update_latest(once.clone());
        let twice = rb.compute_low_high(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn low_le_current_le_high_invariant() {
        let mut rb = RingBuffer::new(10);
        rb.push(batch(1.0, vec![score(1, 1.0, 5.0, "running", "low")]));
        let current = batch(2.0, vec![score(1, 2.0, 3.0, "running", "low")]);
        rb.push(current.clone());
        let enriched = rb.compute_low_high(&current);
        let p = &enriched.rogues[0];
        assert!(p.cpu.low <= p.cpu.current);
        assert!(p.cpu.current <= p.cpu.high);
    }
}
