//! C3: per-PID lifecycle state machine. Tracks which processes are
//! currently "rogue" (at or above `tracking_threshold`), opens/checkpoints/
//! closes persisted events, and raises forensics triggers on entry into
//! the configured forensics band.

use std::collections::HashMap;

use crate::model::{Band, Event, ProcessScore, SnapshotType};

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// The storage-facing contract the tracker needs. A real implementation
/// wraps `StorageManager`; tests use an in-memory fake so tracker
/// lifecycle logic is verifiable without a database.
pub trait EventStore {
    fn open_event(&mut self, score: &ProcessScore, boot_time: f64, band: Band) -> Result<i64, TrackerError>;
    fn insert_snapshot(&mut self, event_id: i64, kind: SnapshotType, score: &ProcessScore) -> Result<i64, TrackerError>;
    fn update_peak(&mut self, event_id: i64, peak_score: i32, peak_band: Band, peak_snapshot_id: i64) -> Result<(), TrackerError>;
    fn close_event(&mut self, event_id: i64, exit_time: f64) -> Result<(), TrackerError>;
    fn force_close_no_snapshot(&mut self, event_id: i64, exit_time: f64) -> Result<(), TrackerError>;
    fn fetch_open_events(&mut self, boot_time: f64) -> Result<Vec<Event>, TrackerError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointIntervals {
    pub medium_samples: u32,
    pub elevated_samples: u32,
}

impl Default for CheckpointIntervals {
    fn default() -> Self {
        Self {
            medium_samples: 60,
            elevated_samples: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub tracking_threshold: i32,
    pub forensics_band: Band,
    pub checkpoint_intervals: CheckpointIntervals,
    pub exit_stability_samples: u32,
    pub event_cooldown_seconds: f64,
    pub sample_interval: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tracking_threshold: 30,
            forensics_band: Band::Critical,
            checkpoint_intervals: CheckpointIntervals::default(),
            exit_stability_samples: 15,
            event_cooldown_seconds: 60.0,
            sample_interval: 1.0 / 3.0,
        }
    }
}

#[derive(Debug, Clone)]
struct TrackedEvent {
    event_id: i64,
    pid: u32,
    command: String,
    peak_score: i32,
    peak_band: Band,
    peak_snapshot_id: i64,
    last_checkpoint_at: f64,
    below_threshold_samples: u32,
    last_seen_at: f64,
}

/// Raised when a rogue's sample crosses into the configured forensics
/// band, to be forwarded to C4.
#[derive(Debug, Clone, PartialEq)]
pub struct ForensicsTrigger {
    pub event_id: i64,
    pub pid: u32,
    pub band: Band,
    pub score: i32,
}

pub struct ProcessTracker {
    config: TrackerConfig,
    boot_time: f64,
    open: HashMap<u32, TrackedEvent>,
    cooldown_until: HashMap<u32, f64>,
}

impl ProcessTracker {
    pub fn new(config: TrackerConfig, boot_time: f64) -> Self {
        Self {
            config,
            boot_time,
            open: HashMap::new(),
            cooldown_until: HashMap::new(),
        }
    }

    /// Restores tracker state from storage at startup. Open events whose
    /// boot_time matches the current boot are kept open (without
    /// rehydrating checkpoint counters — the next `update` will re-derive
    /// them from the live sample stream); events from a prior boot are
    /// force-closed with no exit snapshot.
    pub fn restore(&mut self, store: &mut dyn EventStore) -> Result<(), TrackerError> {
        for event in store.fetch_open_events(self.boot_time)? {
            if (event.boot_time - self.boot_time).abs() < f64::EPSILON {
                self.open.insert(
                    event.pid,
                    TrackedEvent {
                        event_id: event.id,
                        pid: event.pid,
                        command: event.command,
                        peak_score: event.peak_score,
                        peak_band: event.peak_band,
                        peak_snapshot_id: event.peak_snapshot_id.unwrap_or(event.id),
                        last_checkpoint_at: event.entry_time,
                        below_threshold_samples: 0,
                        last_seen_at: event.entry_time,
                    },
                );
            } else {
                store.force_close_no_snapshot(event.id, self.boot_time)?;
            }
        }
        Ok(())
    }

    fn checkpoint_interval_for(&self, band: Band) -> f64 {
        match band {
            Band::Medium => self.config.checkpoint_intervals.medium_samples as f64 * self.config.sample_interval,
            Band::Elevated => self.config.checkpoint_intervals.elevated_samples as f64 * self.config.sample_interval,
            Band::High | Band::Critical => 0.0,
            Band::Low => f64::INFINITY,
        }
    }

    fn band_of_str(s: &str) -> Band {
        match s {
            "low" => Band::Low,
            "medium" => Band::Medium,
            "elevated" => Band::Elevated,
            "high" => Band::High,
            _ => Band::Critical,
        }
    }

    /// Runs one tick of the state machine. Returns forensics triggers
    /// raised by entries/updates that cross into the configured band.
    pub fn update(
        &mut self,
        rogues: &[ProcessScore],
        now: f64,
        store: &mut dyn EventStore,
    ) -> Result<Vec<ForensicsTrigger>, TrackerError> {
        let mut triggers = Vec::new();
        let seen: HashMap<u32, &ProcessScore> = rogues.iter().map(|p| (p.pid, p)).collect();

        let disappeared: Vec<u32> = self
            .open
            .iter()
            .filter(|(pid, ev)| !seen.contains_key(*pid) && now - ev.last_seen_at > 2.0 * self.config.sample_interval)
            .map(|(pid, _)| *pid)
            .collect();
        for pid in disappeared {
            if let Some(ev) = self.open.remove(&pid) {
                store.force_close_no_snapshot(ev.event_id, now)?;
                self.cooldown_until.insert(pid, now + self.config.event_cooldown_seconds);
            }
        }

        for (pid, score) in seen {
            let band = Self::band_of_str(&score.band.current);
            let in_cooldown = self.cooldown_until.get(&pid).is_some_and(|&until| now < until);

            if !self.open.contains_key(&pid) {
                if score.score >= self.config.tracking_threshold && !in_cooldown {
                    let event_id = store.open_event(score, self.boot_time, band)?;
                    let snapshot_id = store.insert_snapshot(event_id, SnapshotType::Entry, score)?;
                    self.open.insert(
                        pid,
                        TrackedEvent {
                            event_id,
                            pid,
                            command: score.command.clone(),
                            peak_score: score.score,
                            peak_band: band,
                            peak_snapshot_id: snapshot_id,
                            last_checkpoint_at: now,
                            below_threshold_samples: 0,
                            last_seen_at: now,
                        },
                    );
                    if band >= self.config.forensics_band {
                        triggers.push(ForensicsTrigger { event_id, pid, band, score: score.score });
                    }
                }
                continue;
            }

            let ev = self.open.get_mut(&pid).expect("checked contains_key above");
            ev.last_seen_at = now;
            let entered_forensics_band = band >= self.config.forensics_band;

            if score.score > ev.peak_score {
                ev.peak_score = score.score;
                ev.peak_band = band;
                let snapshot_id = store.insert_snapshot(ev.event_id, SnapshotType::Checkpoint, score)?;
                ev.peak_snapshot_id = snapshot_id;
                store.update_peak(ev.event_id, ev.peak_score, ev.peak_band, snapshot_id)?;
            }

            if score.score >= self.config.tracking_threshold {
                ev.below_threshold_samples = 0;
                if now - ev.last_checkpoint_at >= self.checkpoint_interval_for(band) {
                    store.insert_snapshot(ev.event_id, SnapshotType::Checkpoint, score)?;
                    ev.last_checkpoint_at = now;
                }
                if entered_forensics_band {
                    triggers.push(ForensicsTrigger { event_id: ev.event_id, pid, band, score: score.score });
                }
            } else {
                ev.below_threshold_samples += 1;
                if ev.below_threshold_samples >= self.config.exit_stability_samples {
                    let event_id = ev.event_id;
                    store.insert_snapshot(event_id, SnapshotType::Exit, score)?;
                    store.close_event(event_id, score.captured_at)?;
                    self.open.remove(&pid);
                    self.cooldown_until.insert(pid, now + self.config.event_cooldown_seconds);
                }
            }
        }

        Ok(triggers)
    }

    pub fn is_tracked(&self, pid: u32) -> bool {
        self.open.contains_key(&pid)
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DominantResource, MetricValue, MetricValueStr};

    #[derive(Default)]
    struct FakeStore {
        next_id: i64,
        events: HashMap<i64, Event>,
        snapshots: Vec<(i64, SnapshotType, i32)>,
    }

    impl EventStore for FakeStore {
        fn open_event(&mut self, score: &ProcessScore, boot_time: f64, band: Band) -> Result<i64, TrackerError> {
            self.next_id += 1;
            let id = self.next_id;
            self.events.insert(
                id,
                Event {
                    id,
                    pid: score.pid,
                    command: score.command.clone(),
                    boot_time,
                    entry_time: score.captured_at,
                    exit_time: None,
                    entry_band: band,
                    peak_band: band,
                    peak_score: score.score,
                    peak_snapshot_id: None,
                },
            );
            Ok(id)
        }

        fn insert_snapshot(&mut self, event_id: i64, kind: SnapshotType, score: &ProcessScore) -> Result<i64, TrackerError> {
            self.next_id += 1;
            self.snapshots.push((event_id, kind, score.score));
            Ok(self.next_id)
        }

        fn update_peak(&mut self, event_id: i64, peak_score: i32, peak_band: Band, peak_snapshot_id: i64) -> Result<(), TrackerError> {
            if let Some(e) = self.events.get_mut(&event_id) {
                e.peak_score = peak_score;
                e.peak_band = peak_band;
                e.peak_snapshot_id = Some(peak_snapshot_id);
            }
            Ok(())
        }

        fn close_event(&mut self, event_id: i64, exit_time: f64) -> Result<(), TrackerError> {
            if let Some(e) = self.events.get_mut(&event_id) {
                e.exit_time = Some(exit_time);
            }
            Ok(())
        }

        fn force_close_no_snapshot(&mut self, event_id: i64, exit_time: f64) -> Result<(), TrackerError> {
            self.close_event(event_id, exit_time)
        }

        fn fetch_open_events(&mut self, _boot_time: f64) -> Result<Vec<Event>, TrackerError> {
            Ok(self.events.values().filter(|e| e.exit_time.is_none()).cloned().collect())
        }
    }

    fn score(pid: u32, ts: f64, value: i32, band: &str) -> ProcessScore {
        ProcessScore {
            pid,
            command: "x".into(),
            captured_at: ts,
            cpu: MetricValue::new(0.0),
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
            state: MetricValueStr::new("running"),
            priority: MetricValue::new(0),
            score: value,
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

    #[test]
    fn tracking_lifecycle_scenario() {
        let config = TrackerConfig {
            tracking_threshold: 30,
            exit_stability_samples: 3,
            ..TrackerConfig::default()
        };
        let mut tracker = ProcessTracker::new(config, 0.0);
        let mut store = FakeStore::default();

        let scores = [10, 40, 55, 45, 20, 20, 20, 15];
        let bands = ["low", "elevated", "elevated", "elevated", "low", "low", "low", "low"];

        for (i, (&s, &b)) in scores.iter().zip(bands.iter()).enumerate() {
            let now = i as f64;
            let batch = vec![score(1, now, s, b)];
            tracker.update(&batch, now, &mut store).unwrap();
        }

        assert_eq!(store.events.len(), 1);
        let event = store.events.values().next().unwrap();
        assert_eq!(event.entry_band, Band::Elevated);
        assert_eq!(event.peak_score, 55);
        assert_eq!(event.exit_time, Some(6.0));
    }

    #[test]
    fn below_threshold_resets_on_recovery() {
        let config = TrackerConfig {
            tracking_threshold: 30,
            exit_stability_samples: 3,
            ..TrackerConfig::default()
        };
        let mut tracker = ProcessTracker::new(config, 0.0);
        let mut store = FakeStore::default();

        tracker.update(&[score(1, 0.0, 40, "elevated")], 0.0, &mut store).unwrap();
        tracker.update(&[score(1, 1.0, 10, "low")], 1.0, &mut store).unwrap();
        tracker.update(&[score(1, 2.0, 10, "low")], 2.0, &mut store).unwrap();
        // recovers before reaching exit_stability_samples == 3
        tracker.update(&[score(1, 3.0, 40, "elevated")], 3.0, &mut store).unwrap();
        assert!(tracker.is_tracked(1));
        let event = store.events.values().next().unwrap();
        assert!(event.exit_time.is_none());
    }

    #[test]
    fn forensics_trigger_raised_on_critical_entry() {
        let mut tracker = ProcessTracker::new(TrackerConfig::default(), 0.0);
        let mut store = FakeStore::default();
        let triggers = tracker
            .update(&[score(1, 0.0, 90, "critical")], 0.0, &mut store)
            .unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].pid, 1);
        assert_eq!(triggers[0].band, Band::Critical);
    }
}
