//! Embedded relational store backing C3's event history and C4's
//! forensic captures. One `rusqlite` connection in WAL mode; schema
//! changes are all-or-nothing (see [`schema::CURRENT_SCHEMA_VERSION`]),
//! there is no migration path.

mod schema;

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::forensics::CaptureResult;
use crate::model::{Band, Event, ProcessScore, SnapshotType, StepStatus};
use crate::tracker::{EventStore, TrackerError};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("score (de)serialization failed: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("store has no open event with id {0}")]
    MissingEvent(i64),
}

impl From<StorageError> for TrackerError {
    fn from(e: StorageError) -> Self {
        TrackerError::Storage(e.to_string())
    }
}

fn band_str(band: Band) -> &'static str {
    match band {
        Band::Low => "low",
        Band::Medium => "medium",
        Band::Elevated => "elevated",
        Band::High => "high",
        Band::Critical => "critical",
    }
}

fn band_from_str(s: &str) -> Band {
    match s {
        "low" => Band::Low,
        "medium" => Band::Medium,
        "elevated" => Band::Elevated,
        "high" => Band::High,
        _ => Band::Critical,
    }
}

pub struct StorageManager {
    conn: Connection,
}

impl StorageManager {
    /// Opens (creating if absent) the database at `path`, enables WAL
    /// mode, and resets the schema if its stamped version doesn't match
    /// [`schema::CURRENT_SCHEMA_VERSION`] — there is no in-place
    /// migration, a version bump means the store is dropped and rebuilt.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let mut mgr = Self { conn };
        mgr.ensure_schema()?;
        Ok(mgr)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let mut mgr = Self { conn };
        mgr.ensure_schema()?;
        Ok(mgr)
    }

    fn ensure_schema(&mut self) -> Result<(), StorageError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )?;
        let stamped: Option<i64> = self
            .conn
            .query_row(
                "SELECT value FROM schema_meta WHERE key = 'schema_version'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .and_then(|v| v.parse().ok());

        if stamped == Some(schema::CURRENT_SCHEMA_VERSION) {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        for table in schema::TABLES {
            tx.execute(&format!("DROP TABLE IF EXISTS {table}"), [])?;
        }
        tx.execute_batch(schema::DDL)?;
        tx.execute(
            "INSERT INTO schema_meta(key, value) VALUES ('schema_version', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![schema::CURRENT_SCHEMA_VERSION.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn set_boot_time(&self, boot_time: f64) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO daemon_state(key, value) VALUES ('boot_time', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![boot_time.to_string()],
        )?;
        Ok(())
    }

    pub fn boot_time(&self) -> Result<Option<f64>, StorageError> {
        let v: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM daemon_state WHERE key = 'boot_time'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(v.and_then(|s| s.parse().ok()))
    }

    /// Deletes closed events (and their snapshots/captures, cascading
    /// manually since sqlite foreign keys don't cascade by default) whose
    /// `exit_time` is older than `retention_days`.
    pub fn prune(&mut self, now: f64, retention_days: f64) -> Result<usize, StorageError> {
        let cutoff = now - retention_days * 86_400.0;
        let tx = self.conn.transaction()?;
        let stale_ids: Vec<i64> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM process_events WHERE exit_time IS NOT NULL AND exit_time < ?1",
            )?;
            let rows = stmt.query_map(params![cutoff], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };

        for event_id in &stale_ids {
            let capture_ids: Vec<i64> = {
                let mut stmt =
                    tx.prepare("SELECT id FROM forensic_captures WHERE event_id = ?1")?;
                let rows = stmt.query_map(params![event_id], |row| row.get(0))?;
                rows.collect::<Result<_, _>>()?
            };
            for capture_id in &capture_ids {
                tx.execute(
                    "DELETE FROM spindump_threads WHERE process_id IN (SELECT id FROM spindump_processes WHERE capture_id = ?1)",
                    params![capture_id],
                )?;
                tx.execute(
                    "DELETE FROM spindump_processes WHERE capture_id = ?1",
                    params![capture_id],
                )?;
                tx.execute(
                    "DELETE FROM log_entries WHERE capture_id = ?1",
                    params![capture_id],
                )?;
                tx.execute(
                    "DELETE FROM buffer_context WHERE capture_id = ?1",
                    params![capture_id],
                )?;
            }
            tx.execute(
                "DELETE FROM forensic_captures WHERE event_id = ?1",
                params![event_id],
            )?;
            tx.execute(
                "DELETE FROM process_snapshots WHERE event_id = ?1",
                params![event_id],
            )?;
            tx.execute("DELETE FROM process_events WHERE id = ?1", params![event_id])?;
        }
        tx.commit()?;
        Ok(stale_ids.len())
    }

    /// Persists a completed forensic capture and its child rows in one
    /// transaction, per the all-or-nothing commit in spec's forensics
    /// pipeline step.
    pub fn insert_forensic_capture(&mut self, result: &CaptureResult) -> Result<i64, StorageError> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO forensic_captures(event_id, captured_at, trigger, tailspin_status, logs_status, buffer_context_id)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
            params![
                result.capture.event_id,
                result.capture.captured_at,
                result.capture.trigger,
                result.capture.tailspin_status.as_str(),
                result.capture.logs_status.as_str(),
            ],
        )?;
        let capture_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO buffer_context(capture_id, sample_count, peak_score, culprits)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                capture_id,
                result.buffer_context.sample_count,
                result.buffer_context.peak_score,
                result.buffer_context.culprits_json
            ],
        )?;
        let buffer_context_id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE forensic_captures SET buffer_context_id = ?1 WHERE id = ?2",
            params![buffer_context_id, capture_id],
        )?;

        for process in &result.processes {
            tx.execute(
                "INSERT INTO spindump_processes(capture_id, pid, name, path, parent_pid, parent_name, footprint_mb, cpu_time_sec, thread_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    capture_id,
                    process.pid,
                    process.name,
                    process.path,
                    process.parent_pid,
                    process.parent_name,
                    process.footprint_mb,
                    process.cpu_time_sec,
                    process.thread_count
                ],
            )?;
        }

        // Threads reference processes by the parser's 0-based index into
        // `result.processes`, not a row id — resolve by re-walking with
        // the index this time so the insert above can stay index-free.
        let mut process_row_ids = Vec::with_capacity(result.processes.len());
        {
            let mut stmt = tx.prepare(
                "SELECT id FROM spindump_processes WHERE capture_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![capture_id], |row| row.get::<_, i64>(0))?;
            for row in rows {
                process_row_ids.push(row?);
            }
        }
        for thread in &result.threads {
            let Some(&process_row_id) = process_row_ids.get(thread.process_id as usize) else {
                continue;
            };
            tx.execute(
                "INSERT INTO spindump_threads(process_id, thread_id, thread_name, sample_count, priority, cpu_time_sec, state, blocked_on)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    process_row_id,
                    thread.thread_id,
                    thread.thread_name,
                    thread.sample_count,
                    thread.priority,
                    thread.cpu_time_sec,
                    thread.state,
                    thread.blocked_on
                ],
            )?;
        }

        for log in &result.log_entries {
            tx.execute(
                "INSERT INTO log_entries(capture_id, timestamp, mach_timestamp, subsystem, category, process_name, process_id, message_type, event_message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    capture_id,
                    log.timestamp,
                    log.mach_timestamp,
                    log.subsystem,
                    log.category,
                    log.process_name,
                    log.process_id,
                    log.message_type,
                    log.event_message
                ],
            )?;
        }

        tx.commit()?;
        Ok(capture_id)
    }
}

impl EventStore for StorageManager {
    fn open_event(&mut self, score: &ProcessScore, boot_time: f64, band: Band) -> Result<i64, TrackerError> {
        self.conn
            .execute(
                "INSERT INTO process_events(pid, command, boot_time, entry_time, exit_time, entry_band, peak_band, peak_score, peak_snapshot_id)
                 VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?5, ?6, NULL)",
                params![score.pid, score.command, boot_time, score.captured_at, band_str(band), score.score],
            )
            .map_err(StorageError::from)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn insert_snapshot(&mut self, event_id: i64, kind: SnapshotType, score: &ProcessScore) -> Result<i64, TrackerError> {
        let score_json = serde_json::to_string(score).map_err(StorageError::from)?;
        self.conn
            .execute(
                "INSERT INTO process_snapshots(event_id, snapshot_type, captured_at, score, band, dominant_resource, disproportionality, score_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    event_id,
                    kind.as_str(),
                    score.captured_at,
                    score.score,
                    score.band.current,
                    score.dominant_resource.to_string(),
                    score.disproportionality,
                    score_json
                ],
            )
            .map_err(StorageError::from)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_peak(&mut self, event_id: i64, peak_score: i32, peak_band: Band, peak_snapshot_id: i64) -> Result<(), TrackerError> {
        self.conn
            .execute(
                "UPDATE process_events SET peak_score = ?1, peak_band = ?2, peak_snapshot_id = ?3 WHERE id = ?4",
                params![peak_score, band_str(peak_band), peak_snapshot_id, event_id],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn close_event(&mut self, event_id: i64, exit_time: f64) -> Result<(), TrackerError> {
        self.conn
            .execute(
                "UPDATE process_events SET exit_time = ?1 WHERE id = ?2",
                params![exit_time, event_id],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn force_close_no_snapshot(&mut self, event_id: i64, exit_time: f64) -> Result<(), TrackerError> {
        self.close_event(event_id, exit_time)
    }

    fn fetch_open_events(&mut self, _boot_time: f64) -> Result<Vec<Event>, TrackerError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, pid, command, boot_time, entry_time, exit_time, entry_band, peak_band, peak_score, peak_snapshot_id
                 FROM process_events WHERE exit_time IS NULL",
            )
            .map_err(StorageError::from)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Event {
                    id: row.get(0)?,
                    pid: row.get(1)?,
                    command: row.get(2)?,
                    boot_time: row.get(3)?,
                    entry_time: row.get(4)?,
                    exit_time: row.get(5)?,
                    entry_band: band_from_str(&row.get::<_, String>(6)?),
                    peak_band: band_from_str(&row.get::<_, String>(7)?),
                    peak_score: row.get(8)?,
                    peak_snapshot_id: row.get(9)?,
                })
            })
            .map_err(StorageError::from)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::from(e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DominantResource, MetricValue, MetricValueStr};

    fn score(pid: u32, captured_at: f64, value: i32, band: &str) -> ProcessScore {
        ProcessScore {
            pid,
            command: "x".into(),
            captured_at,
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
    fn open_checkpoint_close_round_trip() {
        let mut store = StorageManager::open_in_memory().unwrap();
        let s = score(100, 0.0, 45, "elevated");
        let event_id = store.open_event(&s, 0.0, Band::Elevated).unwrap();
        let snap_id = store.insert_snapshot(event_id, SnapshotType::Entry, &s).unwrap();
        store.update_peak(event_id, 45, Band::Elevated, snap_id).unwrap();
        store.close_event(event_id, 10.0).unwrap();

        let open = store.fetch_open_events(0.0).unwrap();
        assert!(open.is_empty());
    }

    #[test]
    fn fetch_open_events_excludes_closed() {
        let mut store = StorageManager::open_in_memory().unwrap();
        let s1 = score(1, 0.0, 40, "elevated");
        let s2 = score(2, 0.0, 90, "critical");
        let e1 = store.open_event(&s1, 0.0, Band::Elevated).unwrap();
        let _e2 = store.open_event(&s2, 0.0, Band::Critical).unwrap();
        store.close_event(e1, 1.0).unwrap();

        let open = store.fetch_open_events(0.0).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].pid, 2);
    }

    #[test]
    fn schema_is_idempotent_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roguehunter.db");
        {
            let store = StorageManager::open(&path).unwrap();
            store.set_boot_time(123.0).unwrap();
        }
        let store = StorageManager::open(&path).unwrap();
        assert_eq!(store.boot_time().unwrap(), Some(123.0));
    }

    #[test]
    fn prune_deletes_events_older_than_retention() {
        let mut store = StorageManager::open_in_memory().unwrap();
        let s = score(1, 0.0, 40, "elevated");
        let event_id = store.open_event(&s, 0.0, Band::Elevated).unwrap();
        store.close_event(event_id, 1.0).unwrap();

        let pruned = store.prune(100.0 * 86_400.0, 30.0).unwrap();
        assert_eq!(pruned, 1);
        assert!(store.fetch_open_events(0.0).unwrap().is_empty());
    }
}
