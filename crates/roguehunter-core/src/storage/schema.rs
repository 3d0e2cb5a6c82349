//! DDL for the embedded store. Bumping [`CURRENT_SCHEMA_VERSION`] is the
//! only supported way to change this schema — there are no migrations;
//! a mismatched version means the whole store is dropped and recreated.

pub const CURRENT_SCHEMA_VERSION: i64 = 1;

pub const DDL: &str = r#"
CREATE TABLE schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE daemon_state (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE process_events (
    id               INTEGER PRIMARY KEY,
    pid              INTEGER NOT NULL,
    command          TEXT NOT NULL,
    boot_time        REAL NOT NULL,
    entry_time       REAL NOT NULL,
    exit_time        REAL,
    entry_band       TEXT NOT NULL,
    peak_band        TEXT NOT NULL,
    peak_score       INTEGER NOT NULL,
    peak_snapshot_id INTEGER
);
CREATE INDEX idx_process_events_open ON process_events(pid) WHERE exit_time IS NULL;
CREATE INDEX idx_process_events_exit_time ON process_events(exit_time);

CREATE TABLE process_snapshots (
    id             INTEGER PRIMARY KEY,
    event_id       INTEGER NOT NULL REFERENCES process_events(id),
    snapshot_type  TEXT NOT NULL,
    captured_at    REAL NOT NULL,
    score          INTEGER NOT NULL,
    band           TEXT NOT NULL,
    dominant_resource TEXT NOT NULL,
    disproportionality REAL NOT NULL,
    score_json     TEXT NOT NULL
);
CREATE INDEX idx_process_snapshots_event ON process_snapshots(event_id);

CREATE TABLE forensic_captures (
    id               INTEGER PRIMARY KEY,
    event_id         INTEGER NOT NULL REFERENCES process_events(id),
    captured_at      REAL NOT NULL,
    trigger          TEXT NOT NULL,
    tailspin_status  TEXT NOT NULL,
    logs_status      TEXT NOT NULL,
    buffer_context_id INTEGER
);
CREATE INDEX idx_forensic_captures_event ON forensic_captures(event_id);

CREATE TABLE spindump_processes (
    id            INTEGER PRIMARY KEY,
    capture_id    INTEGER NOT NULL REFERENCES forensic_captures(id),
    pid           INTEGER NOT NULL,
    name          TEXT NOT NULL,
    path          TEXT,
    parent_pid    INTEGER,
    parent_name   TEXT,
    footprint_mb  REAL,
    cpu_time_sec  REAL,
    thread_count  INTEGER
);
CREATE INDEX idx_spindump_processes_capture ON spindump_processes(capture_id);

CREATE TABLE spindump_threads (
    id           INTEGER PRIMARY KEY,
    process_id   INTEGER NOT NULL REFERENCES spindump_processes(id),
    thread_id    TEXT NOT NULL,
    thread_name  TEXT,
    sample_count INTEGER,
    priority     INTEGER,
    cpu_time_sec REAL,
    state        TEXT,
    blocked_on   TEXT
);
CREATE INDEX idx_spindump_threads_process ON spindump_threads(process_id);

CREATE TABLE log_entries (
    id            INTEGER PRIMARY KEY,
    capture_id    INTEGER NOT NULL REFERENCES forensic_captures(id),
    timestamp     TEXT NOT NULL,
    mach_timestamp INTEGER,
    subsystem     TEXT NOT NULL,
    category      TEXT NOT NULL,
    process_name  TEXT NOT NULL,
    process_id    INTEGER NOT NULL,
    message_type  TEXT NOT NULL,
    event_message TEXT NOT NULL
);
CREATE INDEX idx_log_entries_capture ON log_entries(capture_id);

CREATE TABLE buffer_context (
    id            INTEGER PRIMARY KEY,
    capture_id    INTEGER NOT NULL REFERENCES forensic_captures(id),
    sample_count  INTEGER NOT NULL,
    peak_score    INTEGER NOT NULL,
    culprits      TEXT NOT NULL
);
"#;

pub const TABLES: &[&str] = &[
    "buffer_context",
    "log_entries",
    "spindump_threads",
    "spindump_processes",
    "forensic_captures",
    "process_snapshots",
    "process_events",
    "daemon_state",
    "schema_meta",
];
