//! Parses the decoded kernel-trace text and the newline-delimited JSON
//! log dump into structured rows. Pure functions: no I/O, so the
//! `tailspin`/`spindump`/`log show` text formats can be exercised with
//! literal strings in tests without the real binaries.

use crate::model::{LogEntry, SpindumpProcess, SpindumpThread};

pub struct ParsedSpindump {
    pub processes: Vec<SpindumpProcess>,
    pub threads: Vec<SpindumpThread>,
}

/// Parses a decoded spindump/tailspin text blob into process and thread
/// records. Input is a sequence of blocks starting with a `Process:`
/// line, each followed by zero or more indented thread lines. Unparsable
/// blocks/lines are skipped rather than aborting the whole parse — a
/// partial forensic record is better than none.
pub fn parse_spindump_text(text: &str) -> ParsedSpindump {
    let mut processes = Vec::new();
    let mut threads = Vec::new();
    let mut current_process_idx: Option<usize> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("Process:") {
            if let Some(proc) = parse_process_line(rest) {
                processes.push(proc);
                current_process_idx = Some(processes.len() - 1);
            } else {
                current_process_idx = None;
            }
        } else if trimmed.starts_with("Thread ") {
            if let Some(idx) = current_process_idx {
                if let Some(thread) = parse_thread_line(trimmed, idx as i64) {
                    threads.push(thread);
                }
            }
        }
    }

    ParsedSpindump { processes, threads }
}

fn field(rest: &str, key: &str) -> Option<String> {
    // Fields look like `key="value"` or `key=value`, space separated.
    let marker = format!("{key}=");
    let start = rest.find(&marker)? + marker.len();
    let tail = &rest[start..];
    if let Some(stripped) = tail.strip_prefix('"') {
        let end = stripped.find('"')?;
        Some(stripped[..end].to_string())
    } else {
        Some(tail.split_whitespace().next()?.to_string())
    }
}

fn parse_process_line(rest: &str) -> Option<SpindumpProcess> {
    // "Process: Safari [1234]  path=/Applications/Safari.app parent=123 parent_name=launchd footprint=512.3MB cpu_time=1.2s threads=8"
    let bracket_start = rest.find('[')?;
    let bracket_end = rest.find(']')?;
    let name = rest[..bracket_start].trim().to_string();
    let pid: u32 = rest[bracket_start + 1..bracket_end].trim().parse().ok()?;

    Some(SpindumpProcess {
        id: 0,
        capture_id: 0,
        pid,
        name,
        path: field(rest, "path"),
        parent_pid: field(rest, "parent").and_then(|s| s.parse().ok()),
        parent_name: field(rest, "parent_name"),
        footprint_mb: field(rest, "footprint")
            .map(|s| s.trim_end_matches("MB").to_string())
            .and_then(|s| s.parse().ok()),
        cpu_time_sec: field(rest, "cpu_time")
            .map(|s| s.trim_end_matches('s').to_string())
            .and_then(|s| s.parse().ok()),
        thread_count: field(rest, "threads").and_then(|s| s.parse().ok()),
    })
}

fn parse_thread_line(line: &str, process_id: i64) -> Option<SpindumpThread> {
    // "Thread 0x1a2b  name=com.apple.main-thread priority=31 cpu_time=0.5s state=running blocked_on=mutex samples=42"
    let rest = line.strip_prefix("Thread ")?;
    let thread_id = rest.split_whitespace().next()?.to_string();

    Some(SpindumpThread {
        id: 0,
        process_id,
        thread_id,
        thread_name: field(rest, "name"),
        sample_count: field(rest, "samples").and_then(|s| s.parse().ok()),
        priority: field(rest, "priority").and_then(|s| s.parse().ok()),
        cpu_time_sec: field(rest, "cpu_time")
            .map(|s| s.trim_end_matches('s').to_string())
            .and_then(|s| s.parse().ok()),
        state: field(rest, "state"),
        blocked_on: field(rest, "blocked_on"),
    })
}

/// Parses newline-delimited JSON from `log show --style ndjson`-shaped
/// output. One malformed line is skipped rather than aborting the parse.
pub fn parse_log_ndjson(text: &str) -> Vec<LogEntry> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<RawLogLine>(line).ok())
        .map(|raw| LogEntry {
            id: 0,
            capture_id: 0,
            timestamp: raw.timestamp,
            mach_timestamp: raw.mach_timestamp,
            subsystem: raw.subsystem.unwrap_or_default(),
            category: raw.category.unwrap_or_default(),
            process_name: raw.process_name.unwrap_or_default(),
            process_id: raw.process_id.unwrap_or(0),
            message_type: raw.message_type.unwrap_or_default(),
            event_message: raw.event_message.unwrap_or_default(),
        })
        .collect()
}

#[derive(serde::Deserialize)]
struct RawLogLine {
    timestamp: String,
    #[serde(rename = "machTimestamp")]
    mach_timestamp: Option<i64>,
    subsystem: Option<String>,
    category: Option<String>,
    #[serde(rename = "processImagePath")]
    process_name: Option<String>,
    #[serde(rename = "processID")]
    process_id: Option<u32>,
    #[serde(rename = "messageType")]
    message_type: Option<String>,
    #[serde(rename = "eventMessage")]
    event_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_process_and_thread_blocks() {
        let text = r#"
Process: Safari [1234]  path="/Applications/Safari.app" parent=1 parent_name=launchd footprint=512.3MB cpu_time=1.2s threads=2
  Thread 0x1a2b  name=main priority=31 cpu_time=0.5s state=running samples=42
  Thread 0x1a2c  name=worker priority=20 state=blocked blocked_on=mutex
Process: bad_block_no_brackets
"#;
        let parsed = parse_spindump_text(text);
        assert_eq!(parsed.processes.len(), 1);
        let p = &parsed.processes[0];
        assert_eq!(p.pid, 1234);
        assert_eq!(p.name, "Safari");
        assert_eq!(p.path.as_deref(), Some("/Applications/Safari.app"));
        assert_eq!(p.parent_pid, Some(1));
        assert_eq!(p.footprint_mb, Some(512.3));
        assert_eq!(p.thread_count, Some(2));

        assert_eq!(parsed.threads.len(), 2);
        assert_eq!(parsed.threads[0].thread_name.as_deref(), Some("main"));
        assert_eq!(parsed.threads[1].blocked_on.as_deref(), Some("mutex"));
    }

    #[test]
    fn skips_unparsable_process_blocks_without_aborting() {
        let text = "Process: no_brackets_here\nProcess: Good [42]\n";
        let parsed = parse_spindump_text(text);
        assert_eq!(parsed.processes.len(), 1);
        assert_eq!(parsed.processes[0].pid, 42);
    }

    #[test]
    fn parses_ndjson_log_lines_and_skips_malformed() {
        let text = "{\"timestamp\":\"2026-01-01\",\"subsystem\":\"com.apple.x\",\"processID\":99,\"eventMessage\":\"hello\"}\nnot json\n";
        let entries = parse_log_ndjson(text);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].process_id, 99);
        assert_eq!(entries[0].event_message, "hello");
    }
}
