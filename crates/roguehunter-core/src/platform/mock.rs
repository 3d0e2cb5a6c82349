use std::collections::HashMap;

use crate::model::ProcessState;

use super::{PlatformApi, PlatformError, ProcessRawSample, SystemRawInfo};

/// A scripted platform for tests. Holds one `ProcessRawSample` list per
/// tick; each call to `enumerate_pids`/`read_process` advances through
/// the script the same way `MockClock` advances through its timestamps.
#[derive(Debug, Clone)]
pub struct MockPlatform {
    ticks: Vec<Vec<ProcessRawSample>>,
    tick_index: usize,
    system_info: SystemRawInfo,
    fail_enumeration: bool,
    missing_pids: Vec<u32>,
}

impl MockPlatform {
    pub fn new(system_info: SystemRawInfo) -> Self {
        Self {
            ticks: Vec::new(),
            tick_index: 0,
            system_info,
            fail_enumeration: false,
            missing_pids: Vec::new(),
        }
    }

    pub fn default_system_info() -> SystemRawInfo {
        SystemRawInfo {
            boot_time: 1_700_000_000.0,
            core_count: 8,
            timebase_numer: 1,
            timebase_denom: 1,
        }
    }

    /// A single PID whose cumulative counters never change, across
    /// `count` ticks. Used by the "minimal tick" scenario.
    pub fn constant_single_process(count: usize) -> Self {
        let sample = ProcessRawSample {
            pid: 100,
            command: "steady".into(),
            state: ProcessState::Running,
            priority: 0,
            thread_count: 1,
            user_time: 0,
            system_time: 0,
            resident_footprint: 1024,
            lifetime_peak_footprint: 1024,
            pageins: 0,
            faults: 0,
            diskio_read: 0,
            diskio_written: 0,
            instructions: 0,
            cycles: 0,
            energy: 0,
            interrupt_wakeups: 0,
            package_idle_wakeups: 0,
            runnable_time: 0,
            cpu_time_qos_user_interactive: 0,
            context_switches: 0,
            mach_syscalls: 0,
            unix_syscalls: 0,
            mach_messages_sent: 0,
            mach_messages_received: 0,
        };
        let mut m = Self::new(Self::default_system_info());
        m.ticks = vec![vec![sample]; count];
        m
    }

    /// One PID with `diskio_read` climbing by a fixed step every tick,
    /// used by the rate-calculation scenario.
    pub fn climbing_diskio(values: Vec<i64>) -> Self {
        let mut m = Self::new(Self::default_system_info());
        m.ticks = values
            .into_iter()
            .map(|v| {
                vec![ProcessRawSample {
                    pid: 200,
                    command: "writer".into(),
                    state: ProcessState::Running,
                    priority: 0,
                    thread_count: 1,
                    user_time: 0,
                    system_time: 0,
                    resident_footprint: 0,
                    lifetime_peak_footprint: 0,
                    pageins: 0,
                    faults: 0,
                    diskio_read: v,
                    diskio_written: 0,
                    instructions: 0,
                    cycles: 0,
                    energy: 0,
                    interrupt_wakeups: 0,
                    package_idle_wakeups: 0,
                    runnable_time: 0,
                    cpu_time_qos_user_interactive: 0,
                    context_switches: 0,
                    mach_syscalls: 0,
                    unix_syscalls: 0,
                    mach_messages_sent: 0,
                    mach_messages_received: 0,
                }]
            })
            .collect();
        m
    }

    pub fn push_tick(&mut self, samples: Vec<ProcessRawSample>) -> &mut Self {
        self.ticks.push(samples);
        self
    }

    pub fn fail_enumeration_next(&mut self) -> &mut Self {
        self.fail_enumeration = true;
        self
    }

    /// Marks a PID as absent from `read_process` even though it is
    /// returned by `enumerate_pids` (simulates "died between enumerate
    /// and read").
    pub fn mark_gone(&mut self, pid: u32) -> &mut Self {
        self.missing_pids.push(pid);
        self
    }
}

impl PlatformApi for MockPlatform {
    fn enumerate_pids(&mut self) -> Result<Vec<u32>, PlatformError> {
        if self.fail_enumeration {
            self.fail_enumeration = false;
            return Err(PlatformError::Enumeration("mock failure".into()));
        }
        let tick = self.ticks.get(self.tick_index.min(self.ticks.len().saturating_sub(1)));
        Ok(tick.map(|t| t.iter().map(|p| p.pid).collect()).unwrap_or_default())
    }

    fn read_process(&mut self, pid: u32) -> Result<ProcessRawSample, PlatformError> {
        if self.missing_pids.contains(&pid) {
            return Err(PlatformError::ProcessGone(pid));
        }
        let tick = self
            .ticks
            .get(self.tick_index.min(self.ticks.len().saturating_sub(1)))
            .ok_or(PlatformError::ProcessGone(pid))?;
        tick.iter()
            .find(|p| p.pid == pid)
            .cloned()
            .ok_or(PlatformError::ProcessGone(pid))
    }

    fn system_info(&mut self) -> Result<SystemRawInfo, PlatformError> {
        // Advance the tick pointer here: this is the last call the
        // collector makes each sweep (after enumerate+read for every
        // PID), so it's the natural place to step the script forward.
        if self.tick_index + 1 < self.ticks.len() {
            self.tick_index += 1;
        }
        Ok(self.system_info)
    }
}

/// Builds a scripted multi-tick fixture from a map of
/// `pid -> per-tick sample` for tests that need several distinct PIDs
/// moving independently across ticks.
pub fn multi_pid_ticks(per_pid: HashMap<u32, Vec<ProcessRawSample>>, tick_count: usize) -> Vec<Vec<ProcessRawSample>> {
    (0..tick_count)
        .map(|i| {
            per_pid
                .values()
                .filter_map(|samples| samples.get(i).cloned())
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_single_process_repeats_same_sample() {
        let mut p = MockPlatform::constant_single_process(3);
        let pids = p.enumerate_pids().unwrap();
        assert_eq!(pids, vec![100]);
        let s1 = p.read_process(100).unwrap();
        assert_eq!(s1.resident_footprint, 1024);
        p.system_info().unwrap();
        let s2 = p.read_process(100).unwrap();
        assert_eq!(s2.resident_footprint, 1024);
    }

    #[test]
    fn mark_gone_fails_read_but_not_enumerate() {
        let mut p = MockPlatform::constant_single_process(1);
        p.mark_gone(100);
        assert_eq!(p.enumerate_pids().unwrap(), vec![100]);
        assert!(matches!(p.read_process(100), Err(PlatformError::ProcessGone(100))));
    }

    #[test]
    fn fail_enumeration_once() {
        let mut p = MockPlatform::constant_single_process(1);
        p.fail_enumeration_next();
        assert!(p.enumerate_pids().is_err());
        assert!(p.enumerate_pids().is_ok());
    }
}
