//! Platform bindings: enumerate PIDs, read raw per-process counters, and
//! read the handful of system-wide inputs (boot time, core count,
//! timebase) the collector needs. Mirrors the shape of a `FileSystem`
//! trait that can be swapped for a mock in tests.

mod clock;
#[cfg(target_os = "macos")]
mod mac;
mod mock;

pub use clock::{Clock, MockClock, RealClock};
#[cfg(target_os = "macos")]
pub use mac::MacPlatform;
pub use mock::MockPlatform;

use crate::model::ProcessState;

/// Raw, semantically-named per-process counters for one PID, read fresh
/// each tick. Field names follow spec.md §6.1 exactly; no OS-specific
/// accessor names leak past this boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRawSample {
    pub pid: u32,
    pub command: String,
    pub state: ProcessState,
    pub priority: i32,
    pub thread_count: i32,

    pub user_time: u64,
    pub system_time: u64,

    pub resident_footprint: i64,
    pub lifetime_peak_footprint: i64,
    pub pageins: i64,
    pub faults: i64,

    pub diskio_read: i64,
    pub diskio_written: i64,

    pub instructions: i64,
    pub cycles: i64,

    pub energy: i64,
    pub interrupt_wakeups: i64,
    pub package_idle_wakeups: i64,

    pub runnable_time: i64,
    pub cpu_time_qos_user_interactive: i64,

    pub context_switches: i64,
    pub mach_syscalls: i64,
    pub unix_syscalls: i64,

    pub mach_messages_sent: i64,
    pub mach_messages_received: i64,
}

impl ProcessRawSample {
    pub fn wakeups(&self) -> i64 {
        self.interrupt_wakeups + self.package_idle_wakeups
    }

    pub fn syscalls(&self) -> i64 {
        self.mach_syscalls + self.unix_syscalls
    }
}

/// System-wide inputs available without per-process attribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemRawInfo {
    pub boot_time: f64,
    pub core_count: u32,
    pub timebase_numer: u32,
    pub timebase_denom: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("failed to enumerate PIDs: {0}")]
    Enumeration(String),
    #[error("process {0} is gone")]
    ProcessGone(u32),
    #[error("failed to read system info: {0}")]
    SystemInfo(String),
}

/// The seam between the collector and the host OS. `MacPlatform`
/// implements it for real on macOS; `MockPlatform` implements it
/// everywhere for tests.
pub trait PlatformApi {
    fn enumerate_pids(&mut self) -> Result<Vec<u32>, PlatformError>;
    fn read_process(&mut self, pid: u32) -> Result<ProcessRawSample, PlatformError>;
    fn system_info(&mut self) -> Result<SystemRawInfo, PlatformError>;
}

/// Converts a CPU-time delta expressed in platform timebase units into
/// seconds. Apple Silicon's timebase is not nanoseconds; the conversion
/// must go through numerator/denominator explicitly.
pub fn timebase_to_seconds(ticks: u64, numer: u32, denom: u32) -> f64 {
    if denom == 0 {
        return 0.0;
    }
    (ticks as f64 * numer as f64 / denom as f64) / 1_000_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timebase_conversion_identity_at_1_1() {
        // 1e9 ticks at numer=denom=1 is 1e9 ns == 1 second.
        assert_eq!(timebase_to_seconds(1_000_000_000, 1, 1), 1.0);
    }

    #[test]
    fn timebase_conversion_scales() {
        // Apple Silicon timebase is commonly 125/3 (not 1:1).
        let seconds = timebase_to_seconds(24_000_000, 125, 3);
        assert!((seconds - 1.0).abs() < 1e-9);
    }

    #[test]
    fn timebase_conversion_zero_denom_is_zero() {
        assert_eq!(timebase_to_seconds(1000, 1, 0), 0.0);
    }

    #[test]
    fn wakeups_sums_both_kinds() {
        let mut s = ProcessRawSample {
            pid: 1,
            command: "x".into(),
            state: ProcessState::Running,
            priority: 0,
            thread_count: 1,
            user_time: 0,
            system_time: 0,
            resident_footprint: 0,
            lifetime_peak_footprint: 0,
            pageins: 0,
            faults: 0,
            diskio_read: 0,
            diskio_written: 0,
            instructions: 0,
            cycles: 0,
            energy: 0,
            interrupt_wakeups: 3,
            package_idle_wakeups: 4,
            runnable_time: 0,
            cpu_time_qos_user_interactive: 0,
            context_switches: 0,
            mach_syscalls: 1,
            unix_syscalls: 2,
            mach_messages_sent: 0,
            mach_messages_received: 0,
        };
        assert_eq!(s.wakeups(), 7);
        assert_eq!(s.syscalls(), 3);
        s.interrupt_wakeups = 0;
        assert_eq!(s.wakeups(), 4);
    }
}
