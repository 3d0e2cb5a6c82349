//! The real macOS binding: [`libproc`] for per-process BSD/task/rusage
//! info, [`mach2`] for the kernel timebase, `libc::sysctlbyname` for the
//! boot time. No field here is guessed from memory alone without first
//! checking which struct each value lives in per Apple's `proc_info.h`
//! and `libproc`'s own type mapping of it.

use std::ffi::CString;
use std::mem;

use libproc::libproc::bsd_info::BSDInfo;
use libproc::libproc::pid_rusage::{pidrusage, RUsageInfoV4};
use libproc::libproc::proc_pid;
use libproc::libproc::task_info::TaskAllInfo;

use crate::model::ProcessState;

use super::{PlatformApi, PlatformError, ProcessRawSample, SystemRawInfo};

/// BSD process status values from `<sys/proc.h>`.
mod bsd_status {
    pub const SIDL: u32 = 1;
    pub const SRUN: u32 = 2;
    pub const SSLEEP: u32 = 3;
    pub const SSTOP: u32 = 4;
    pub const SZOMB: u32 = 5;
}

fn map_state(pbi_status: u32) -> ProcessState {
    match pbi_status {
        bsd_status::SIDL => ProcessState::Idle,
        bsd_status::SRUN => ProcessState::Running,
        bsd_status::SSLEEP => ProcessState::Sleeping,
        bsd_status::SSTOP => ProcessState::Stopped,
        bsd_status::SZOMB => ProcessState::Zombie,
        _ => ProcessState::Halted,
    }
}

#[derive(Debug, Default)]
pub struct MacPlatform {
    timebase_numer: u32,
    timebase_denom: u32,
}

impl MacPlatform {
    pub fn new() -> Result<Self, PlatformError> {
        let mut info: mach2::mach_time::mach_timebase_info_data_t = unsafe { mem::zeroed() };
        let ret = unsafe { mach2::mach_time::mach_timebase_info(&mut info) };
        if ret != mach2::kern_return::KERN_SUCCESS {
            return Err(PlatformError::SystemInfo(format!(
                "mach_timebase_info failed: {ret}"
            )));
        }
        Ok(Self {
            timebase_numer: info.numer,
            timebase_denom: info.denom,
        })
    }

    fn boot_time(&self) -> Result<f64, PlatformError> {
        let name = CString::new("kern.boottime").unwrap();
        let mut tv: libc::timeval = unsafe { mem::zeroed() };
        let mut size = mem::size_of::<libc::timeval>();
        let ret = unsafe {
            libc::sysctlbyname(
                name.as_ptr(),
                &mut tv as *mut _ as *mut libc::c_void,
                &mut size,
                std::ptr::null_mut(),
                0,
            )
        };
        if ret != 0 {
            return Err(PlatformError::SystemInfo(
                "sysctlbyname(kern.boottime) failed".into(),
            ));
        }
        Ok(tv.tv_sec as f64 + tv.tv_usec as f64 / 1_000_000.0)
    }
}

impl PlatformApi for MacPlatform {
    fn enumerate_pids(&mut self) -> Result<Vec<u32>, PlatformError> {
        proc_pid::listpids(proc_pid::ProcType::ProcAllPIDS)
            .map_err(PlatformError::Enumeration)
    }

    fn read_process(&mut self, pid: u32) -> Result<ProcessRawSample, PlatformError> {
        let task_info: TaskAllInfo = proc_pid::pidinfo(pid as i32, 0)
            .map_err(|_| PlatformError::ProcessGone(pid))?;
        let bsd_info: BSDInfo = proc_pid::pidinfo(pid as i32, 0)
            .map_err(|_| PlatformError::ProcessGone(pid))?;
        let rusage: RUsageInfoV4 = pidrusage(pid as i32).map_err(|_| PlatformError::ProcessGone(pid))?;

        let command = proc_pid::name(pid as i32).unwrap_or_else(|_| {
            std::str::from_utf8(&bsd_info.pbi_name.map(|c| c as u8))
                .unwrap_or("")
                .trim_end_matches('\0')
                .to_string()
        });

        Ok(ProcessRawSample {
            pid,
            command,
            state: map_state(bsd_info.pbi_status),
            priority: task_info.ptinfo.pti_priority as i32,
            thread_count: task_info.ptinfo.pti_threadnum as i32,

            user_time: rusage.ri_user_time,
            system_time: rusage.ri_system_time,

            resident_footprint: rusage.ri_phys_footprint as i64,
            lifetime_peak_footprint: rusage.ri_lifetime_max_phys_footprint as i64,
            pageins: rusage.ri_pageins as i64,
            faults: task_info.ptinfo.pti_faults as i64,

            diskio_read: rusage.ri_diskio_bytesread as i64,
            diskio_written: rusage.ri_diskio_byteswritten as i64,

            instructions: rusage.ri_instructions as i64,
            cycles: rusage.ri_cycles as i64,

            energy: rusage.ri_energy_nj as i64,
            interrupt_wakeups: rusage.ri_interrupt_wkups as i64,
            package_idle_wakeups: rusage.ri_pkg_idle_wkups as i64,

            runnable_time: rusage.ri_runnable_time as i64,
            cpu_time_qos_user_interactive: rusage.ri_cpu_time_qos_user_interactive as i64,

            context_switches: task_info.ptinfo.pti_csw as i64,
            mach_syscalls: task_info.ptinfo.pti_syscalls_mach as i64,
            unix_syscalls: task_info.ptinfo.pti_syscalls_unix as i64,

            mach_messages_sent: task_info.ptinfo.pti_messages_sent as i64,
            mach_messages_received: task_info.ptinfo.pti_messages_received as i64,
        })
    }

    fn system_info(&mut self) -> Result<SystemRawInfo, PlatformError> {
        let core_count = std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1);
        Ok(SystemRawInfo {
            boot_time: self.boot_time()?,
            core_count,
            timebase_numer: self.timebase_numer,
            timebase_denom: self.timebase_denom,
        })
    }
}
