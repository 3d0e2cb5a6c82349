use serde::{Deserialize, Serialize};

use super::metric::{DominantResource, MetricValue, MetricValueStr};

/// The canonical per-process sample record, one instance per `(pid, tick)`.
///
/// Field grouping mirrors the specification's table exactly so that the
/// storage schema's column groups can be read off this struct directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessScore {
    // Identity
    pub pid: u32,
    pub command: String,
    pub captured_at: f64,

    // CPU
    pub cpu: MetricValue<f64>,

    // Memory
    pub mem: MetricValue<i64>,
    pub mem_peak: i64,
    pub pageins: i64,
    pub pageins_rate: f64,
    pub faults: i64,
    pub faults_rate: f64,

    // Disk
    pub disk_io: MetricValue<i64>,
    pub disk_io_rate: f64,

    // Activity
    pub csw: i64,
    pub csw_rate: f64,
    pub syscalls: i64,
    pub syscalls_rate: f64,
    pub threads: i32,
    pub mach_msgs: i64,
    pub mach_msgs_rate: f64,

    // Efficiency
    pub instructions: i64,
    pub cycles: i64,
    pub ipc: f64,

    // Power
    pub energy: i64,
    pub energy_rate: f64,
    pub wakeups: i64,
    pub wakeups_rate: f64,

    // Contention
    pub runnable_time: i64,
    pub runnable_time_rate: f64,
    pub qos_interactive: i64,
    pub qos_interactive_rate: f64,

    // State
    pub state: MetricValueStr,
    pub priority: MetricValue<i32>,

    // Scoring (v18, disproportionate-share model)
    pub score: i32,
    /// Low/high enriched the same as `state` — §4.2 enrichment walks both
    /// under severity ordering, not just `state`.
    pub band: MetricValueStr,
    pub cpu_share: f64,
    pub gpu_share: f64,
    pub mem_share: f64,
    pub disk_share: f64,
    pub wakeups_share: f64,
    pub disproportionality: f64,
    pub dominant_resource: DominantResource,
}

impl ProcessScore {
    /// `ipc` is defined as 0 when the cycle counter is 0, never a division
    /// error.
    pub fn compute_ipc(instructions: i64, cycles: i64) -> f64 {
        if cycles == 0 {
            0.0
        } else {
            instructions as f64 / cycles as f64
        }
    }

    pub fn max_share(
        cpu_share: f64,
        gpu_share: f64,
        mem_share: f64,
        disk_share: f64,
        wakeups_share: f64,
    ) -> (f64, DominantResource) {
        let shares = [
            (cpu_share, DominantResource::Cpu),
            (gpu_share, DominantResource::Gpu),
            (mem_share, DominantResource::Mem),
            (disk_share, DominantResource::Disk),
            (wakeups_share, DominantResource::Wakeups),
        ];
        shares
            .into_iter()
            .fold((0.0, DominantResource::None), |acc, (share, res)| {
                if share > acc.0 { (share, res) } else { acc }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipc_is_zero_when_cycles_zero() {
        assert_eq!(ProcessScore::compute_ipc(1000, 0), 0.0);
    }

    #[test]
    fn ipc_divides_when_cycles_nonzero() {
        assert_eq!(ProcessScore::compute_ipc(1000, 500), 2.0);
    }

    #[test]
    fn max_share_picks_argmax() {
        let (share, res) = ProcessScore::max_share(0.2, 0.0, 5.0, 1.0, 0.1);
        assert_eq!(share, 5.0);
        assert_eq!(res, DominantResource::Mem);
    }

    #[test]
    fn max_share_none_when_all_zero() {
        let (share, res) = ProcessScore::max_share(0.0, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(share, 0.0);
        assert_eq!(res, DominantResource::None);
    }
}
