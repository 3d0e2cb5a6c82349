//! C1: periodic sampling, delta/rate computation, and per-process
//! scoring. One `collect()` call produces one `SampleBatch`.

pub mod scoring;

use std::collections::HashMap;

use crate::model::{MetricValue, MetricValueStr, ProcessScore, ProcessState, SampleBatch};
use crate::platform::{timebase_to_seconds, Clock, PlatformApi, PlatformError, ProcessRawSample, SystemRawInfo};

use scoring::{BandThresholds, ResourceWeights, StateMultipliers};

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    pub weights: ResourceWeights,
    pub state_multipliers: StateMultipliers,
    pub band_thresholds: BandThresholds,
    pub top_n: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            weights: ResourceWeights::default(),
            state_multipliers: StateMultipliers::default(),
            band_thresholds: BandThresholds::default(),
            top_n: 20,
        }
    }
}

/// Cumulative counters and the wall time they were read at, kept per PID
/// so the next tick can diff against them. Pruned by presence-in-current-
/// tick, never by age or weak reference.
#[derive(Debug, Clone)]
struct PrevSample {
    wall_time: f64,
    command: String,
    user_time: u64,
    system_time: u64,
    pageins: i64,
    faults: i64,
    diskio_total: i64,
    csw: i64,
    syscalls: i64,
    mach_msgs: i64,
    energy: i64,
    wakeups: i64,
    runnable_time: i64,
    qos_interactive: i64,
}

impl PrevSample {
    fn from_raw(raw: &ProcessRawSample, wall_time: f64) -> Self {
        Self {
            wall_time,
            command: raw.command.clone(),
            user_time: raw.user_time,
            system_time: raw.system_time,
            pageins: raw.pageins,
            faults: raw.faults,
            diskio_total: raw.diskio_read + raw.diskio_written,
            csw: raw.context_switches,
            syscalls: raw.syscalls(),
            mach_msgs: raw.mach_messages_sent + raw.mach_messages_received,
            energy: raw.energy,
            wakeups: raw.wakeups(),
            runnable_time: raw.runnable_time,
            qos_interactive: raw.cpu_time_qos_user_interactive,
        }
    }

    /// A command-string change or any cumulative counter going backward
    /// means the PID was reused/exec'd since we last saw it: treat it as
    /// brand new for rate purposes.
    fn is_reset_against(&self, raw: &ProcessRawSample) -> bool {
        raw.command != self.command
            || raw.pageins < self.pageins
            || raw.faults < self.faults
            || (raw.diskio_read + raw.diskio_written) < self.diskio_total
            || raw.context_switches < self.csw
            || raw.syscalls() < self.syscalls
            || (raw.mach_messages_sent + raw.mach_messages_received) < self.mach_msgs
            || raw.energy < self.energy
            || raw.wakeups() < self.wakeups
            || raw.runnable_time < self.runnable_time
            || raw.cpu_time_qos_user_interactive < self.qos_interactive
            || raw.user_time < self.user_time
            || raw.system_time < self.system_time
    }
}

fn rate(curr: i64, prev: i64, dt: f64) -> f64 {
    if dt <= 0.0 {
        return 0.0;
    }
    ((curr - prev) as f64 / dt).max(0.0)
}

struct PartialScore {
    raw: ProcessRawSample,
    cpu_percent: f64,
    mem_current: i64,
    disk_io_total: i64,
    disk_io_rate: f64,
    wakeups_rate: f64,
    pageins_rate: f64,
    faults_rate: f64,
    csw_rate: f64,
    syscalls_rate: f64,
    mach_msgs_rate: f64,
    energy_rate: f64,
    runnable_time_rate: f64,
    qos_interactive_rate: f64,
}

pub struct Collector<P: PlatformApi, C: Clock> {
    platform: P,
    clock: C,
    config: CollectorConfig,
    prev: HashMap<u32, PrevSample>,
    prev_tick_wall: Option<f64>,
}

impl<P: PlatformApi, C: Clock> Collector<P, C> {
    pub fn new(platform: P, clock: C, config: CollectorConfig) -> Self {
        Self {
            platform,
            clock,
            config,
            prev: HashMap::new(),
            prev_tick_wall: None,
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut CollectorConfig {
        &mut self.config
    }

    /// One full sweep. Fails only if PID enumeration or system-info
    /// reads fail; individual per-PID read failures are absorbed.
    pub fn collect(&mut self) -> Result<SampleBatch, CollectError> {
        let now_wall = self.clock.now_wall();
        let pids = self.platform.enumerate_pids()?;
        let sys_info: SystemRawInfo = self.platform.system_info()?;
        let wall_dt = match self.prev_tick_wall {
            Some(prev) if now_wall > prev => now_wall - prev,
            _ => 0.0,
        };

        let mut partials = Vec::with_capacity(pids.len());
        let mut next_prev: HashMap<u32, PrevSample> = HashMap::with_capacity(pids.len());

        for pid in pids {
            let raw = match self.platform.read_process(pid) {
                Ok(raw) => raw,
                Err(PlatformError::ProcessGone(_)) => continue,
                Err(e) => {
                    tracing::debug!(pid, error = %e, "transient per-PID read failure, skipping");
                    continue;
                }
            };

            let prev = self.prev.get(&pid);
            let reset = prev.map(|p| p.is_reset_against(&raw)).unwrap_or(true);

            let (cpu_percent, pageins_rate, faults_rate, disk_io_rate, csw_rate, syscalls_rate, mach_msgs_rate, energy_rate, wakeups_rate, runnable_time_rate, qos_interactive_rate) =
                if reset {
                    (0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0)
                } else {
                    let prev = prev.unwrap();
                    let dt = if now_wall > prev.wall_time { now_wall - prev.wall_time } else { 0.0 };
                    let cpu_time_delta = (raw.user_time + raw.system_time)
                        .saturating_sub(prev.user_time + prev.system_time);
                    let cpu_seconds = timebase_to_seconds(cpu_time_delta, sys_info.timebase_numer, sys_info.timebase_denom);
                    let cpu_percent = if dt > 0.0 { (cpu_seconds / dt) * 100.0 } else { 0.0 };
                    (
                        cpu_percent,
                        rate(raw.pageins, prev.pageins, dt),
                        rate(raw.faults, prev.faults, dt),
                        rate(raw.diskio_read + raw.diskio_written, prev.diskio_total, dt),
                        rate(raw.context_switches, prev.csw, dt),
                        rate(raw.syscalls(), prev.syscalls, dt),
                        rate(raw.mach_messages_sent + raw.mach_messages_received, prev.mach_msgs, dt),
                        rate(raw.energy, prev.energy, dt),
                        rate(raw.wakeups(), prev.wakeups, dt),
                        rate(raw.runnable_time, prev.runnable_time, dt) / 1_000_000.0,
                        rate(raw.cpu_time_qos_user_interactive, prev.qos_interactive, dt),
                    )
                };

            next_prev.insert(pid, PrevSample::from_raw(&raw, now_wall));

            let disk_io_total = raw.diskio_read + raw.diskio_written;
            partials.push(PartialScore {
                mem_current: raw.resident_footprint,
                disk_io_total,
                cpu_percent,
                disk_io_rate,
                wakeups_rate,
                pageins_rate,
                faults_rate,
                csw_rate,
                syscalls_rate,
                mach_msgs_rate,
                energy_rate,
                runnable_time_rate,
                qos_interactive_rate,
                raw,
            });
        }

        let active_processes = partials
            .iter()
            .filter(|p| p.raw.state == ProcessState::Running)
            .count()
            .max(1) as u32;
        let system_mem: f64 = partials.iter().map(|p| p.mem_current as f64).sum();
        let system_disk_rate: f64 = partials.iter().map(|p| p.disk_io_rate).sum();
        let system_wakeups_rate: f64 = partials.iter().map(|p| p.wakeups_rate).sum();

        let mut scores = Vec::with_capacity(partials.len());
        for p in partials {
            let cpu_share = scoring::cpu_share(p.cpu_percent, sys_info.core_count, active_processes);
            let mem_share = scoring::resource_share(p.mem_current as f64, system_mem, active_processes);
            let disk_share = scoring::resource_share(p.disk_io_rate, system_disk_rate, active_processes);
            let wakeups_share = scoring::resource_share(p.wakeups_rate, system_wakeups_rate, active_processes);
            let gpu_share = 0.0;

            let (disproportionality, dominant_resource) =
                ProcessScore::max_share(cpu_share, gpu_share, mem_share, disk_share, wakeups_share);

            let raw_score = scoring::raw_score([cpu_share, gpu_share, mem_share, disk_share, wakeups_share], self.config.weights);
            let score = scoring::apply_state_multiplier(raw_score, p.raw.state, &self.config.state_multipliers);
            let band = scoring::band_of(score, &self.config.band_thresholds);

            scores.push(ProcessScore {
                pid: p.raw.pid,
                command: p.raw.command.clone(),
                captured_at: now_wall,
                cpu: MetricValue::new(p.cpu_percent),
                mem: MetricValue::new(p.mem_current),
                mem_peak: p.raw.lifetime_peak_footprint,
                pageins: p.raw.pageins,
                pageins_rate: p.pageins_rate,
                faults: p.raw.faults,
                faults_rate: p.faults_rate,
                disk_io: MetricValue::new(p.disk_io_total),
                disk_io_rate: p.disk_io_rate,
                csw: p.raw.context_switches,
                csw_rate: p.csw_rate,
                syscalls: p.raw.syscalls(),
                syscalls_rate: p.syscalls_rate,
                threads: p.raw.thread_count,
                mach_msgs: p.raw.mach_messages_sent + p.raw.mach_messages_received,
                mach_msgs_rate: p.mach_msgs_rate,
                instructions: p.raw.instructions,
                cycles: p.raw.cycles,
                ipc: ProcessScore::compute_ipc(p.raw.instructions, p.raw.cycles),
                energy: p.raw.energy,
                energy_rate: p.energy_rate,
                wakeups: p.raw.wakeups(),
                wakeups_rate: p.wakeups_rate,
                runnable_time: p.raw.runnable_time,
                runnable_time_rate: p.runnable_time_rate,
                qos_interactive: p.raw.cpu_time_qos_user_interactive,
                qos_interactive_rate: p.qos_interactive_rate,
                state: MetricValueStr::new(p.raw.state.to_string()),
                priority: MetricValue::new(p.raw.priority),
                score,
                band: MetricValueStr::new(band.to_string()),
                cpu_share,
                gpu_share,
                mem_share,
                disk_share,
                wakeups_share,
                disproportionality,
                dominant_resource,
            });
        }

        let max_score = scores.iter().map(|s| s.score).max().unwrap_or(0);
        let process_count = scores.len() as i64;

        scores.sort_by(|a, b| b.score.cmp(&a.score).then(a.pid.cmp(&b.pid)));
        scores.truncate(self.config.top_n);

        self.prev = next_prev;
        self.prev_tick_wall = Some(now_wall);

        Ok(SampleBatch {
            timestamp: now_wall,
            elapsed_ms: (wall_dt * 1000.0) as i64,
            process_count,
            max_score,
            rogues: scores,
        })
    }
}
