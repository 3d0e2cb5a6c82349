//! Pure scoring functions: shares, disproportionality, the log-weighted
//! raw score, state multipliers, and band mapping. Kept free of any I/O
//! or mutable state so the calibration anchors in spec.md §4.1 step 9-10
//! can be pinned down with direct unit tests.

use crate::model::{Band, ProcessState};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceWeights {
    pub cpu: f64,
    pub gpu: f64,
    pub mem: f64,
    pub disk: f64,
    pub wakeups: f64,
}

impl Default for ResourceWeights {
    fn default() -> Self {
        Self {
            cpu: 1.0,
            gpu: 1.0,
            mem: 1.0,
            disk: 1.0,
            wakeups: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateMultipliers {
    pub idle: f64,
    pub sleeping: f64,
    pub running: f64,
    pub stopped: f64,
    pub halted: f64,
    pub zombie: f64,
    pub stuck: f64,
}

impl Default for StateMultipliers {
    fn default() -> Self {
        Self {
            idle: 0.5,
            sleeping: 0.5,
            stopped: 0.7,
            halted: 0.8,
            zombie: 0.9,
            running: 1.0,
            stuck: 1.0,
        }
    }
}

impl StateMultipliers {
    pub fn for_state(&self, state: ProcessState) -> f64 {
        match state {
            ProcessState::Idle => self.idle,
            ProcessState::Sleeping => self.sleeping,
            ProcessState::Running => self.running,
            ProcessState::Stopped => self.stopped,
            ProcessState::Halted => self.halted,
            ProcessState::Zombie => self.zombie,
            ProcessState::Stuck => self.stuck,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandThresholds {
    pub low: i32,
    pub medium: i32,
    pub elevated: i32,
    pub high: i32,
    pub critical: i32,
}

impl Default for BandThresholds {
    fn default() -> Self {
        Self {
            low: 0,
            medium: 20,
            elevated: 45,
            high: 60,
            critical: 80,
        }
    }
}

/// `fair_share = 1 / active_processes`, floored at 1 active process so
/// this never divides by zero.
pub fn fair_share(active_processes: u32) -> f64 {
    1.0 / active_processes.max(1) as f64
}

/// `r_share = process_r / (system_r / active_processes)`. Returns 0 when
/// `system_r` is zero or unknown, per spec.
pub fn resource_share(process_r: f64, system_r: f64, active_processes: u32) -> f64 {
    if system_r <= 0.0 {
        return 0.0;
    }
    process_r / (system_r / active_processes.max(1) as f64)
}

/// CPU uses per-core normalization: the "system total" is
/// `100 * core_count`, not a derived sum.
pub fn cpu_share(cpu_percent: f64, core_count: u32, active_processes: u32) -> f64 {
    resource_share(cpu_percent, 100.0 * core_count.max(1) as f64, active_processes)
}

/// Weights shares and takes a base-2 log. Calibration anchors (single
/// resource active, weight 1.0): 1x fair share -> 0, 50x -> ~56,
/// 100x -> ~66, 200x -> ~76.
pub fn raw_score(shares: [f64; 5], weights: ResourceWeights) -> f64 {
    let weighted_total = shares[0] * weights.cpu
        + shares[1] * weights.gpu
        + shares[2] * weights.mem
        + shares[3] * weights.disk
        + shares[4] * weights.wakeups;
    if weighted_total > 1.0 {
        weighted_total.log2() * 10.0
    } else {
        0.0
    }
}

/// Applies the state multiplier and clamps/rounds into `[0, 100]`.
pub fn apply_state_multiplier(raw: f64, state: ProcessState, multipliers: &StateMultipliers) -> i32 {
    let scaled = raw * multipliers.for_state(state);
    scaled.round().clamp(0.0, 100.0) as i32
}

/// The highest band whose threshold is `<= score`.
pub fn band_of(score: i32, thresholds: &BandThresholds) -> Band {
    if score >= thresholds.critical {
        Band::Critical
    } else if score >= thresholds.high {
        Band::High
    } else if score >= thresholds.elevated {
        Band::Elevated
    } else if score >= thresholds.medium {
        Band::Medium
    } else {
        Band::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor_score(multiple: f64) -> f64 {
        raw_score([multiple, 0.0, 0.0, 0.0, 0.0], ResourceWeights::default())
    }

    #[test]
    fn calibration_anchor_1x_is_zero() {
        assert_eq!(anchor_score(1.0), 0.0);
    }

    #[test]
    fn calibration_anchor_50x_is_about_56() {
        assert!((anchor_score(50.0) - 56.0).abs() < 1.0);
    }

    #[test]
    fn calibration_anchor_100x_is_about_66() {
        assert!((anchor_score(100.0) - 66.0).abs() < 1.0);
    }

    #[test]
    fn calibration_anchor_200x_is_about_76() {
        assert!((anchor_score(200.0) - 76.0).abs() < 1.0);
    }

    #[test]
    fn state_multiplier_example_from_spec() {
        // raw score 80, state sleeping (x0.5) => 40, band medium.
        let score = apply_state_multiplier(80.0, ProcessState::Sleeping, &StateMultipliers::default());
        assert_eq!(score, 40);
        assert_eq!(band_of(score, &BandThresholds::default()), Band::Medium);
    }

    #[test]
    fn active_processes_one_means_score_zero() {
        // active_processes == 1 => share == 1.0 exactly => weighted_total == 1.0,
        // which is not > 1.0, so raw score is 0.
        let share = resource_share(1.0, 1.0, 1);
        let raw = raw_score([share, 0.0, 0.0, 0.0, 0.0], ResourceWeights::default());
        assert_eq!(raw, 0.0);
    }

    #[test]
    fn band_boundaries_are_lower_inclusive() {
        let t = BandThresholds::default();
        assert_eq!(band_of(19, &t), Band::Low);
        assert_eq!(band_of(20, &t), Band::Medium);
        assert_eq!(band_of(45, &t), Band::Elevated);
        assert_eq!(band_of(60, &t), Band::High);
        assert_eq!(band_of(80, &t), Band::Critical);
        assert_eq!(band_of(100, &t), Band::Critical);
    }

    #[test]
    fn resource_share_zero_system_total_is_zero() {
        assert_eq!(resource_share(5.0, 0.0, 10), 0.0);
    }
}
