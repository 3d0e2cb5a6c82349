use serde::{Deserialize, Serialize};
use std::fmt;

/// A sampled value together with its low/high range across the ring
/// buffer window. Before enrichment, `low == high == current`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricValue<T> {
    pub current: T,
    pub low: T,
    pub high: T,
}

impl<T: Copy> MetricValue<T> {
    pub fn new(current: T) -> Self {
        Self {
            current,
            low: current,
            high: current,
        }
    }
}

/// Same shape as [`MetricValue`] but for values whose low/high ordering is
/// a severity ordering rather than numeric or lexical order (state, band).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValueStr {
    pub current: String,
    pub low: String,
    pub high: String,
}

impl MetricValueStr {
    pub fn new(current: impl Into<String>) -> Self {
        let current = current.into();
        Self {
            low: current.clone(),
            high: current.clone(),
            current,
        }
    }
}

/// Process run state, in strictly ascending severity order: a process
/// that is actually running is "worse" than one idling, and a stuck
/// process is worse than a zombie. Declaration order here is load-bearing
/// — `derive(Ord)` compares by variant discriminant, so the severity
/// ordering spec.md requires falls out of the enum's variant order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Idle,
    Sleeping,
    Running,
    Stopped,
    Halted,
    Zombie,
    Stuck,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessState::Idle => "idle",
            ProcessState::Sleeping => "sleeping",
            ProcessState::Running => "running",
            ProcessState::Stopped => "stopped",
            ProcessState::Halted => "halted",
            ProcessState::Zombie => "zombie",
            ProcessState::Stuck => "stuck",
        };
        f.write_str(s)
    }
}

/// Severity band derived from score. Declaration order is load-bearing,
/// same reasoning as [`ProcessState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Low,
    Medium,
    Elevated,
    High,
    Critical,
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Band::Low => "low",
            Band::Medium => "medium",
            Band::Elevated => "elevated",
            Band::High => "high",
            Band::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// The resource a process's disproportionality is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DominantResource {
    Cpu,
    Gpu,
    Mem,
    Disk,
    Wakeups,
    None,
}

impl fmt::Display for DominantResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DominantResource::Cpu => "cpu",
            DominantResource::Gpu => "gpu",
            DominantResource::Mem => "mem",
            DominantResource::Disk => "disk",
            DominantResource::Wakeups => "wakeups",
            DominantResource::None => "none",
        };
        f.write_str(s)
    }
}

/// Combines two [`MetricValue`]s under severity ordering, used by
/// [`MetricValueStr`] enrichment where `T` doesn't implement `Ord` in the
/// way we need (string order vs. severity order).
pub fn severity_low_high<T: Ord + Clone>(values: impl Iterator<Item = T>) -> Option<(T, T)> {
    let mut low: Option<T> = None;
    let mut high: Option<T> = None;
    for v in values {
        low = Some(match low {
            Some(l) if l <= v => l,
            _ => v.clone(),
        });
        high = Some(match high {
            Some(h) if h >= v => h,
            _ => v,
        });
    }
    low.zip(high)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_severity_ordering() {
        assert!(ProcessState::Idle < ProcessState::Sleeping);
        assert!(ProcessState::Sleeping < ProcessState::Running);
        assert!(ProcessState::Running < ProcessState::Stopped);
        assert!(ProcessState::Stopped < ProcessState::Halted);
        assert!(ProcessState::Halted < ProcessState::Zombie);
        assert!(ProcessState::Zombie < ProcessState::Stuck);
    }

    #[test]
    fn band_severity_ordering() {
        assert!(Band::Low < Band::Medium);
        assert!(Band::Medium < Band::Elevated);
        assert!(Band::Elevated < Band::High);
        assert!(Band::High < Band::Critical);
    }

    #[test]
    fn metric_value_new_has_equal_bounds() {
        let m = MetricValue::new(42i64);
        assert_eq!(m.current, 42);
        assert_eq!(m.low, 42);
        assert_eq!(m.high, 42);
    }

    #[test]
    fn severity_low_high_picks_extremes_not_lexical() {
        let states = vec![ProcessState::Running, ProcessState::Idle, ProcessState::Zombie];
        let (low, high) = severity_low_high(states.into_iter()).unwrap();
        assert_eq!(low, ProcessState::Idle);
        assert_eq!(high, ProcessState::Zombie);
    }
}
