//! TOML configuration surface. Every option has a default, so an empty
//! file is valid; invalid values are rejected at load time rather than
//! clamped, per spec's startup-reject policy.

use serde::Deserialize;

use crate::collector::CollectorConfig;
use crate::collector::scoring::{BandThresholds, ResourceWeights, StateMultipliers};
use crate::model::Band;
use crate::tracker::{CheckpointIntervals, TrackerConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SystemSection {
    pub ring_buffer_size: usize,
    pub sample_interval: f64,
    pub forensics_debounce: f64,
}

impl Default for SystemSection {
    fn default() -> Self {
        Self {
            ring_buffer_size: 60,
            sample_interval: 1.0 / 3.0,
            forensics_debounce: 30.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BandsSection {
    pub low: i32,
    pub medium: i32,
    pub elevated: i32,
    pub high: i32,
    pub critical: i32,
    pub tracking_band: String,
    pub forensics_band: String,
    pub medium_checkpoint_samples: u32,
    pub elevated_checkpoint_samples: u32,
    pub event_cooldown_seconds: f64,
    pub exit_stability_samples: u32,
}

impl Default for BandsSection {
    fn default() -> Self {
        let t = BandThresholds::default();
        Self {
            low: t.low,
            medium: t.medium,
            elevated: t.elevated,
            high: t.high,
            critical: t.critical,
            tracking_band: "medium".to_string(),
            forensics_band: "critical".to_string(),
            medium_checkpoint_samples: CheckpointIntervals::default().medium_samples,
            elevated_checkpoint_samples: CheckpointIntervals::default().elevated_samples,
            event_cooldown_seconds: TrackerConfig::default().event_cooldown_seconds,
            exit_stability_samples: TrackerConfig::default().exit_stability_samples,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionSection {
    pub events_days: f64,
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self { events_days: 30.0 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeightsSection {
    pub cpu: f64,
    pub gpu: f64,
    pub memory: f64,
    pub disk: f64,
    pub wakeups: f64,
}

impl Default for WeightsSection {
    fn default() -> Self {
        let w = ResourceWeights::default();
        Self {
            cpu: w.cpu,
            gpu: w.gpu,
            memory: w.mem,
            disk: w.disk,
            wakeups: w.wakeups,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StateMultipliersSection {
    pub idle: f64,
    pub sleeping: f64,
    pub stopped: f64,
    pub halted: f64,
    pub zombie: f64,
    pub running: f64,
    pub stuck: f64,
}

impl Default for StateMultipliersSection {
    fn default() -> Self {
        let m = StateMultipliers::default();
        Self {
            idle: m.idle,
            sleeping: m.sleeping,
            stopped: m.stopped,
            halted: m.halted,
            zombie: m.zombie,
            running: m.running,
            stuck: m.stuck,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringSection {
    pub weights: WeightsSection,
    pub state_multipliers: StateMultipliersSection,
}

impl Default for ScoringSection {
    fn default() -> Self {
        Self {
            weights: WeightsSection::default(),
            state_multipliers: StateMultipliersSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RogueSelectionSection {
    pub top_n: usize,
}

impl Default for RogueSelectionSection {
    fn default() -> Self {
        Self { top_n: 20 }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub system: SystemSection,
    pub bands: BandsSection,
    pub retention: RetentionSection,
    pub scoring: ScoringSection,
    pub rogue_selection: RogueSelectionSection,
}

fn parse_band(s: &str) -> Result<Band, ConfigError> {
    Ok(match s {
        "low" => Band::Low,
        "medium" => Band::Medium,
        "elevated" => Band::Elevated,
        "high" => Band::High,
        "critical" => Band::Critical,
        other => return Err(ConfigError::Invalid(format!("unknown band '{other}'"))),
    })
}

impl Config {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.system.ring_buffer_size == 0 {
            return Err(ConfigError::Invalid("system.ring_buffer_size must be >= 1".into()));
        }
        if self.system.sample_interval <= 0.0 {
            return Err(ConfigError::Invalid("system.sample_interval must be > 0".into()));
        }
        if self.system.forensics_debounce < 0.0 {
            return Err(ConfigError::Invalid("system.forensics_debounce must be >= 0".into()));
        }
        let thresholds = [
            self.bands.low,
            self.bands.medium,
            self.bands.elevated,
            self.bands.high,
            self.bands.critical,
        ];
        if !thresholds.windows(2).all(|w| w[0] < w[1]) {
            return Err(ConfigError::Invalid(
                "bands thresholds must be strictly increasing: low < medium < elevated < high < critical".into(),
            ));
        }
        parse_band(&self.bands.tracking_band)?;
        parse_band(&self.bands.forensics_band)?;
        if self.retention.events_days <= 0.0 {
            return Err(ConfigError::Invalid("retention.events_days must be > 0".into()));
        }
        if self.rogue_selection.top_n == 0 {
            return Err(ConfigError::Invalid("rogue_selection.top_n must be >= 1".into()));
        }
        Ok(())
    }

    pub fn band_thresholds(&self) -> BandThresholds {
        BandThresholds {
            low: self.bands.low,
            medium: self.bands.medium,
            elevated: self.bands.elevated,
            high: self.bands.high,
            critical: self.bands.critical,
        }
    }

    pub fn resource_weights(&self) -> ResourceWeights {
        ResourceWeights {
            cpu: self.scoring.weights.cpu,
            gpu: self.scoring.weights.gpu,
            mem: self.scoring.weights.memory,
            disk: self.scoring.weights.disk,
            wakeups: self.scoring.weights.wakeups,
        }
    }

    pub fn state_multipliers(&self) -> StateMultipliers {
        let m = &self.scoring.state_multipliers;
        StateMultipliers {
            idle: m.idle,
            sleeping: m.sleeping,
            stopped: m.stopped,
            halted: m.halted,
            zombie: m.zombie,
            running: m.running,
            stuck: m.stuck,
        }
    }

    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            weights: self.resource_weights(),
            state_multipliers: self.state_multipliers(),
            band_thresholds: self.band_thresholds(),
            top_n: self.rogue_selection.top_n,
        }
    }

    pub fn tracker_config(&self) -> Result<TrackerConfig, ConfigError> {
        Ok(TrackerConfig {
            tracking_threshold: match parse_band(&self.bands.tracking_band)? {
                Band::Low => self.bands.low,
                Band::Medium => self.bands.medium,
                Band::Elevated => self.bands.elevated,
                Band::High => self.bands.high,
                Band::Critical => self.bands.critical,
            },
            forensics_band: parse_band(&self.bands.forensics_band)?,
            checkpoint_intervals: CheckpointIntervals {
                medium_samples: self.bands.medium_checkpoint_samples,
                elevated_samples: self.bands.elevated_checkpoint_samples,
            },
            exit_stability_samples: self.bands.exit_stability_samples,
            event_cooldown_seconds: self.bands.event_cooldown_seconds,
            sample_interval: self.system.sample_interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_valid_and_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.rogue_selection.top_n, 20);
        assert_eq!(config.bands.tracking_band, "medium");
    }

    #[test]
    fn rejects_non_increasing_band_thresholds() {
        let text = "[bands]\nlow = 0\nmedium = 10\nelevated = 5\nhigh = 60\ncritical = 80\n";
        assert!(Config::parse(text).is_err());
    }

    #[test]
    fn rejects_unknown_band_name() {
        let text = "[bands]\ntracking_band = \"extreme\"\n";
        assert!(Config::parse(text).is_err());
    }

    #[test]
    fn rejects_zero_sample_interval() {
        let text = "[system]\nsample_interval = 0.0\n";
        assert!(Config::parse(text).is_err());
    }

    #[test]
    fn overrides_merge_with_defaults() {
        let text = "[rogue_selection]\ntop_n = 5\n";
        let config = Config::parse(text).unwrap();
        assert_eq!(config.rogue_selection.top_n, 5);
        assert_eq!(config.system.ring_buffer_size, 60);
    }
}
