use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::factory::LifetimeRange;
use crate::world::Millis;

fn default_min_tools() -> usize {
    30
}

fn default_lifetime_min_ms() -> Millis {
    8_000
}

fn default_lifetime_max_ms() -> Millis {
    20_000
}

fn default_fade_lead_ms() -> Millis {
    2_000
}

fn default_aging_period_ms() -> Millis {
    500
}

fn default_reaper_period_ms() -> Millis {
    1_000
}

fn default_collect_removal_delay_ms() -> Millis {
    800
}

fn default_overlay_duration_ms() -> Millis {
    3_000
}

fn default_score_milestone() -> u64 {
    7
}

fn default_reset_backdate_max_ms() -> Millis {
    10_000
}

fn default_overlay_asset() -> String {
    "/bosnov-67.gif".to_string()
}

/// Tunables of the population manager. Every field defaults to the
/// reference timing contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Floor for the number of active tools
    #[serde(default = "default_min_tools")]
    pub min_tools: usize,
    #[serde(default = "default_lifetime_min_ms")]
    pub lifetime_min_ms: Millis,
    #[serde(default = "default_lifetime_max_ms")]
    pub lifetime_max_ms: Millis,
    /// How long before expiry a tool starts fading
    #[serde(default = "default_fade_lead_ms")]
    pub fade_lead_ms: Millis,
    #[serde(default = "default_aging_period_ms")]
    pub aging_period_ms: Millis,
    #[serde(default = "default_reaper_period_ms")]
    pub reaper_period_ms: Millis,
    #[serde(default = "default_collect_removal_delay_ms")]
    pub collect_removal_delay_ms: Millis,
    #[serde(default = "default_overlay_duration_ms")]
    pub overlay_duration_ms: Millis,
    #[serde(default = "default_score_milestone")]
    pub score_milestone: u64,
    /// Upper bound of the random age given to tools seeded by a reset
    #[serde(default = "default_reset_backdate_max_ms")]
    pub reset_backdate_max_ms: Millis,
    #[serde(default = "default_overlay_asset")]
    pub overlay_asset: String,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            min_tools: default_min_tools(),
            lifetime_min_ms: default_lifetime_min_ms(),
            lifetime_max_ms: default_lifetime_max_ms(),
            fade_lead_ms: default_fade_lead_ms(),
            aging_period_ms: default_aging_period_ms(),
            reaper_period_ms: default_reaper_period_ms(),
            collect_removal_delay_ms: default_collect_removal_delay_ms(),
            overlay_duration_ms: default_overlay_duration_ms(),
            score_milestone: default_score_milestone(),
            reset_backdate_max_ms: default_reset_backdate_max_ms(),
            overlay_asset: default_overlay_asset(),
        }
    }
}

/// Longest duration any tunable may name: one day.
pub const MAX_DURATION_MS: Millis = 24 * 60 * 60 * 1_000;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("min_tools must be at least 1")]
    EmptyFloor,
    #[error("lifetime range {min}..={max} ms is invalid")]
    LifetimeRange { min: Millis, max: Millis },
    #[error("{name} must be positive, got {value} ms")]
    NonPositiveDuration { name: &'static str, value: Millis },
    #[error("{name} of {value} ms exceeds the {max} ms limit")]
    DurationTooLarge {
        name: &'static str,
        value: Millis,
        max: Millis,
    },
    #[error("reset_backdate_max_ms must not be negative")]
    NegativeBackdate,
    #[error("score_milestone must be at least 1")]
    ZeroMilestone,
}

impl PopulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_tools == 0 {
            return Err(ConfigError::EmptyFloor);
        }
        if self.lifetime_min_ms <= 0 || self.lifetime_min_ms > self.lifetime_max_ms {
            return Err(ConfigError::LifetimeRange {
                min: self.lifetime_min_ms,
                max: self.lifetime_max_ms,
            });
        }
        for (name, value) in [
            ("aging_period_ms", self.aging_period_ms),
            ("reaper_period_ms", self.reaper_period_ms),
            ("collect_removal_delay_ms", self.collect_removal_delay_ms),
            ("overlay_duration_ms", self.overlay_duration_ms),
        ] {
            if value <= 0 {
                return Err(ConfigError::NonPositiveDuration { name, value });
            }
        }
        if self.reset_backdate_max_ms < 0 {
            return Err(ConfigError::NegativeBackdate);
        }
        for (name, value) in [
            ("lifetime_max_ms", self.lifetime_max_ms),
            ("fade_lead_ms", self.fade_lead_ms),
            ("aging_period_ms", self.aging_period_ms),
            ("reaper_period_ms", self.reaper_period_ms),
            ("collect_removal_delay_ms", self.collect_removal_delay_ms),
            ("overlay_duration_ms", self.overlay_duration_ms),
            ("reset_backdate_max_ms", self.reset_backdate_max_ms),
        ] {
            if !(-MAX_DURATION_MS..=MAX_DURATION_MS).contains(&value) {
                return Err(ConfigError::DurationTooLarge {
                    name,
                    value,
                    max: MAX_DURATION_MS,
                });
            }
        }
        if self.score_milestone == 0 {
            return Err(ConfigError::ZeroMilestone);
        }
        Ok(())
    }

    pub fn lifetime_range(&self) -> LifetimeRange {
        LifetimeRange {
            min: self.lifetime_min_ms,
            max: self.lifetime_max_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_timings() {
        let config = PopulationConfig::default();
        assert_eq!(config.min_tools, 30);
        assert_eq!(config.aging_period_ms, 500);
        assert_eq!(config.reaper_period_ms, 1_000);
        assert_eq!(config.collect_removal_delay_ms, 800);
        assert_eq!(config.overlay_duration_ms, 3_000);
        assert_eq!(config.score_milestone, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let config: PopulationConfig = serde_yaml::from_str("min_tools: 12\n").unwrap();
        assert_eq!(config.min_tools, 12);
        assert_eq!(config.lifetime_max_ms, 20_000);
        assert_eq!(config.overlay_asset, "/bosnov-67.gif");
    }

    #[test]
    fn rejects_inverted_lifetime() {
        let config = PopulationConfig {
            lifetime_min_ms: 5_000,
            lifetime_max_ms: 4_000,
            ..PopulationConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::LifetimeRange {
                min: 5_000,
                max: 4_000
            })
        );
    }

    #[test]
    fn rejects_zero_period() {
        let config = PopulationConfig {
            reaper_period_ms: 0,
            ..PopulationConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositiveDuration {
                name: "reaper_period_ms",
                value: 0
            })
        );
    }

    #[test]
    fn rejects_durations_past_one_day() {
        let config = PopulationConfig {
            overlay_duration_ms: Millis::MAX,
            ..PopulationConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::DurationTooLarge {
                name: "overlay_duration_ms",
                value: Millis::MAX,
                max: MAX_DURATION_MS,
            })
        );

        let config = PopulationConfig {
            collect_removal_delay_ms: MAX_DURATION_MS,
            ..PopulationConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_empty_floor() {
        let config = PopulationConfig {
            min_tools: 0,
            ..PopulationConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyFloor));
    }
}
