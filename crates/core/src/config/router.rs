//! Router runtime configuration with profile support.
//!
//! Profiles: default, conservative, production, testing. Every field has a
//! serde default so partial TOML files work.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::borrow_manager::DEFAULT_HORIZON_BLOCKS;
use crate::error::RouterResult;
use crate::health::HealthThresholds;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Health factor thresholds
    #[serde(default)]
    pub health: HealthSettings,

    /// Venue selection
    #[serde(default)]
    pub selection: SelectionSettings,

    /// Keeper loop
    #[serde(default)]
    pub keeper: KeeperSettings,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Health factor thresholds as plain ratios.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    /// Below this a position is forced to rebalance
    #[serde(default = "default_min_hf")]
    pub min: f64,

    /// Value restored by a rebalance
    #[serde(default = "default_target_hf")]
    pub target: f64,

    /// Upper bound when sizing a new borrow
    #[serde(default = "default_max_hf")]
    pub max: f64,
}

fn default_min_hf() -> f64 {
    1.5
}
fn default_target_hf() -> f64 {
    2.0
}
fn default_max_hf() -> f64 {
    4.0
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            min: default_min_hf(),
            target: default_target_hf(),
            max: default_max_hf(),
        }
    }
}

impl HealthSettings {
    /// Validated WAD thresholds.
    pub fn thresholds(&self) -> RouterResult<HealthThresholds> {
        HealthThresholds::from_ratios(self.min, self.target, self.max)
    }
}

/// Venue selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionSettings {
    /// Horizon used to predict borrow cost when a request gives none
    #[serde(default = "default_horizon")]
    pub default_horizon_blocks: u64,
}

fn default_horizon() -> u64 {
    DEFAULT_HORIZON_BLOCKS
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            default_horizon_blocks: default_horizon(),
        }
    }
}

/// Keeper loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperSettings {
    /// Tick interval (milliseconds)
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    /// Positions read per tick
    #[serde(default = "default_max_to_check")]
    pub max_to_check: usize,

    /// Positions flagged per tick
    #[serde(default = "default_max_to_return")]
    pub max_to_return: usize,

    /// Blocks of debt growth projected when scanning
    #[serde(default = "default_keeper_horizon")]
    pub horizon_blocks: u64,
}

fn default_interval() -> u64 {
    2_000
}
fn default_max_to_check() -> usize {
    100
}
fn default_max_to_return() -> usize {
    10
}
fn default_keeper_horizon() -> u64 {
    1_800
}

impl Default for KeeperSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            max_to_check: default_max_to_check(),
            max_to_return: default_max_to_return(),
            horizon_blocks: default_keeper_horizon(),
        }
    }
}

impl KeeperSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            health: HealthSettings::default(),
            selection: SelectionSettings::default(),
            keeper: KeeperSettings::default(),
        }
    }
}

impl RouterConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.health.thresholds()?;
        Ok(config)
    }

    /// Fast ticks, no projection, narrow thresholds.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            health: HealthSettings {
                min: 1.1,
                target: 1.5,
                max: 3.0,
            },
            selection: SelectionSettings {
                default_horizon_blocks: 1_000,
            },
            keeper: KeeperSettings {
                interval_ms: 200,
                max_to_check: 10,
                max_to_return: 10,
                horizon_blocks: 0,
            },
        }
    }

    /// Standard thresholds, one hour projection.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            health: HealthSettings::default(),
            selection: SelectionSettings::default(),
            keeper: KeeperSettings {
                interval_ms: 2_000,
                max_to_check: 200,
                max_to_return: 20,
                horizon_blocks: 1_800,
            },
        }
    }

    /// Wide safety margins and a longer projection.
    pub fn conservative() -> Self {
        Self {
            profile: "conservative".to_string(),
            health: HealthSettings {
                min: 2.0,
                target: 2.5,
                max: 5.0,
            },
            selection: SelectionSettings {
                default_horizon_blocks: 302_400, // one week
            },
            keeper: KeeperSettings {
                interval_ms: 1_000,
                max_to_check: 200,
                max_to_return: 50,
                horizon_blocks: 43_200,
            },
        }
    }

    /// Profile from ROUTER_PROFILE, or default.
    /// Supported values: testing, production, conservative
    pub fn from_env() -> Self {
        let profile = std::env::var("ROUTER_PROFILE").unwrap_or_else(|_| "default".to_string());
        match profile.to_lowercase().as_str() {
            "testing" | "test" => Self::testing(),
            "production" | "prod" => Self::production(),
            "conservative" | "safe" => Self::conservative(),
            _ => Self::default(),
        }
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Router configuration loaded");
        tracing::info!(
            min = self.health.min,
            target = self.health.target,
            max = self.health.max,
            "Health factor thresholds"
        );
        tracing::info!(
            default_horizon_blocks = self.selection.default_horizon_blocks,
            "Selection parameters"
        );
        tracing::info!(
            interval_ms = self.keeper.interval_ms,
            max_to_check = self.keeper.max_to_check,
            max_to_return = self.keeper.max_to_return,
            horizon_blocks = self.keeper.horizon_blocks,
            "Keeper parameters"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RouterConfig::default();
        assert_eq!(config.health.min, 1.5);
        assert_eq!(config.keeper.max_to_check, 100);
        assert!(config.health.thresholds().is_ok());
    }

    #[test]
    fn test_profiles_are_valid() {
        for config in [
            RouterConfig::testing(),
            RouterConfig::production(),
            RouterConfig::conservative(),
        ] {
            assert!(config.health.thresholds().is_ok(), "{}", config.profile);
        }
        assert_eq!(RouterConfig::testing().keeper.horizon_blocks, 0);
        assert!(RouterConfig::conservative().health.min > RouterConfig::production().health.min);
    }

    #[test]
    fn test_partial_toml() {
        let parsed: RouterConfig = toml::from_str(
            r#"
            profile = "custom"
            [health]
            min = 1.2
            "#,
        )
        .unwrap();
        assert_eq!(parsed.profile, "custom");
        assert_eq!(parsed.health.min, 1.2);
        assert_eq!(parsed.health.target, 2.0);
        assert_eq!(parsed.keeper.interval_ms, 2_000);
    }

    #[test]
    fn test_serialization() {
        let config = RouterConfig::testing();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("profile = \"testing\""));

        let parsed: RouterConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.profile, "testing");
        assert_eq!(parsed.keeper.max_to_check, 10);
    }

    #[test]
    fn test_invalid_thresholds() {
        let settings = HealthSettings {
            min: 2.0,
            target: 1.5,
            max: 3.0,
        };
        assert!(settings.thresholds().is_err());
    }
}
