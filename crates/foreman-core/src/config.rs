//! Process-wide automation configuration.
//!
//! One row in storage, loaded at startup and mutated through the engine's
//! `set_config` operation, which restarts the interval timer when the
//! enabled flag or the interval changes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u32,
    /// Minimum confidence for an action to skip human approval, provided
    /// the owning module marks it eligible.
    #[serde(default = "default_auto_execute_threshold")]
    pub auto_execute_threshold: f64,
}

fn default_interval_hours() -> u32 {
    4
}

fn default_auto_execute_threshold() -> f64 {
    0.8
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_interval_hours(),
            auto_execute_threshold: default_auto_execute_threshold(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = AutomationConfig::default();
        assert!(!cfg.enabled);
        assert_eq!(cfg.interval_hours, 4);
        assert_eq!(cfg.auto_execute_threshold, 0.8);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: AutomationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, AutomationConfig::default());
    }

    #[test]
    fn explicit_fields_survive_roundtrip() {
        let cfg = AutomationConfig {
            enabled: true,
            interval_hours: 12,
            auto_execute_threshold: 0.9,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: AutomationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
