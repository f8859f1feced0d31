//! Engine configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Emit a low-stock intent to the Spares role after mutations that leave an item low.
    pub low_stock_notifications: bool,
    /// Minimum stock level given to items auto-registered by handover approval.
    pub default_min_stock_level: i64,
    /// Postgres URL for the document sequence counter; in-memory numbering when unset.
    pub database_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            low_stock_notifications: true,
            default_min_stock_level: 0,
            database_url: None,
        }
    }
}

impl EngineConfig {
    pub const LOW_STOCK_NOTIFICATIONS: &'static str = "TOOLROOM_LOW_STOCK_NOTIFICATIONS";
    pub const DEFAULT_MIN_STOCK: &'static str = "TOOLROOM_DEFAULT_MIN_STOCK";
    pub const DATABASE_URL: &'static str = "DATABASE_URL";

    /// Read the process environment, falling back to defaults for unset keys.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(Self::LOW_STOCK_NOTIFICATIONS) {
            config.low_stock_notifications = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: Self::LOW_STOCK_NOTIFICATIONS,
                        value: raw,
                    });
                }
            };
        }

        if let Some(raw) = lookup(Self::DEFAULT_MIN_STOCK) {
            config.default_min_stock_level = raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|v| *v >= 0)
                .ok_or(ConfigError::Invalid {
                    key: Self::DEFAULT_MIN_STOCK,
                    value: raw.clone(),
                })?;
        }

        config.database_url = lookup(Self::DATABASE_URL).filter(|url| !url.trim().is_empty());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.low_stock_notifications);
    }

    #[test]
    fn reads_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("TOOLROOM_LOW_STOCK_NOTIFICATIONS", "off"),
            ("TOOLROOM_DEFAULT_MIN_STOCK", "3"),
            ("DATABASE_URL", "postgres://localhost/toolroom"),
        ]))
        .unwrap();
        assert!(!config.low_stock_notifications);
        assert_eq!(config.default_min_stock_level, 3);
        assert!(config.database_url.is_some());
    }

    #[test]
    fn rejects_garbage() {
        let err = EngineConfig::from_lookup(lookup(&[("TOOLROOM_DEFAULT_MIN_STOCK", "-1")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "TOOLROOM_DEFAULT_MIN_STOCK", .. }));
    }
}
