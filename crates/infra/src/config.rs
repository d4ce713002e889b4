//! Configuration loading and representation.
//!
//! Values come from JSON (`AppConfig::from_json_str`) or from `FULFIL_*`
//! environment variables (`AppConfig::from_env`); anything unset keeps its
//! default.

use serde::Deserialize;
use thiserror::Error;

use fulfil_observability::{LogConfig, LogFormat};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration document: {0}")]
    Json(String),

    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Behaviour switches of the fulfillment engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FulfillmentConfig {
    /// Run the shortage cascade as part of Submit.
    pub cascade_on_submit: bool,
    /// Abort Submit when a short product has no active BOM. When false the
    /// product is reported as unplanned instead.
    pub fail_on_missing_bom: bool,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            cascade_on_submit: true,
            fail_on_missing_bom: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log: LogConfig,
    pub fulfillment: FulfillmentConfig,
}

impl AppConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::Json(e.to_string()))
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (environment-shaped keys).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(filter) = lookup("FULFIL_LOG_FILTER") {
            config.log.filter = filter;
        }
        if let Some(format) = lookup("FULFIL_LOG_FORMAT") {
            config.log.format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "FULFIL_LOG_FORMAT",
                        value: format,
                    });
                }
            };
        }
        if let Some(value) = lookup("FULFIL_CASCADE_ON_SUBMIT") {
            config.fulfillment.cascade_on_submit = parse_bool("FULFIL_CASCADE_ON_SUBMIT", value)?;
        }
        if let Some(value) = lookup("FULFIL_FAIL_ON_MISSING_BOM") {
            config.fulfillment.fail_on_missing_bom =
                parse_bool("FULFIL_FAIL_ON_MISSING_BOM", value)?;
        }

        tracing::debug!(?config, "configuration loaded");
        Ok(config)
    }
}

fn parse_bool(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_cascade_and_fail_on_missing_bom() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert!(config.fulfillment.cascade_on_submit);
        assert!(config.fulfillment.fail_on_missing_bom);
        assert_eq!(config.log, LogConfig::default());
    }

    #[test]
    fn environment_overrides_defaults() {
        let env = HashMap::from([
            ("FULFIL_LOG_FORMAT", "pretty"),
            ("FULFIL_FAIL_ON_MISSING_BOM", "off"),
        ]);
        let config = AppConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.log.format, LogFormat::Pretty);
        assert!(!config.fulfillment.fail_on_missing_bom);
        assert!(config.fulfillment.cascade_on_submit);
    }

    #[test]
    fn unparseable_flag_is_rejected() {
        let err = AppConfig::from_lookup(|k| {
            (k == "FULFIL_CASCADE_ON_SUBMIT").then(|| "maybe".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "FULFIL_CASCADE_ON_SUBMIT", .. }));
    }

    #[test]
    fn json_document_may_be_partial() {
        let config =
            AppConfig::from_json_str(r#"{ "fulfillment": { "cascade_on_submit": false } }"#).unwrap();
        assert!(!config.fulfillment.cascade_on_submit);
        assert!(config.fulfillment.fail_on_missing_bom);
    }
}
