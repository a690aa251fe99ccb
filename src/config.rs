//! Fluid Configuration Module
//!
//! Builder-wide settings, loadable from a TOML file.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Environment variables (`FLUID_DEBUG`, `FLUID_RECORD_EVENTS`, `FLUID_RESERVED_PREFIX`)
//! 2. Config file
//! 3. Defaults
//!
//! ```toml
//! debug = false
//! record_events = true
//! reserved_prefix = "_"
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FluidError, Result};
use crate::util::constants::{
    DEFAULT_RESERVED_PREFIX, ENV_DEBUG, ENV_RECORD_EVENTS, ENV_RESERVED_PREFIX,
};

/// Builder configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FluidConfig {
    /// Print colored progress lines to stdout while running
    #[serde(default)]
    pub debug: bool,
    /// Record execution events into the builder's event log
    #[serde(default = "default_record_events")]
    pub record_events: bool,
    /// Prefix for operation names that collide with builder members
    #[serde(default = "default_reserved_prefix")]
    pub reserved_prefix: String,
}

fn default_record_events() -> bool {
    true
}

fn default_reserved_prefix() -> String {
    DEFAULT_RESERVED_PREFIX.to_string()
}

impl Default for FluidConfig {
    fn default() -> Self {
        Self {
            debug: false,
            record_events: default_record_events(),
            reserved_prefix: default_reserved_prefix(),
        }
    }
}

impl FluidConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| FluidError::ConfigError {
            reason: format!("Failed to parse config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    ///
    /// Returns default config if file doesn't exist.
    /// Returns error if file exists but is malformed.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| FluidError::ConfigError {
            reason: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        Self::from_toml_str(&content)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| FluidError::ConfigError {
            reason: format!("Failed to serialize config: {}", e),
        })
    }

    /// Merge with environment variables
    ///
    /// Environment variables take precedence over config file values.
    /// Unparseable boolean values are ignored with a warning.
    pub fn with_env(mut self) -> Self {
        if let Some(debug) = env_flag(ENV_DEBUG) {
            self.debug = debug;
        }
        if let Some(record) = env_flag(ENV_RECORD_EVENTS) {
            self.record_events = record;
        }
        if let Ok(prefix) = std::env::var(ENV_RESERVED_PREFIX) {
            if !prefix.is_empty() {
                self.reserved_prefix = prefix;
            }
        }
        self
    }

    /// Check invariants not expressible in the TOML schema
    pub fn validate(&self) -> Result<()> {
        if self.reserved_prefix.is_empty() {
            return Err(FluidError::ConfigError {
                reason: "reserved_prefix must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn env_flag(var: &str) -> Option<bool> {
    let value = std::env::var(var).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        "" => None,
        other => {
            tracing::warn!(var, value = other, "ignoring unrecognised boolean");
            None
        }
    }
}

/// Options for a single `go` run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoOptions {
    /// Print colored progress lines (in addition to `FluidConfig::debug`)
    #[serde(default)]
    pub debug: bool,
}

impl GoOptions {
    pub fn debug() -> Self {
        Self { debug: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = FluidConfig::default();
        assert!(!config.debug);
        assert!(config.record_events);
        assert_eq!(config.reserved_prefix, "_");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = FluidConfig::from_toml_str("debug = true").unwrap();
        assert_eq!(
            config,
            FluidConfig {
                debug: true,
                ..FluidConfig::default()
            }
        );
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = FluidConfig::from_toml_str("debug = ").unwrap_err();
        assert_eq!(err.code(), "FLUID-040");
    }

    #[test]
    fn test_empty_prefix_is_rejected() {
        assert!(FluidConfig::from_toml_str("reserved_prefix = \"\"").is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = FluidConfig {
            debug: true,
            record_events: false,
            reserved_prefix: "op_".to_string(),
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(FluidConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_go_options() {
        assert!(!GoOptions::default().debug);
        assert!(GoOptions::debug().debug);
    }
}
