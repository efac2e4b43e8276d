// Controller configuration
// Defaults, then an optional TOML file, then CONTROLLER__* environment variables

//! # Configuration
//!
//! Settings are layered with the `config` crate, later sources winning:
//!
//! 1. built-in defaults ([`ControllerConfig::default`])
//! 2. a TOML file (`controller.toml` in the working directory, or an explicit path)
//! 3. environment variables prefixed `CONTROLLER__`, with `__` between nested keys,
//!    e.g. `CONTROLLER__FAULT_INJECTION__EVERY_NTH_CALL=5`
//!
//! ```toml
//! event_buffer_size = 256
//! seed_demo_data = true
//! log_level = "debug"
//!
//! [fault_injection]
//! enabled = true
//! every_nth_call = 3
//! ```

use std::path::Path;

use ::config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::engine::events::DEFAULT_EVENT_BUFFER;
use crate::engine::faults::FaultInjector;
use crate::{ControllerError, Result};

/// File looked up when no explicit path is given
pub const DEFAULT_CONFIG_FILE: &str = "controller.toml";

/// Fault injection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultInjectionConfig {
    /// Off in production; turn on to exercise client retry handling
    pub enabled: bool,

    /// Every nth call of each guarded operation fails
    pub every_nth_call: u64,
}

impl Default for FaultInjectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            every_nth_call: 3,
        }
    }
}

impl FaultInjectionConfig {
    pub fn build(&self) -> Result<FaultInjector> {
        if !self.enabled {
            return Ok(FaultInjector::disabled());
        }
        FaultInjector::every_nth_call(self.every_nth_call)
    }
}

/// Top-level controller settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub fault_injection: FaultInjectionConfig,

    /// Broadcast buffer per event subscriber
    pub event_buffer_size: usize,

    /// Start with the demo fleet instead of empty stores
    pub seed_demo_data: bool,

    /// Fallback log filter when RUST_LOG is not set
    pub log_level: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            fault_injection: FaultInjectionConfig::default(),
            event_buffer_size: DEFAULT_EVENT_BUFFER,
            seed_demo_data: false,
            log_level: "info".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load defaults, the config file and the environment.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let builder = Self::defaults()?
            .add_source(file)
            .add_source(
                Environment::with_prefix("CONTROLLER")
                    .separator("__")
                    .try_parsing(true),
            );

        Self::finish(builder)
    }

    /// Defaults overlaid with an inline TOML document
    pub fn from_toml(toml: &str) -> Result<Self> {
        let builder = Self::defaults()?.add_source(File::from_str(toml, FileFormat::Toml));
        Self::finish(builder)
    }

    fn defaults() -> Result<ConfigBuilder<::config::builder::DefaultState>> {
        let defaults = Self::default();
        Ok(Config::builder()
            .set_default("fault_injection.enabled", defaults.fault_injection.enabled)?
            .set_default(
                "fault_injection.every_nth_call",
                defaults.fault_injection.every_nth_call,
            )?
            .set_default("event_buffer_size", defaults.event_buffer_size as u64)?
            .set_default("seed_demo_data", defaults.seed_demo_data)?
            .set_default("log_level", defaults.log_level)?)
    }

    fn finish(builder: ConfigBuilder<::config::builder::DefaultState>) -> Result<Self> {
        let config: ControllerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fault_injection.enabled && self.fault_injection.every_nth_call == 0 {
            return Err(ControllerError::InvalidArgument(
                "fault_injection.every_nth_call must be at least 1".to_string(),
            ));
        }
        if self.event_buffer_size == 0 {
            return Err(ControllerError::InvalidArgument(
                "event_buffer_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::faults::GuardedOperation;

    #[test]
    fn test_defaults_disable_fault_injection() {
        let config = ControllerConfig::from_toml("").unwrap();
        assert_eq!(config, ControllerConfig::default());

        let injector = config.fault_injection.build().unwrap();
        assert!(!injector.is_enabled());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let config = ControllerConfig::from_toml(
            r#"
            seed_demo_data = true
            event_buffer_size = 64

            [fault_injection]
            enabled = true
            every_nth_call = 2
            "#,
        )
        .unwrap();

        assert!(config.seed_demo_data);
        assert_eq!(config.event_buffer_size, 64);
        assert_eq!(config.log_level, "info");

        let injector = config.fault_injection.build().unwrap();
        assert!(!injector.tick(GuardedOperation::ScanNow).will_fail());
        assert!(injector.tick(GuardedOperation::ScanNow).will_fail());
    }

    #[test]
    fn test_zero_modulus_is_rejected_when_enabled() {
        let err = ControllerConfig::from_toml(
            r#"
            [fault_injection]
            enabled = true
            every_nth_call = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ControllerError::InvalidArgument(_)));
    }
}
