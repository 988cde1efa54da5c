//! Configuration file loading for codepad
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;
use std::time::Duration;

use config::{Config as ConfigBuilder, File, FileFormat};
use regex::Regex;

use crate::config::{Config, ConfigError, MAX_SECONDS};

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Called by the loaders; call it again after changing fields by hand.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("timeout", self.timeout),
            ("preflight_timeout", self.preflight_timeout),
            ("kill_grace", self.kill_grace),
        ] {
            let representable = Duration::try_from_secs_f64(value).is_ok();
            if !representable || value <= 0.0 || value > MAX_SECONDS {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a positive number of seconds, at most {MAX_SECONDS}"
                )));
            }
        }

        for (id, toolchain) in &self.toolchains {
            if toolchain.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "toolchain '{id}' has empty name"
                )));
            }
            if toolchain.extension.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "toolchain '{id}' has empty extension"
                )));
            }
            if toolchain.run.command.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "toolchain '{id}' has empty run command"
                )));
            }
            if toolchain.build.iter().any(|step| step.command.is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "toolchain '{id}' has empty build command"
                )));
            }
            if let Some(ref preflight) = toolchain.preflight
                && preflight.command.is_empty()
            {
                return Err(ConfigError::Invalid(format!(
                    "toolchain '{id}' has empty preflight command"
                )));
            }
            if let Some(ref entry) = toolchain.entry_symbol {
                compile_entry_pattern(id, &entry.pattern)?;
            }
        }

        Ok(())
    }
}

/// Compile an entry symbol pattern, requiring a capture group for the symbol
pub(crate) fn compile_entry_pattern(id: &str, pattern: &str) -> Result<Regex, ConfigError> {
    let regex = Regex::new(pattern).map_err(|source| ConfigError::Pattern {
        id: id.to_owned(),
        source,
    })?;
    if regex.captures_len() < 2 {
        return Err(ConfigError::Invalid(format!(
            "entry symbol pattern for '{id}' has no capture group"
        )));
    }
    Ok(regex)
}
