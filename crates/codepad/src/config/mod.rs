use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::toolchain::{
    BuildStep, DEFAULT_BINARY_NAME, DEFAULT_ENTRY_SYMBOL, EntrySymbolConfig, FileExtension,
    Placeholders, PreflightConfig, RunConfig, Toolchain,
};

pub(crate) mod loader;
pub mod toolchain;

/// Upper bound, in seconds, for every configured duration
pub const MAX_SECONDS: f64 = 86_400.0;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../codepad.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid characters in file extension")]
    InvalidFileExtChars,

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid entry symbol pattern for '{id}': {source}")]
    Pattern {
        id: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for codepad
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory under which per-request workspaces are created
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    /// Wall-clock deadline in seconds for the build and run steps of one request
    #[serde(default = "default_timeout")]
    pub timeout: f64,

    /// Deadline in seconds for a toolchain preflight check
    #[serde(default = "default_preflight_timeout")]
    pub preflight_timeout: f64,

    /// Time in seconds to wait for a killed process group to be reaped
    #[serde(default = "default_kill_grace")]
    pub kill_grace: f64,

    /// Maximum bytes kept per output stream; the rest is discarded
    #[serde(default = "default_max_output")]
    pub max_output: usize,

    /// Toolchain configurations keyed by language ID
    #[serde(default)]
    pub toolchains: HashMap<String, Toolchain>,
}

impl Config {
    /// Create a new config with embedded default toolchains
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no toolchains
    pub fn empty() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            timeout: default_timeout(),
            preflight_timeout: default_preflight_timeout(),
            kill_grace: default_kill_grace(),
            max_output: default_max_output(),
            toolchains: HashMap::new(),
        }
    }

    /// Execution deadline for one request
    pub fn deadline(&self) -> Duration {
        seconds(self.timeout)
    }

    /// Deadline for a single preflight check
    pub fn preflight_deadline(&self) -> Duration {
        seconds(self.preflight_timeout)
    }

    /// Grace period for reaping a killed process group
    pub fn kill_grace(&self) -> Duration {
        seconds(self.kill_grace)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

fn default_workspace_root() -> PathBuf {
    std::env::temp_dir().join("codepad")
}

fn default_timeout() -> f64 {
    5.0
}

fn default_preflight_timeout() -> f64 {
    10.0
}

fn default_kill_grace() -> f64 {
    1.0
}

fn default_max_output() -> usize {
    1024 * 1024
}
