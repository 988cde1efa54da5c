use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;

const INVALID_FILE_EXT_CHARS: [char; 2] = ['/', '.'];

/// Entry symbol used when the source declares none the pattern can find
pub const DEFAULT_ENTRY_SYMBOL: &str = "Main";

/// Name of the build output for toolchains that produce a native binary
pub const DEFAULT_BINARY_NAME: &str = "main";

/// Configuration for a language toolchain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Toolchain {
    /// Human-readable name for the toolchain (e.g., "C++ (GCC)")
    pub name: String,

    /// File extension
    pub extension: FileExtension,

    /// Source file name inside the workspace, may contain `{symbol}`
    ///
    /// Defaults to `main.<extension>`.
    #[serde(default)]
    pub source_name: Option<String>,

    /// Build output name inside the workspace
    #[serde(default = "default_binary_name")]
    pub binary_name: String,

    /// Entry symbol extraction (None when the toolchain needs no entry symbol)
    #[serde(default)]
    pub entry_symbol: Option<EntrySymbolConfig>,

    /// Check that the toolchain is installed before any workspace is created
    #[serde(default)]
    pub preflight: Option<PreflightConfig>,

    /// Build steps, run in order (empty for interpreted languages)
    #[serde(default)]
    pub build: Vec<BuildStep>,

    /// Execution configuration
    pub run: RunConfig,
}

impl Toolchain {
    /// Check if the toolchain has a build phase
    pub fn is_compiled(&self) -> bool {
        !self.build.is_empty()
    }

    /// Get the source file name for the given entry symbol
    pub fn source_name(&self, symbol: &str) -> String {
        match self.source_name {
            Some(ref name) => name.replace("{symbol}", symbol),
            None => format!("main.{}", self.extension),
        }
    }

    /// Expand placeholders in every argument of the given command
    ///
    /// Each argument is expanded on its own; the result is handed to the
    /// program as an argument vector and never re-split or interpreted by a
    /// shell.
    pub fn expand_command(command: &[String], placeholders: &Placeholders<'_>) -> Vec<String> {
        command
            .iter()
            .map(|arg| placeholders.expand(arg))
            .collect()
    }
}

/// Values substituted into command arguments and artifact names
#[derive(Debug, Clone, Copy)]
pub struct Placeholders<'a> {
    /// `{source}`: absolute path of the source file
    pub source: &'a str,
    /// `{dir}`: absolute path of the workspace directory
    pub dir: &'a str,
    /// `{binary}`: absolute path of the build output
    pub binary: &'a str,
    /// `{symbol}`: extracted entry symbol
    pub symbol: &'a str,
}

impl Placeholders<'_> {
    /// Substitute every placeholder in one pass
    ///
    /// Substituted values are never scanned again, so a path that happens to
    /// contain `{symbol}` is kept as-is. Unknown `{...}` text is left alone.
    pub fn expand(&self, arg: &str) -> String {
        let mut out = String::with_capacity(arg.len());
        let mut rest = arg;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            match self.value_at(tail) {
                Some((value, len)) => {
                    out.push_str(value);
                    rest = &tail[len..];
                }
                None => {
                    out.push('{');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn value_at(&self, tail: &str) -> Option<(&str, usize)> {
        [
            ("{source}", self.source),
            ("{dir}", self.dir),
            ("{binary}", self.binary),
            ("{symbol}", self.symbol),
        ]
        .into_iter()
        .find(|(name, _)| tail.starts_with(name))
        .map(|(name, value)| (value, name.len()))
    }
}

/// File extension without dot (e.g., "cpp")
#[derive(Debug, Clone, Serialize)]
pub struct FileExtension(String);

impl FileExtension {
    pub fn new(extension: &str) -> Result<Self, ConfigError> {
        let contains_invalid = extension
            .chars()
            .any(|c| INVALID_FILE_EXT_CHARS.contains(&c));
        if contains_invalid {
            return Err(ConfigError::InvalidFileExtChars);
        }
        Ok(Self(extension.to_owned()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for FileExtension {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileExtension::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a file extension without '/' or '.' characters",
            )
        })
    }
}

impl std::fmt::Display for FileExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Entry symbol extraction for toolchains that locate the program's starting
/// point by name (e.g., a JVM public class)
///
/// The pattern is a heuristic. Source with several types or an obfuscated
/// declaration can yield the wrong name; the compiler then reports the
/// mismatch and that diagnostic reaches the caller unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySymbolConfig {
    /// Regex whose first capture group is the symbol
    pub pattern: String,

    /// Symbol used when the pattern finds nothing
    #[serde(default = "default_entry_symbol")]
    pub default: String,
}

/// Toolchain availability check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightConfig {
    /// Command that must exit successfully (e.g., `["g++", "--version"]`)
    pub command: Vec<String>,

    /// Error reported when the check fails
    pub message: String,

    /// Installation guidance returned alongside the error
    #[serde(default)]
    pub remediation: String,
}

/// A single build step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStep {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {dir}, {binary}, {symbol}
    pub command: Vec<String>,

    /// Files this step creates in the workspace, removed with it
    #[serde(default)]
    pub artifacts: Vec<String>,

    /// Environment variables to set during the step
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Configuration for the execution step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {dir}, {binary}, {symbol}
    pub command: Vec<String>,

    /// Environment Variables to set
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_binary_name() -> String {
    DEFAULT_BINARY_NAME.to_owned()
}

fn default_entry_symbol() -> String {
    DEFAULT_ENTRY_SYMBOL.to_owned()
}
