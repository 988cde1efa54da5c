//! Toolchain registry
//!
//! Built once from the configuration and shared read-only by every request.

use std::collections::BTreeMap;

use regex::Regex;
use thiserror::Error;

use crate::config::loader::compile_entry_pattern;
use crate::config::{Config, ConfigError, DEFAULT_ENTRY_SYMBOL, PreflightConfig, Toolchain};
use crate::executor::{Step, StepCommand};
use crate::workspace::{Workspace, WorkspaceError};

/// The requested language has no registered toolchain
#[derive(Debug, Error)]
#[error("language '{0}' is not supported")]
pub struct NotSupportedError(pub String);

/// A registered toolchain, ready to plan executions
#[derive(Debug, Clone)]
pub struct ToolchainSpec {
    id: String,
    toolchain: Toolchain,
    entry_pattern: Option<Regex>,
}

impl ToolchainSpec {
    /// Create a spec from a toolchain configuration
    pub fn new(id: impl Into<String>, toolchain: Toolchain) -> Result<Self, ConfigError> {
        let id = id.into();
        let entry_pattern = match toolchain.entry_symbol {
            Some(ref entry) => Some(compile_entry_pattern(&id, &entry.pattern)?),
            None => None,
        };
        Ok(Self {
            id,
            toolchain,
            entry_pattern,
        })
    }

    /// Get the language ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the human-readable name
    pub fn name(&self) -> &str {
        &self.toolchain.name
    }

    /// Get the underlying configuration
    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    /// Get the preflight check, if the toolchain has one
    pub fn preflight(&self) -> Option<&PreflightConfig> {
        self.toolchain.preflight.as_ref()
    }

    /// Build the preflight command
    pub fn preflight_command(&self) -> Option<StepCommand> {
        self.preflight()
            .map(|preflight| StepCommand::new(preflight.command.iter().cloned()))
    }

    /// Extract the entry symbol from source text
    ///
    /// Uses the first capture of the configured pattern. Falls back to the
    /// configured default when the pattern finds nothing or captures
    /// something that is not a plain identifier. Toolchains without an entry
    /// symbol get [`DEFAULT_ENTRY_SYMBOL`].
    pub fn extract_symbol(&self, source: &str) -> String {
        let Some(entry) = self.toolchain.entry_symbol.as_ref() else {
            return DEFAULT_ENTRY_SYMBOL.to_owned();
        };

        self.entry_pattern
            .as_ref()
            .and_then(|pattern| pattern.captures(source))
            .and_then(|captures| captures.get(1))
            .map(|symbol| symbol.as_str())
            .filter(|symbol| is_identifier(symbol))
            .unwrap_or(entry.default.as_str())
            .to_owned()
    }

    /// Source file name for the given entry symbol
    pub fn source_name(&self, symbol: &str) -> String {
        self.toolchain.source_name(symbol)
    }

    /// Build output file name
    pub fn binary_name(&self) -> &str {
        &self.toolchain.binary_name
    }

    /// Expand the build steps for a workspace
    ///
    /// Declared artifacts are recorded on the workspace before anything runs,
    /// so they are removed even if a build step is interrupted.
    pub fn build_steps(&self, workspace: &mut Workspace) -> Result<Vec<Step>, WorkspaceError> {
        let mut steps = Vec::with_capacity(self.toolchain.build.len());
        let mut artifacts = Vec::new();
        {
            let placeholders = workspace.placeholders();
            for build in &self.toolchain.build {
                let argv = Toolchain::expand_command(&build.command, &placeholders);
                let command = StepCommand::new(argv)
                    .current_dir(workspace.path())
                    .envs(build.env.iter().map(|(k, v)| (k.clone(), v.clone())));
                steps.push(Step::build(command));
                artifacts.extend(build.artifacts.iter().map(|a| placeholders.expand(a)));
            }
        }

        for artifact in artifacts {
            workspace.record_artifact(artifact)?;
        }
        Ok(steps)
    }

    /// Run argument vector for a workspace
    pub fn run_command(&self, workspace: &Workspace) -> Vec<String> {
        Toolchain::expand_command(&self.toolchain.run.command, &workspace.placeholders())
    }

    /// Expand the run step for a workspace
    pub fn run_step(&self, workspace: &Workspace) -> Step {
        let run = &self.toolchain.run;
        let command = StepCommand::new(self.run_command(workspace))
            .current_dir(workspace.path())
            .envs(run.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        Step::run(command)
    }

    /// Build steps followed by the run step
    pub fn plan(&self, workspace: &mut Workspace) -> Result<Vec<Step>, WorkspaceError> {
        let mut steps = self.build_steps(workspace)?;
        steps.push(self.run_step(workspace));
        Ok(steps)
    }
}

/// Immutable table of toolchains keyed by language ID
#[derive(Debug, Clone, Default)]
pub struct ToolchainRegistry {
    toolchains: BTreeMap<String, ToolchainSpec>,
}

impl ToolchainRegistry {
    /// Build the registry from a configuration
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let toolchains = config
            .toolchains
            .iter()
            .map(|(id, toolchain)| {
                ToolchainSpec::new(id.clone(), toolchain.clone()).map(|spec| (id.clone(), spec))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { toolchains })
    }

    /// Look up the toolchain for a language
    pub fn lookup(&self, language: &str) -> Result<&ToolchainSpec, NotSupportedError> {
        self.toolchains
            .get(language)
            .ok_or_else(|| NotSupportedError(language.to_owned()))
    }

    /// Registered language IDs, sorted
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.toolchains.keys().map(String::as_str)
    }

    /// Registered toolchains, sorted by language ID
    pub fn iter(&self) -> impl Iterator<Item = &ToolchainSpec> {
        self.toolchains.values()
    }

    pub fn len(&self) -> usize {
        self.toolchains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toolchains.is_empty()
    }
}

fn is_identifier(symbol: &str) -> bool {
    let mut chars = symbol.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}
