//! Command builder for build and run steps

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::executor::ExecutorError;

/// An argument vector plus the process settings it runs with
///
/// The first element is the program; it is resolved through `PATH` by the
/// operating system. Arguments are passed as-is, there is no shell involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCommand {
    argv: Vec<String>,
    current_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
}

impl StepCommand {
    /// Create a new command from an argument vector
    pub fn new(argv: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            current_dir: None,
            env: BTreeMap::new(),
        }
    }

    /// Set the working directory
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Set an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set several environment variables
    pub fn envs<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Get the full argument vector
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Get the program name
    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    /// Get the working directory
    pub fn working_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Build a tokio command in its own process group with piped output
    pub(crate) fn build(&self) -> Result<Command, ExecutorError> {
        let (program, args) = self.argv.split_first().ok_or(ExecutorError::EmptyCommand)?;

        let mut command = Command::new(program);
        command
            .args(args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .process_group(0);
        if let Some(ref dir) = self.current_dir {
            command.current_dir(dir);
        }
        Ok(command)
    }
}

impl std::fmt::Display for StepCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, arg) in self.argv.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{arg:?}")?;
        }
        Ok(())
    }
}
