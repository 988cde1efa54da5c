//! Code runner for codepad
//!
//! Sequences one execution: toolchain lookup, preflight, workspace, build and
//! run steps, cleanup.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub use crate::runner::dispatch::DispatchRequest;

mod dispatch;

use crate::config::{Config, ConfigError};
use crate::executor::{ExecutionOutcome, ExecutorError, Preflight, ProcessExecutor};
use crate::registry::{NotSupportedError, ToolchainRegistry, ToolchainSpec};
use crate::workspace::{Workspace, WorkspaceError, WorkspaceManager};

/// Source code to run with a given language's toolchain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// Language ID, one of the registry keys
    pub language: String,
    /// Submitted source text
    pub source: String,
}

impl ExecutionRequest {
    pub fn new(language: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            source: source.into(),
        }
    }
}

/// Errors that prevent an execution from producing an outcome
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    NotSupported(#[from] NotSupportedError),

    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("execution task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// High-level runner for code execution
///
/// Cheap to clone; clones share the configuration and the registry.
#[derive(Debug, Clone)]
pub struct Runner {
    config: Arc<Config>,
    registry: Arc<ToolchainRegistry>,
    workspaces: WorkspaceManager,
    executor: ProcessExecutor,
}

impl Runner {
    /// Create a new runner with the given configuration
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let registry = ToolchainRegistry::from_config(&config)?;
        Ok(Self {
            workspaces: WorkspaceManager::new(config.workspace_root.clone()),
            executor: ProcessExecutor::from_config(&config),
            registry: Arc::new(registry),
            config: Arc::new(config),
        })
    }

    /// Create a new runner with default configuration
    pub fn with_defaults() -> Self {
        Self::new(Config::default()).expect("embedded default config should be valid")
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the toolchain registry
    pub fn registry(&self) -> &ToolchainRegistry {
        &self.registry
    }

    /// Get the workspace manager
    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Create the workspace root ahead of the first request
    pub async fn prepare(&self) -> Result<(), WorkspaceError> {
        self.workspaces.prepare().await
    }

    /// Run a toolchain's preflight check
    ///
    /// Toolchains without a check always pass.
    pub async fn check(&self, spec: &ToolchainSpec) -> Preflight {
        match spec.preflight_command() {
            Some(command) => {
                self.executor
                    .preflight(&command, self.config.preflight_deadline())
                    .await
            }
            None => Preflight::Passed,
        }
    }

    /// Execute a request and return its classified outcome
    ///
    /// An unknown language is rejected before anything touches the
    /// filesystem, and a failed preflight before any workspace is created.
    /// Once created, the workspace is destroyed on every path out of this
    /// function; if the future is dropped mid-flight, the workspace's `Drop`
    /// removes it instead.
    #[instrument(skip(self, request), fields(language = %request.language))]
    pub async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutcome, RunError> {
        let spec = self.registry.lookup(&request.language)?;

        if let Preflight::Failed(detail) = self.check(spec).await {
            warn!(%detail, "preflight check failed");
            let preflight = spec.preflight();
            return Ok(ExecutionOutcome::PreflightFailed {
                reason: preflight.map(|p| p.message.clone()).unwrap_or(detail),
                remediation: preflight.map(|p| p.remediation.clone()).unwrap_or_default(),
            });
        }

        let symbol = spec.extract_symbol(&request.source);
        let mut workspace = self
            .workspaces
            .create(&spec.source_name(&symbol), spec.binary_name(), &symbol)
            .await?;
        debug!(id = %workspace.id(), %symbol, "workspace ready");

        let result = self.run_in(spec, &mut workspace, &request.source).await;
        workspace.destroy().await;

        let outcome = result?;
        info!(outcome = outcome.kind(), "execution finished");
        Ok(outcome)
    }

    async fn run_in(
        &self,
        spec: &ToolchainSpec,
        workspace: &mut Workspace,
        source: &str,
    ) -> Result<ExecutionOutcome, RunError> {
        workspace.write_source(source).await?;
        let steps = spec.plan(workspace)?;
        let outcome = self.executor.run(&steps, self.config.deadline()).await?;
        Ok(outcome)
    }
}
