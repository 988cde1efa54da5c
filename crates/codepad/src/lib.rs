//! A library for time-bounded execution of submitted source code.
//!
//! codepad takes a language identifier and source text, builds and runs the
//! program with the locally installed toolchain, and returns the captured
//! output as a classified outcome.
//!
//! # Features
//!
//! - **Multi-language** — Interpreted, compiled, and compiled-then-run toolchains from TOML configuration.
//! - **Per-request workspaces** — Each execution gets its own UUID-named directory, removed on every exit path.
//! - **Deadlines** — One wall-clock bound covers build and run; on expiry the whole process group is killed.
//! - **No shell** — Commands are argument vectors with per-argument placeholder expansion.
//! - **Preflight checks** — Missing toolchains are reported with installation guidance before any file is written.
//! - **Transport-ready responses** — Outcomes map to a status code and a JSON payload.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Toolchain};
pub use executor::{
    ExecutionOutcome, ExecutorError, Preflight, ProcessExecutor, Step, StepCommand, StepKind,
};
pub use registry::{NotSupportedError, ToolchainRegistry, ToolchainSpec};
pub use report::{Response, ResponsePayload, classify};
pub use runner::{DispatchRequest, ExecutionRequest, RunError, Runner};
pub use workspace::{Workspace, WorkspaceError, WorkspaceManager};

pub mod config;
pub mod executor;
pub mod registry;
pub mod report;
pub mod runner;
pub mod workspace;
