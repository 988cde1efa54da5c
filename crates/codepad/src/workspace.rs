//! Per-request workspaces
//!
//! Every execution gets its own directory under the workspace root, named by
//! a random UUID. The directory holds the submitted source and whatever the
//! build steps produce, and is removed when the execution ends.

use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::Placeholders;

/// Attempts at finding an unused workspace name before giving up
const CREATE_ATTEMPTS: usize = 3;

/// Errors that occur while preparing a workspace
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create workspace at {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write source to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove {path}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Allocates workspaces under a common root directory
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Create a manager rooted at `root`
    ///
    /// A relative root is resolved against the current directory, since steps
    /// run with the workspace as their working directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    /// Get the root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if it does not exist yet
    pub async fn prepare(&self) -> Result<(), WorkspaceError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| WorkspaceError::Create {
                path: self.root.clone(),
                source,
            })
    }

    /// Allocate a fresh, empty workspace
    ///
    /// `source_name` and `binary_name` are file names inside the workspace.
    /// The directory is created with `create_dir`, so a name that is already
    /// taken is never shared with another request.
    #[instrument(skip(self))]
    pub async fn create(
        &self,
        source_name: &str,
        binary_name: &str,
        symbol: &str,
    ) -> Result<Workspace, WorkspaceError> {
        validate_file_name(source_name)?;
        validate_file_name(binary_name)?;
        self.prepare().await?;

        let mut last_error = None;
        for _ in 0..CREATE_ATTEMPTS {
            let id = Uuid::new_v4();
            let dir = self.root.join(id.to_string());
            match tokio::fs::create_dir(&dir).await {
                Ok(()) => {
                    debug!(%id, ?dir, "workspace created");
                    return Workspace::new(id, dir, source_name, binary_name, symbol);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    warn!(%id, "workspace name already taken, retrying");
                    last_error = Some(WorkspaceError::Create { path: dir, source: e });
                }
                Err(source) => return Err(WorkspaceError::Create { path: dir, source }),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            WorkspaceError::InvalidPath("no workspace name available".to_owned())
        }))
    }
}

/// An ephemeral directory owned by a single execution
///
/// # Cleanup
///
/// Call [`destroy()`](Self::destroy) when the execution ends. If the
/// workspace is dropped first (a panic, or the owning future being dropped),
/// the `Drop` implementation removes it synchronously.
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    dir: PathBuf,
    source_path: PathBuf,
    binary_path: PathBuf,
    symbol: String,
    artifacts: Vec<PathBuf>,

    // UTF-8 forms of the paths above, used for placeholder expansion
    dir_str: String,
    source_str: String,
    binary_str: String,

    active: bool,
}

impl Workspace {
    fn new(
        id: Uuid,
        dir: PathBuf,
        source_name: &str,
        binary_name: &str,
        symbol: &str,
    ) -> Result<Self, WorkspaceError> {
        let source_path = dir.join(source_name);
        let binary_path = dir.join(binary_name);

        // Build the workspace before checking the paths so a failure still
        // removes the directory on drop
        let mut workspace = Self {
            id,
            dir,
            source_path,
            binary_path,
            symbol: symbol.to_owned(),
            artifacts: Vec::new(),
            dir_str: String::new(),
            source_str: String::new(),
            binary_str: String::new(),
            active: true,
        };
        workspace.dir_str = utf8(&workspace.dir)?;
        workspace.source_str = utf8(&workspace.source_path)?;
        workspace.binary_str = utf8(&workspace.binary_path)?;
        Ok(workspace)
    }

    /// Get the workspace identity
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the workspace directory
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Get the path of the source file
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Get the path of the build output
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Get the entry symbol this workspace was created for
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Get the recorded build artifacts
    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    /// Check if the workspace has not been destroyed yet
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Placeholder values for command expansion
    pub fn placeholders(&self) -> Placeholders<'_> {
        Placeholders {
            source: &self.source_str,
            dir: &self.dir_str,
            binary: &self.binary_str,
            symbol: &self.symbol,
        }
    }

    /// Record a path created during the build so it is removed with the workspace
    ///
    /// Relative paths are taken relative to the workspace directory. Paths that
    /// would leave the workspace are rejected.
    pub fn record_artifact(&mut self, path: impl AsRef<Path>) -> Result<(), WorkspaceError> {
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.dir.join(path)
        };

        let escapes = path
            .components()
            .any(|c| matches!(c, Component::ParentDir));
        if escapes || !path.starts_with(&self.dir) || path == self.dir {
            return Err(WorkspaceError::InvalidPath(format!(
                "artifact outside workspace: {}",
                path.display()
            )));
        }

        if !self.artifacts.contains(&path) {
            self.artifacts.push(path);
        }
        Ok(())
    }

    /// Write the submitted source text
    #[instrument(skip(self, text), fields(id = %self.id))]
    pub async fn write_source(&self, text: &str) -> Result<(), WorkspaceError> {
        tokio::fs::write(&self.source_path, text)
            .await
            .map_err(|source| WorkspaceError::Write {
                path: self.source_path.clone(),
                source,
            })?;
        debug!(path = ?self.source_path, len = text.len(), "wrote source");
        Ok(())
    }

    /// Remove the source, every recorded artifact and the directory
    ///
    /// Idempotent. Failures are logged and never returned.
    #[instrument(skip(self), fields(id = %self.id))]
    pub async fn destroy(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        let mut failures = 0usize;
        for path in std::iter::once(&self.source_path).chain(&self.artifacts) {
            if let Err(source) = remove_path(path).await {
                failures += 1;
                let err = WorkspaceError::Cleanup {
                    path: path.clone(),
                    source,
                };
                warn!(error = %err, "workspace cleanup failed");
            }
        }

        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                failures += 1;
                let err = WorkspaceError::Cleanup {
                    path: self.dir.clone(),
                    source,
                };
                warn!(error = %err, "workspace cleanup failed");
            }
        }

        if failures == 0 {
            debug!("workspace destroyed");
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.active {
            return;
        }

        warn!(
            id = %self.id,
            dir = %self.dir.display(),
            "workspace dropped without destroy, removing synchronously"
        );

        if let Err(e) = std::fs::remove_dir_all(&self.dir)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!(id = %self.id, error = %e, "workspace cleanup on drop failed");
        }
    }
}

async fn remove_path(path: &Path) -> io::Result<()> {
    let result = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn validate_file_name(name: &str) -> Result<(), WorkspaceError> {
    // Reject anything that is not a plain file name
    if name.is_empty() || name.contains('/') || name.contains('\\') || name == "." || name == ".."
    {
        return Err(WorkspaceError::InvalidPath(format!(
            "not a plain file name: {name:?}"
        )));
    }
    Ok(())
}

fn utf8(path: &Path) -> Result<String, WorkspaceError> {
    path.to_str()
        .map(str::to_owned)
        .ok_or_else(|| WorkspaceError::InvalidPath(format!("non UTF-8 path: {}", path.display())))
}
