use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pipeline::{ArtifactPath, Workspace, WorkspaceError};
use tokio::fs;
use tracing::debug;

use crate::LAYOUT;

/// A workspace rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct FsWorkspace {
    root: PathBuf,
}

impl FsWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of `path` under the root.
    pub fn resolve(&self, path: &ArtifactPath) -> PathBuf {
        path.segments().fold(self.root.clone(), |acc, segment| acc.join(segment))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> WorkspaceError {
    WorkspaceError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl Workspace for FsWorkspace {
    async fn initialize(&self) -> Result<(), WorkspaceError> {
        for dir in LAYOUT {
            let path = self.root.join(dir);
            fs::create_dir_all(&path).await.map_err(|e| io_error(&path, e))?;
        }
        debug!(root = %self.root.display(), "Workspace initialised");
        Ok(())
    }

    async fn write(&self, path: &ArtifactPath, content: &str) -> Result<(), WorkspaceError> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await.map_err(|e| io_error(parent, e))?;
        }
        fs::write(&full, content).await.map_err(|e| io_error(&full, e))
    }

    async fn read(&self, path: &ArtifactPath) -> Result<Option<String>, WorkspaceError> {
        let full = self.resolve(path);
        match fs::read(&full).await {
            Ok(bytes) => String::from_utf8(bytes).map(Some).map_err(|_| {
                WorkspaceError::InvalidEncoding {
                    path: path.to_string(),
                }
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&full, e)),
        }
    }
}
