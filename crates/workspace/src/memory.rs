use std::collections::BTreeMap;

use async_trait::async_trait;
use pipeline::{ArtifactPath, Workspace, WorkspaceError};
use tokio::sync::Mutex;

/// An in-memory workspace.
#[derive(Debug, Default)]
pub struct MemoryWorkspace {
    files: Mutex<BTreeMap<ArtifactPath, String>>,
    initialized: Mutex<bool>,
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored file.
    pub async fn snapshot(&self) -> BTreeMap<ArtifactPath, String> {
        self.files.lock().await.clone()
    }

    /// Paths under `prefix` (e.g. `"docs/"`), in order.
    pub async fn paths_under(&self, prefix: &str) -> Vec<String> {
        self.files
            .lock()
            .await
            .keys()
            .map(|p| p.to_string())
            .filter(|p| p.starts_with(prefix))
            .collect()
    }

    pub async fn is_initialized(&self) -> bool {
        *self.initialized.lock().await
    }
}

#[async_trait]
impl Workspace for MemoryWorkspace {
    async fn initialize(&self) -> Result<(), WorkspaceError> {
        *self.initialized.lock().await = true;
        Ok(())
    }

    async fn write(&self, path: &ArtifactPath, content: &str) -> Result<(), WorkspaceError> {
        self.files.lock().await.insert(path.clone(), content.to_string());
        Ok(())
    }

    async fn read(&self, path: &ArtifactPath) -> Result<Option<String>, WorkspaceError> {
        Ok(self.files.lock().await.get(path).cloned())
    }
}
