//! Artifact persistence.
//!
//! Artifacts are pretty-printed JSON documents under `docs/<name>.json`.
//! Every artifact is a mapping: reply text that was not structured data
//! reaches here already wrapped as `{"response": text}` with its token counts.
//! Persisting is best-effort: a failure is logged and the pipeline carries on.
//! Materialising generated project files is not; a file that cannot be written
//! is a [`CrewForgeError::WorkspaceFailure`].

use std::sync::Arc;

use pipeline::{ArtifactPath, CrewForgeError, GeneratedFiles, Workspace};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

/// Writes artifacts and generated files into a [`Workspace`].
#[derive(Clone)]
pub struct ArtifactStore {
    workspace: Arc<dyn Workspace>,
}

impl ArtifactStore {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        Self { workspace }
    }

    /// Persists `doc` as `docs/<name>.json`. Returns the path on success.
    pub async fn persist(&self, name: &str, doc: &Map<String, Value>) -> Option<ArtifactPath> {
        match serde_json::to_string_pretty(doc) {
            Ok(text) => self.write_artifact(name, &text).await,
            Err(e) => {
                error!(artifact = name, error = %e, "Failed to serialise artifact");
                None
            }
        }
    }

    /// Writes every generated file; returns how many were written.
    pub async fn materialize(&self, files: &GeneratedFiles) -> Result<usize, CrewForgeError> {
        for rejected in &files.rejected {
            warn!(path = %rejected, "Skipping generated file outside the workspace");
        }
        for (path, content) in &files.files {
            self.workspace
                .write(path, content)
                .await
                .map_err(|e| CrewForgeError::WorkspaceFailure {
                    path: path.to_string(),
                    message: e.to_string(),
                })?;
            debug!(path = %path, bytes = content.len(), "Wrote generated file");
        }
        Ok(files.files.len())
    }

    async fn write_artifact(&self, name: &str, body: &str) -> Option<ArtifactPath> {
        let path = ArtifactPath::document(name);
        match self.workspace.write(&path, body).await {
            Ok(()) => {
                debug!(artifact = %path, "Persisted artifact");
                Some(path)
            }
            Err(e) => {
                error!(artifact = %path, error = %e, "Failed to persist artifact");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{ActionOutcome, ActionResult, TokenUsage};
    use serde_json::json;
    use workspace::MemoryWorkspace;

    fn store() -> (ArtifactStore, Arc<MemoryWorkspace>) {
        let ws = Arc::new(MemoryWorkspace::new());
        (ArtifactStore::new(ws.clone()), ws)
    }

    async fn read_back(ws: &MemoryWorkspace, action: &str, name: &str) -> Result<ActionResult, CrewForgeError> {
        let text = ws.read(&ArtifactPath::document(name)).await.unwrap().unwrap();
        match serde_json::from_str::<Value>(&text).unwrap() {
            Value::Object(doc) => ActionResult::from_document(action, doc),
            other => panic!("artifact {} is not a mapping: {}", name, other),
        }
    }

    #[tokio::test]
    async fn test_persisted_result_reads_back_equal() {
        let (store, ws) = store();
        let result = ActionResult::new(
            ActionOutcome::Structured(json!({"review": {"approved": true, "issues": []}}).as_object().unwrap().clone()),
            TokenUsage::reported(321, 45),
        );
        let path = store.persist("review_search", &result.to_document()).await.unwrap();
        assert_eq!(path.as_str(), "docs/review_search.json");

        assert_eq!(read_back(&ws, "ReviewCode", "review_search").await.unwrap(), result);
    }

    #[tokio::test]
    async fn test_unstructured_reply_is_stored_as_a_mapping() {
        let (store, ws) = store();
        let result = ActionResult::new(
            ActionOutcome::Raw("plain words".into()),
            TokenUsage::estimated("a prompt", "plain words"),
        );
        store.persist("notes", &result.to_document()).await.unwrap();

        let text = ws.read(&ArtifactPath::document("notes")).await.unwrap().unwrap();
        assert!(text.starts_with('{'));
        assert!(text.contains("\"response\": \"plain words\""));
        assert_eq!(read_back(&ws, "ImplementFeature", "notes").await.unwrap(), result);
    }

    #[tokio::test]
    async fn test_artifact_without_usage_fails_loudly() {
        let (store, ws) = store();
        store
            .persist("requirements_analysis", json!({"specification": {}}).as_object().unwrap())
            .await
            .unwrap();
        let err = read_back(&ws, "AnalyzeRequirements", "requirements_analysis")
            .await
            .unwrap_err();
        assert!(matches!(err, CrewForgeError::MissingTokenAccounting { .. }));
    }

    #[tokio::test]
    async fn test_materialize_skips_rejected_paths() {
        let (store, ws) = store();
        let doc = json!({"implementation": {"files": {"src/a.rs": "a", "/etc/passwd": "x"}}});
        let files = GeneratedFiles::at(doc.as_object().unwrap(), "/implementation/files");
        assert_eq!(store.materialize(&files).await.unwrap(), 1);
        assert_eq!(
            ws.read(&ArtifactPath::new("src/a.rs").unwrap()).await.unwrap().as_deref(),
            Some("a")
        );
    }
}
