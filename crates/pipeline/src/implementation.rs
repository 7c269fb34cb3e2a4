//! Features, batches and produced implementations.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ActionResult, ArtifactPath, FeatureName};

/// Name of the Tech Lead's foundational implementation.
pub const CORE_FEATURE: &str = "core";

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

/// One feature extracted from a requirements analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: FeatureName,
    /// Whatever the analysis said about the feature (a mapping or a string).
    pub details: Value,
}

impl FeatureSpec {
    pub fn new(name: FeatureName, details: Value) -> Self {
        Self { name, details }
    }

    /// Reads a feature from a list entry: a bare name, or a mapping with
    /// `name` (or `title`, `feature`, `component`).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::new(FeatureName::new(s.trim())?, value.clone())),
            Value::Object(map) => {
                let name = ["name", "title", "feature", "component"]
                    .iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_str))?;
                Some(Self::new(FeatureName::new(name.trim())?, value.clone()))
            }
            _ => None,
        }
    }

    /// `true` for the foundational feature.
    ///
    /// Mappings are classified by their `type` tag, or by being named exactly
    /// "core" when untagged. Bare names count when "core" is one of their
    /// words (`core_models`, but not `Hardcore mode`).
    pub fn is_core(&self) -> bool {
        match &self.details {
            Value::Object(map) => match map.get("type").and_then(Value::as_str) {
                Some(tag) => tag.trim().eq_ignore_ascii_case(CORE_FEATURE),
                None => self.name.as_str().trim().eq_ignore_ascii_case(CORE_FEATURE),
            },
            _ => self
                .name
                .as_str()
                .split(|c: char| !c.is_alphanumeric())
                .any(|word| word.eq_ignore_ascii_case(CORE_FEATURE)),
        }
    }
}

/// Extracts the feature list from a requirements analysis document.
///
/// Looks under `specification` first, then at the top level, taking
/// `features` and falling back to `components`. A list of entries or a
/// mapping of name to details are both accepted. Duplicate names are dropped.
pub fn extract_features(analysis: &Map<String, Value>) -> Vec<FeatureSpec> {
    let scopes = [
        analysis.get("specification").and_then(Value::as_object),
        Some(analysis),
    ];
    let raw = scopes
        .into_iter()
        .flatten()
        .flat_map(|scope| ["features", "components"].into_iter().filter_map(move |k| scope.get(k)))
        .find(|v| match v {
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
            _ => false,
        });

    let features: Vec<FeatureSpec> = match raw {
        Some(Value::Array(items)) => items.iter().filter_map(FeatureSpec::from_value).collect(),
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(name, details)| {
                Some(FeatureSpec::new(FeatureName::new(name.trim())?, details.clone()))
            })
            .collect(),
        _ => Vec::new(),
    };

    let mut seen = HashSet::new();
    features
        .into_iter()
        .filter(|f| seen.insert(f.name.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

/// A slice of the feature backlog implemented together before integration
/// review. Never larger than the developer pool.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBatch {
    /// 1-based.
    pub number: u32,
    pub features: Vec<FeatureSpec>,
}

/// Splits `features` into consecutive batches of at most `pool_size`.
///
/// Yields `ceil(features.len() / pool_size)` batches; only the last may be
/// short. A zero pool size is treated as one.
pub fn partition_into_batches(features: Vec<FeatureSpec>, pool_size: usize) -> Vec<FeatureBatch> {
    let pool_size = pool_size.max(1);
    features
        .chunks(pool_size)
        .enumerate()
        .map(|(index, chunk)| FeatureBatch {
            number: index as u32 + 1,
            features: chunk.to_vec(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Generated files
// ---------------------------------------------------------------------------

/// Files proposed by an action, keyed by validated relative path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedFiles {
    pub files: BTreeMap<ArtifactPath, String>,
    /// Proposed paths rejected because they were absolute or escaped the
    /// workspace.
    pub rejected: Vec<String>,
}

impl GeneratedFiles {
    /// Reads the file set at `pointer` (a JSON pointer such as
    /// `/implementation/files`) in `doc`.
    ///
    /// Accepts `{path: content}` mappings (content may itself be a mapping
    /// with `content`) and lists of `{path, content}` records.
    pub fn at(doc: &Map<String, Value>, pointer: &str) -> Self {
        let root = Value::Object(doc.clone());
        let mut generated = GeneratedFiles::default();
        match root.pointer(pointer) {
            Some(Value::Object(map)) => {
                for (path, content) in map {
                    generated.add(path, content);
                }
            }
            Some(Value::Array(records)) => {
                for record in records {
                    let path = record
                        .get("path")
                        .or_else(|| record.get("name"))
                        .and_then(Value::as_str);
                    if let (Some(path), Some(content)) = (path, record.get("content")) {
                        generated.add(path, content);
                    }
                }
            }
            _ => {}
        }
        generated
    }

    fn add(&mut self, path: &str, content: &Value) {
        let text = match content {
            Value::String(s) => s.clone(),
            Value::Object(map) => match map.get("content") {
                Some(Value::String(s)) => s.clone(),
                _ => return,
            },
            Value::Null => return,
            other => other.to_string(),
        };
        match ArtifactPath::new(path) {
            Some(path) => {
                self.files.insert(path, text);
            }
            None => self.rejected.push(path.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

// ---------------------------------------------------------------------------
// Implementations
// ---------------------------------------------------------------------------

/// A feature implementation accepted into the run.
#[derive(Debug, Clone, PartialEq)]
pub struct Implementation {
    pub feature: FeatureName,
    pub files: GeneratedFiles,
    /// Full document the producing action returned; fed to later prompts.
    pub document: Map<String, Value>,
}

impl Implementation {
    /// Builds an implementation from an `ImplementFeature` result.
    pub fn from_result(feature: FeatureName, result: &ActionResult) -> Self {
        let document = result.to_document();
        let files = GeneratedFiles::at(&document, "/implementation/files");
        Self {
            feature,
            files,
            document,
        }
    }

    pub fn is_core(&self) -> bool {
        self.feature.as_str() == CORE_FEATURE
    }

    /// Prompt context for this implementation.
    pub fn to_context(&self) -> Value {
        Value::Object(self.document.clone())
    }
}
