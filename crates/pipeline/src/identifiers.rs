//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging (for example)
//! a [`FeatureName`] with a [`WorkItemTitle`] even though both are strings under
//! the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty
            /// or whitespace only.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.trim().is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns a lowercase, filesystem-friendly form of the identifier.
            ///
            /// Every character outside `[a-z0-9]` collapses into a single `_`.
            pub fn slug(&self) -> String {
                slugify(&self.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

/// Lowercases `value` and collapses runs of non-alphanumeric characters into `_`.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_separator = false;
    for ch in value.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("unnamed");
    }
    slug
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single pipeline execution run.
///
/// Generated fresh for every CLI invocation; propagated through spans and the
/// final report so all activity from a single run can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineRunId(Uuid);

impl PipelineRunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a [`PipelineRunId`] from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for PipelineRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed
// ---------------------------------------------------------------------------

string_id! {
    /// Names one feature of the generated project (e.g. `"url_shortening"`).
    ///
    /// The reserved name `"core"` identifies the Tech Lead's foundational
    /// implementation.
    FeatureName
}

string_id! {
    /// Title of a remediation [`crate::WorkItem`]; unique within one sprint plan.
    WorkItemTitle
}

impl FeatureName {
    /// The reserved name of the foundational implementation.
    pub fn core() -> Self {
        Self("core".to_string())
    }
}

/// Remediation work is implemented under its item's title.
impl From<&WorkItemTitle> for FeatureName {
    fn from(title: &WorkItemTitle) -> Self {
        Self(title.0.clone())
    }
}

// ---------------------------------------------------------------------------

/// A file-system path relative to the workspace root.
///
/// Used for generated project files and for persisted artifacts
/// (`docs/<name>.json`). Absolute paths and parent-directory components are
/// rejected at construction so nothing can be written outside the workspace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactPath(String);

impl ArtifactPath {
    /// Creates a new path, returning `None` if it is empty, absolute, or
    /// escapes the workspace root via `..`.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let raw = value.into();
        let normalised = raw.trim().replace('\\', "/");
        let trimmed = normalised.trim_start_matches("./");
        if trimmed.is_empty() || trimmed.starts_with('/') || has_drive_prefix(trimmed) {
            return None;
        }
        if trimmed.split('/').any(|segment| segment == "..") {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    /// The artifact document path for `name`: `docs/<name>.json`.
    pub fn document(name: &str) -> Self {
        Self(format!("docs/{}.json", name))
    }

    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterates the `/`-separated segments of the path.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty() && *s != ".")
    }
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

impl TryFrom<String> for ArtifactPath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ArtifactPath::new(value.clone()).ok_or_else(|| format!("invalid artifact path '{}'", value))
    }
}

impl From<ArtifactPath> for String {
    fn from(path: ArtifactPath) -> Self {
        path.0
    }
}

impl std::fmt::Display for ArtifactPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
