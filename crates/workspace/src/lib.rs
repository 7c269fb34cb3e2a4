//! Workspace adapters.
//!
//! [`FsWorkspace`] writes the generated project to disk under an output
//! directory. [`MemoryWorkspace`] keeps everything in memory and is used by
//! tests and dry runs.
//!
//! Both accept only [`pipeline::ArtifactPath`]s, which are relative and never
//! escape the root, so containment is enforced before any I/O happens.

mod fs;
mod memory;

pub use fs::FsWorkspace;
pub use memory::MemoryWorkspace;

/// Directories created by `initialize`.
pub const LAYOUT: [&str; 3] = ["src", "docs", "tests"];
