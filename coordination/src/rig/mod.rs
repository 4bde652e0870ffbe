//! Repository handles
//!
//! A [`Rig`] names a working copy. A [`Repository`] exposes the branch
//! primitives the swarm manager needs on top of it:
//! - [`GitRig`] shells out to `git` in the working copy
//! - [`MemoryRig`] models branches in memory and records every mutation

pub mod git;
pub mod memory;

pub use git::GitRig;
pub use memory::{MemoryRig, RepoCall};

use crate::error::RepoResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A named working copy of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rig {
    pub name: String,
    pub path: PathBuf,
}

impl Rig {
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Rig named after the last component of its path.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "rig".to_string());
        Self::new(name, path)
    }
}

/// Branch primitives consumed by the swarm manager.
///
/// Implementations must be safe to call from several threads; the manager
/// serializes calls per swarm but not across swarms.
pub trait Repository: Send + Sync {
    /// Identity of the working copy.
    fn rig(&self) -> &Rig;

    fn branch_exists(&self, branch: &str) -> RepoResult<bool>;

    /// Create `branch` pointing at `base`.
    ///
    /// Fails with `BranchExists` if `branch` is present and `BranchNotFound`
    /// if `base` is missing.
    fn create_branch(&self, branch: &str, base: &str) -> RepoResult<()>;

    /// Merge `source` into `target` with a merge commit.
    ///
    /// Returns whether `target` moved: `false` when `source` had nothing
    /// `target` did not already contain. On conflict the merge is abandoned,
    /// the working copy left clean, and `Conflict` returned.
    fn merge(&self, source: &str, target: &str, message: &str) -> RepoResult<bool>;

    /// Delete `branch` whether or not it is fully merged.
    fn delete_branch(&self, branch: &str) -> RepoResult<()>;

    /// Every local branch whose name starts with `prefix`, sorted.
    fn list_branches(&self, prefix: &str) -> RepoResult<Vec<String>>;
}
