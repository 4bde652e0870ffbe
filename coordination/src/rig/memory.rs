//! In-memory repository handle
//!
//! Models each branch as the set of commits reachable from it, records every
//! mutating call in order, and lets a test force a merge conflict between two
//! branches. Used by unit tests and by the CLI's `--dry-run`.

use super::{Repository, Rig};
use crate::error::{RepoError, RepoResult};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard};

/// A mutating call made against a [`MemoryRig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum RepoCall {
    CreateBranch { branch: String, base: String },
    Merge { source: String, target: String },
    DeleteBranch { branch: String },
}

#[derive(Default)]
struct MemoryState {
    /// Branch name to the commits reachable from its tip
    branches: BTreeMap<String, BTreeSet<u64>>,
    next_commit: u64,
    calls: Vec<RepoCall>,
    conflicts: HashSet<(String, String)>,
}

impl MemoryState {
    fn new_commit(&mut self) -> u64 {
        self.next_commit += 1;
        self.next_commit
    }

    /// Add a branch carrying one commit of its own; existing branches are kept.
    fn add_branch(&mut self, branch: String) {
        if !self.branches.contains_key(&branch) {
            let commit = self.new_commit();
            self.branches.insert(branch, BTreeSet::from([commit]));
        }
    }
}

/// Repository handle that keeps everything in memory.
pub struct MemoryRig {
    rig: Rig,
    state: Mutex<MemoryState>,
}

impl MemoryRig {
    /// Empty repository with no branches.
    pub fn new(rig: Rig) -> Self {
        Self {
            rig,
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Add existing branches (e.g. `main` and finished worker branches),
    /// each with a commit no other branch has.
    pub fn with_branches<I, S>(self, branches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut state = self.lock();
            for branch in branches {
                state.add_branch(branch.into());
            }
        }
        self
    }

    pub fn add_branch(&self, branch: impl Into<String>) {
        self.lock().add_branch(branch.into());
    }

    /// Add a new commit on top of an existing branch.
    pub fn commit(&self, branch: &str) -> RepoResult<()> {
        let mut state = self.lock();
        if !state.branches.contains_key(branch) {
            return Err(RepoError::branch_not_found(branch));
        }
        let commit = state.new_commit();
        if let Some(commits) = state.branches.get_mut(branch) {
            commits.insert(commit);
        }
        Ok(())
    }

    /// Make every merge of `source` into `target` conflict until resolved.
    pub fn inject_conflict(&self, source: impl Into<String>, target: impl Into<String>) {
        self.lock().conflicts.insert((source.into(), target.into()));
    }

    pub fn resolve_conflict(&self, source: &str, target: &str) {
        self.lock()
            .conflicts
            .remove(&(source.to_string(), target.to_string()));
    }

    /// Branch names, sorted.
    pub fn branches(&self) -> Vec<String> {
        self.lock().branches.keys().cloned().collect()
    }

    /// Successful mutating calls, in the order they were made.
    pub fn calls(&self) -> Vec<RepoCall> {
        self.lock().calls.clone()
    }

    // The state is only touched inside short, non-panicking sections, so a
    // poisoned lock still holds consistent data.
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Repository for MemoryRig {
    fn rig(&self) -> &Rig {
        &self.rig
    }

    fn branch_exists(&self, branch: &str) -> RepoResult<bool> {
        Ok(self.lock().branches.contains_key(branch))
    }

    fn create_branch(&self, branch: &str, base: &str) -> RepoResult<()> {
        let mut state = self.lock();
        if state.branches.contains_key(branch) {
            return Err(RepoError::branch_exists(branch));
        }
        let Some(commits) = state.branches.get(base).cloned() else {
            return Err(RepoError::branch_not_found(base));
        };
        state.branches.insert(branch.to_string(), commits);
        state.calls.push(RepoCall::CreateBranch {
            branch: branch.to_string(),
            base: base.to_string(),
        });
        Ok(())
    }

    fn merge(&self, source: &str, target: &str, _message: &str) -> RepoResult<bool> {
        let mut state = self.lock();
        let incoming = state
            .branches
            .get(source)
            .cloned()
            .ok_or_else(|| RepoError::branch_not_found(source))?;
        let head = state
            .branches
            .get(target)
            .ok_or_else(|| RepoError::branch_not_found(target))?;
        if incoming.is_subset(head) {
            return Ok(false);
        }
        if state
            .conflicts
            .contains(&(source.to_string(), target.to_string()))
        {
            return Err(RepoError::conflict(
                source,
                target,
                "conflicting files: (injected)",
            ));
        }
        let merge_commit = state.new_commit();
        if let Some(head) = state.branches.get_mut(target) {
            head.extend(incoming);
            head.insert(merge_commit);
        }
        state.calls.push(RepoCall::Merge {
            source: source.to_string(),
            target: target.to_string(),
        });
        Ok(true)
    }

    fn delete_branch(&self, branch: &str) -> RepoResult<()> {
        let mut state = self.lock();
        if state.branches.remove(branch).is_none() {
            return Err(RepoError::branch_not_found(branch));
        }
        state.calls.push(RepoCall::DeleteBranch {
            branch: branch.to_string(),
        });
        Ok(())
    }

    fn list_branches(&self, prefix: &str) -> RepoResult<Vec<String>> {
        Ok(self
            .lock()
            .branches
            .keys()
            .filter(|b| b.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_rig() -> MemoryRig {
        MemoryRig::new(Rig::new("test-rig", "/tmp/test-rig")).with_branches(["main"])
    }

    #[test]
    fn test_create_branch() {
        let rig = make_rig();
        rig.create_branch("swarm/e", "main").unwrap();
        assert!(rig.branch_exists("swarm/e").unwrap());
        assert!(matches!(
            rig.create_branch("swarm/e", "main"),
            Err(RepoError::BranchExists { .. })
        ));
        assert!(matches!(
            rig.create_branch("x", "missing"),
            Err(RepoError::BranchNotFound { .. })
        ));
        assert_eq!(rig.calls().len(), 1);
    }

    #[test]
    fn test_injected_conflict() {
        let rig = make_rig();
        rig.add_branch("feature");
        rig.inject_conflict("feature", "main");
        assert!(rig.merge("feature", "main", "m").unwrap_err().is_conflict());
        assert!(rig.calls().is_empty());

        rig.resolve_conflict("feature", "main");
        assert!(rig.merge("feature", "main", "m").unwrap());
        assert_eq!(
            rig.calls(),
            vec![RepoCall::Merge {
                source: "feature".into(),
                target: "main".into()
            }]
        );
    }

    #[test]
    fn test_merge_tracks_reachable_commits() {
        let rig = make_rig();
        rig.create_branch("swarm/e", "main").unwrap();
        rig.add_branch("feature");

        assert!(!rig.merge("main", "swarm/e", "m").unwrap());
        assert!(!rig.merge("swarm/e", "swarm/e", "m").unwrap());
        assert!(rig.merge("feature", "swarm/e", "m").unwrap());
        assert!(!rig.merge("feature", "swarm/e", "m").unwrap());

        rig.commit("feature").unwrap();
        assert!(rig.merge("feature", "swarm/e", "m").unwrap());
        assert!(rig.commit("missing").is_err());

        // Only merges that moved the target are recorded
        let merges = rig
            .calls()
            .into_iter()
            .filter(|c| matches!(c, RepoCall::Merge { .. }))
            .count();
        assert_eq!(merges, 2);
    }

    #[test]
    fn test_list_and_delete() {
        let rig = make_rig().with_branches(["sw-1/Toast/a", "sw-1/Toast/b", "sw-2/Nux/a"]);
        assert_eq!(
            rig.list_branches("sw-1/").unwrap(),
            vec!["sw-1/Toast/a", "sw-1/Toast/b"]
        );
        rig.delete_branch("sw-1/Toast/a").unwrap();
        assert!(matches!(
            rig.delete_branch("sw-1/Toast/a"),
            Err(RepoError::BranchNotFound { .. })
        ));
        assert_eq!(rig.branches(), vec!["main", "sw-1/Toast/b", "sw-2/Nux/a"]);
    }
}
