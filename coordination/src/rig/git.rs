//! Git CLI repository handle
//!
//! Runs `git` inside the rig's working copy. Merges need a checkout, and the
//! working copy is shared by every swarm on the rig, so each checkout+merge
//! sequence runs under one working-copy lock.

use super::{Repository, Rig};
use crate::error::{RepoError, RepoResult};
use std::process::{Command, Output};
use std::sync::Mutex;

/// Default number of retry attempts for transient failures
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay between retries in milliseconds
const RETRY_BASE_DELAY_MS: u64 = 100;

/// Repository handle backed by the `git` binary.
pub struct GitRig {
    rig: Rig,
    max_retries: u32,
    worktree: Mutex<()>,
}

impl GitRig {
    /// Open the rig, verifying its path is a git working copy.
    pub fn open(rig: Rig) -> RepoResult<Self> {
        let git = Self {
            rig,
            max_retries: DEFAULT_MAX_RETRIES,
            worktree: Mutex::new(()),
        };
        git.run_git(&["rev-parse", "--git-dir"]).map_err(|e| match e {
            RepoError::Git { message, .. } => RepoError::git(
                "open",
                format!("Not a git repository: {} ({message})", git.rig.path.display()),
            ),
            other => other,
        })?;
        Ok(git)
    }

    /// Override retry attempts for transient failures
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn command(&self, args: &[&str]) -> RepoResult<Output> {
        tracing::debug!(rig = %self.rig.name, args = ?args, "git");
        Ok(Command::new("git")
            .args(args)
            .current_dir(&self.rig.path)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()?)
    }

    /// Run git command and return trimmed stdout
    fn run_git(&self, args: &[&str]) -> RepoResult<String> {
        let output = self.command(args)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RepoError::git(args.join(" "), stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run git command with automatic retry for transient failures
    ///
    /// Uses exponential backoff: 100ms, 200ms, 400ms, etc.
    fn run_git_with_retry(&self, args: &[&str]) -> RepoResult<String> {
        let mut attempt = 0;
        loop {
            match self.run_git(args) {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = RETRY_BASE_DELAY_MS * (1 << attempt);
                    tracing::debug!(attempt, delay_ms = delay, error = %e, "Retrying git command");
                    std::thread::sleep(std::time::Duration::from_millis(delay));
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn lock_worktree(&self) -> RepoResult<std::sync::MutexGuard<'_, ()>> {
        self.worktree
            .lock()
            .map_err(|_| RepoError::git("lock", "working copy lock poisoned"))
    }

    /// Commit a local branch points at
    fn tip(&self, branch: &str) -> RepoResult<String> {
        self.run_git(&["rev-parse", "--verify", &format!("refs/heads/{branch}")])
    }

    fn current_branch(&self) -> RepoResult<String> {
        self.run_git(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    fn require_branch(&self, branch: &str) -> RepoResult<()> {
        if self.branch_exists(branch)? {
            Ok(())
        } else {
            Err(RepoError::branch_not_found(branch))
        }
    }

    /// Files left unmerged by a failed merge
    fn conflicted_files(&self) -> RepoResult<Vec<String>> {
        let out = self.run_git(&["diff", "--name-only", "--diff-filter=U"])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    fn abort_merge(&self) {
        if let Err(e) = self.run_git(&["merge", "--abort"]) {
            tracing::warn!(rig = %self.rig.name, error = %e, "git merge --abort failed");
        }
    }
}

impl Repository for GitRig {
    fn rig(&self) -> &Rig {
        &self.rig
    }

    fn branch_exists(&self, branch: &str) -> RepoResult<bool> {
        let refname = format!("refs/heads/{branch}");
        let output = self.command(&["show-ref", "--verify", "--quiet", &refname])?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(RepoError::git(
                "show-ref",
                String::from_utf8_lossy(&output.stderr).trim(),
            )),
        }
    }

    fn create_branch(&self, branch: &str, base: &str) -> RepoResult<()> {
        if self.branch_exists(branch)? {
            return Err(RepoError::branch_exists(branch));
        }
        self.require_branch(base)?;
        self.run_git_with_retry(&["branch", branch, base])?;
        tracing::debug!(rig = %self.rig.name, branch, base, "Branch created");
        Ok(())
    }

    fn merge(&self, source: &str, target: &str, message: &str) -> RepoResult<bool> {
        let _worktree = self.lock_worktree()?;

        self.require_branch(source)?;
        self.require_branch(target)?;
        let before = self.tip(target)?;

        self.run_git_with_retry(&["checkout", "--quiet", target, "--"])?;

        let output = self.command(&["merge", "--no-ff", "--no-edit", "-m", message, source])?;
        if output.status.success() {
            // "Already up to date" exits 0 without a commit
            let moved = self.tip(target)? != before;
            tracing::debug!(rig = %self.rig.name, source, target, moved, "Merged");
            return Ok(moved);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let conflicted = self.conflicted_files().unwrap_or_default();

        if !conflicted.is_empty() || stdout.contains("CONFLICT") {
            tracing::warn!(
                rig = %self.rig.name,
                source,
                target,
                files = ?conflicted,
                "Merge conflict, aborting merge"
            );
            self.abort_merge();
            let detail = if conflicted.is_empty() {
                stdout.trim().to_string()
            } else {
                format!("conflicting files: {}", conflicted.join(", "))
            };
            return Err(RepoError::conflict(source, target, detail));
        }

        Err(RepoError::git(
            format!("merge {source} into {target}"),
            stderr.trim(),
        ))
    }

    fn delete_branch(&self, branch: &str) -> RepoResult<()> {
        let _worktree = self.lock_worktree()?;

        self.require_branch(branch)?;

        // git refuses to delete the checked-out branch
        if self.current_branch()? == branch {
            self.run_git_with_retry(&["checkout", "--quiet", "--detach"])?;
        }

        self.run_git_with_retry(&["branch", "-D", branch])?;
        tracing::debug!(rig = %self.rig.name, branch, "Branch deleted");
        Ok(())
    }

    fn list_branches(&self, prefix: &str) -> RepoResult<Vec<String>> {
        let out = self.run_git(&["for-each-ref", "--format=%(refname)", "refs/heads/"])?;
        let mut branches: Vec<String> = out
            .lines()
            .filter_map(|line| line.strip_prefix("refs/heads/"))
            .filter(|name| name.starts_with(prefix))
            .map(str::to_string)
            .collect();
        branches.sort();
        Ok(branches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(
            status.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&status.stderr)
        );
    }

    fn git_output(dir: &Path, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    fn setup_git_repo() -> (tempfile::TempDir, GitRig) {
        let dir = tempdir().unwrap();

        git(dir.path(), &["init", "--quiet"]);
        git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(dir.path(), &["config", "user.email", "test@test.com"]);
        git(dir.path(), &["config", "user.name", "Test"]);

        std::fs::write(dir.path().join("README.md"), "# Test\n").unwrap();
        git(dir.path(), &["add", "."]);
        git(dir.path(), &["commit", "--quiet", "-m", "Initial commit"]);

        let rig = GitRig::open(Rig::from_path(dir.path())).unwrap();
        (dir, rig)
    }

    fn commit_on(dir: &Path, branch: &str, file: &str, content: &str) {
        git(dir, &["checkout", "--quiet", "-B", branch, "main"]);
        std::fs::write(dir.join(file), content).unwrap();
        git(dir, &["add", "."]);
        git(dir, &["commit", "--quiet", "-m", &format!("{branch}: {file}")]);
        git(dir, &["checkout", "--quiet", "main"]);
    }

    #[test]
    fn test_open_rejects_non_repo() {
        let dir = tempdir().unwrap();
        let err = GitRig::open(Rig::from_path(dir.path()))
            .err()
            .expect("plain directory is not a rig");
        assert!(err.to_string().contains("Not a git repository"));
    }

    #[test]
    fn test_create_and_exists() {
        let (_dir, rig) = setup_git_repo();
        assert!(rig.branch_exists("main").unwrap());
        assert!(!rig.branch_exists("swarm/epic-1").unwrap());

        rig.create_branch("swarm/epic-1", "main").unwrap();
        assert!(rig.branch_exists("swarm/epic-1").unwrap());

        assert!(matches!(
            rig.create_branch("swarm/epic-1", "main"),
            Err(RepoError::BranchExists { .. })
        ));
        assert!(matches!(
            rig.create_branch("swarm/epic-2", "no-such-base"),
            Err(RepoError::BranchNotFound { .. })
        ));
    }

    #[test]
    fn test_merge_and_list() {
        let (dir, rig) = setup_git_repo();
        rig.create_branch("swarm/epic-1", "main").unwrap();
        commit_on(dir.path(), "sw-1/Toast/t1", "toast.txt", "toast\n");

        assert!(rig
            .merge("sw-1/Toast/t1", "swarm/epic-1", "swarm: merge t1")
            .unwrap());
        assert!(dir.path().join("toast.txt").exists());
        assert_eq!(
            git_output(dir.path(), &["log", "-1", "--format=%s", "swarm/epic-1"]),
            "swarm: merge t1"
        );

        let listed = rig.list_branches("sw-1/").unwrap();
        assert_eq!(listed, vec!["sw-1/Toast/t1"]);
        assert!(rig.list_branches("sw-2/").unwrap().is_empty());
    }

    #[test]
    fn test_merge_without_new_commits_reports_no_change() {
        let (dir, rig) = setup_git_repo();
        rig.create_branch("swarm/epic-1", "main").unwrap();
        let tip = git_output(dir.path(), &["rev-parse", "swarm/epic-1"]);

        // Fresh off main: nothing to bring in
        assert!(!rig.merge("main", "swarm/epic-1", "m").unwrap());
        assert!(!rig.merge("swarm/epic-1", "swarm/epic-1", "m").unwrap());

        commit_on(dir.path(), "sw-1/Toast/t1", "toast.txt", "toast\n");
        assert!(rig.merge("sw-1/Toast/t1", "swarm/epic-1", "m").unwrap());
        assert!(!rig.merge("sw-1/Toast/t1", "swarm/epic-1", "m").unwrap());
        assert_ne!(git_output(dir.path(), &["rev-parse", "swarm/epic-1"]), tip);
    }

    #[test]
    fn test_merge_conflict_is_aborted() {
        let (dir, rig) = setup_git_repo();
        commit_on(dir.path(), "a", "README.md", "from a\n");
        commit_on(dir.path(), "b", "README.md", "from b\n");
        rig.merge("a", "main", "merge a").unwrap();

        let err = rig.merge("b", "main", "merge b").unwrap_err();
        assert!(err.is_conflict(), "expected conflict, got {err}");
        assert!(err.to_string().contains("README.md"));

        // Working copy is clean again
        let status = Command::new("git")
            .args(["status", "--porcelain"])
            .current_dir(dir.path())
            .output()
            .unwrap();
        assert!(String::from_utf8_lossy(&status.stdout).trim().is_empty());
    }

    #[test]
    fn test_index_lock_is_retried() {
        let (dir, rig) = setup_git_repo();
        rig.create_branch("swarm/epic-1", "main").unwrap();
        commit_on(dir.path(), "sw-1/Toast/t1", "toast.txt", "toast\n");
        let lock = dir.path().join(".git").join("index.lock");

        std::fs::write(&lock, "").unwrap();
        let rig = rig.with_retries(0);
        let err = rig
            .merge("sw-1/Toast/t1", "swarm/epic-1", "m")
            .unwrap_err();
        assert!(err.is_retryable(), "expected lock contention, got {err}");

        // Backoff is 100ms, 200ms, 400ms: the lock is gone before the last try
        let rig = rig.with_retries(3);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(std::time::Duration::from_millis(150));
                std::fs::remove_file(&lock).unwrap();
            });
            assert!(rig.merge("sw-1/Toast/t1", "swarm/epic-1", "m").unwrap());
        });
    }

    #[test]
    fn test_delete_checked_out_branch() {
        let (dir, rig) = setup_git_repo();
        rig.create_branch("swarm/epic-1", "main").unwrap();
        git(dir.path(), &["checkout", "--quiet", "swarm/epic-1"]);

        rig.delete_branch("swarm/epic-1").unwrap();
        assert!(!rig.branch_exists("swarm/epic-1").unwrap());
        assert!(matches!(
            rig.delete_branch("swarm/epic-1"),
            Err(RepoError::BranchNotFound { .. })
        ));
    }
}
