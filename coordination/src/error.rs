//! Swarm error types
//!
//! Two layers of errors:
//! - [`RepoError`] comes out of a [`Repository`](crate::rig::Repository) handle
//!   (git-level failures: conflicts, missing branches, I/O).
//! - [`SwarmError`] is what the [`Manager`](crate::Manager) returns. Repository
//!   errors are carried through it unmodified.

use crate::state::SwarmState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for repository handle operations
pub type RepoResult<T> = Result<T, RepoError>;

/// Result type alias for manager operations
pub type SwarmResult<T> = Result<T, SwarmError>;

/// Errors raised by a repository handle
#[derive(Error, Debug)]
pub enum RepoError {
    /// Branch already exists
    #[error("Branch already exists: {branch}")]
    BranchExists { branch: String },

    /// Branch does not exist
    #[error("Branch not found: {branch}")]
    BranchNotFound { branch: String },

    /// Merge could not complete automatically
    #[error("Merge conflict merging {source_branch} into {target}: {message}")]
    Conflict {
        source_branch: String,
        target: String,
        message: String,
    },

    /// Git command failed
    #[error("Git operation failed: {operation} - {message}")]
    Git { operation: String, message: String },

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RepoError {
    /// Create a branch-exists error
    pub fn branch_exists(branch: impl Into<String>) -> Self {
        Self::BranchExists {
            branch: branch.into(),
        }
    }

    /// Create a branch-not-found error
    pub fn branch_not_found(branch: impl Into<String>) -> Self {
        Self::BranchNotFound {
            branch: branch.into(),
        }
    }

    /// Create a merge conflict error
    pub fn conflict(
        source_branch: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            source_branch: source_branch.into(),
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a git error
    pub fn git(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Git {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether this is a merge conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Check if this error is retryable (transient failure)
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Git { message, .. } => {
                let lower = message.to_lowercase();
                // Lock file contention between concurrent git processes
                lower.contains("could not lock")
                    || lower.contains("index.lock")
                    || lower.contains("another git process")
                    || (lower.contains("unable to create") && lower.contains(".lock"))
            }
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
            ),
            // A conflict needs resolution before the merge can be tried again
            Self::Conflict { .. } => false,
            Self::BranchExists { .. } | Self::BranchNotFound { .. } => false,
        }
    }
}

/// Coarse error taxonomy, stable across variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Referenced swarm is not registered
    NotFound,
    /// Malformed input or configuration
    Validation,
    /// Operation not allowed in the swarm's current lifecycle state
    InvalidState,
    /// Merge needs manual or automated conflict resolution
    Conflict,
    /// Git, filesystem or locking failure
    Infrastructure,
}

/// Errors returned by the swarm manager
#[derive(Error, Debug)]
pub enum SwarmError {
    /// Swarm identifier is not registered
    #[error("Swarm not found: {swarm_id}")]
    SwarmNotFound { swarm_id: String },

    /// Invalid creation input
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Operation is not legal in the current state
    #[error("Cannot {operation} swarm {swarm_id} in state {state}")]
    InvalidState {
        swarm_id: String,
        state: SwarmState,
        operation: String,
    },

    /// Landing requested before any branch was merged
    #[error("Swarm {swarm_id} has no merged branches to land")]
    NothingToLand { swarm_id: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A registry or swarm lock was poisoned by a panicking thread
    #[error("Lock poisoned: {what}")]
    LockPoisoned { what: String },

    /// Repository handle failure, passed through unmodified
    #[error(transparent)]
    Repository(#[from] RepoError),
}

impl SwarmError {
    /// Create a swarm-not-found error
    pub fn not_found(swarm_id: impl Into<String>) -> Self {
        Self::SwarmNotFound {
            swarm_id: swarm_id.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(
        swarm_id: impl Into<String>,
        state: SwarmState,
        operation: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            swarm_id: swarm_id.into(),
            state,
            operation: operation.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a lock poisoned error
    pub fn lock_poisoned(what: impl Into<String>) -> Self {
        Self::LockPoisoned { what: what.into() }
    }

    /// Whether this is the not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SwarmNotFound { .. })
    }

    /// Map onto the coarse taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SwarmNotFound { .. } => ErrorKind::NotFound,
            Self::Validation { .. } | Self::Config { .. } => ErrorKind::Validation,
            Self::InvalidState { .. } | Self::NothingToLand { .. } => ErrorKind::InvalidState,
            Self::LockPoisoned { .. } => ErrorKind::Infrastructure,
            Self::Repository(e) if e.is_conflict() => ErrorKind::Conflict,
            Self::Repository(_) => ErrorKind::Infrastructure,
        }
    }

    /// Check if this error is retryable (transient failure)
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Repository(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Get recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::SwarmNotFound { .. } => {
                Some("Check the swarm ID. Swarms live only as long as the manager that created them.")
            }
            Self::Validation { .. } => Some(
                "Provide a non-empty epic ID, base branch and at least one uniquely named worker.",
            ),
            Self::InvalidState { .. } => Some(
                "Check the swarm state. Integration branch must exist before merging, \
                 and cleanup requires a landed swarm.",
            ),
            Self::NothingToLand { .. } => {
                Some("Merge at least one worker branch into the integration branch first.")
            }
            Self::Config { .. } => Some("Check the config file syntax and environment variables."),
            Self::LockPoisoned { .. } => {
                Some("A thread panicked while holding swarm state. Restart the manager.")
            }
            Self::Repository(RepoError::Conflict { .. }) => Some(
                "Resolve the conflict (rebase the worker branch or fix the integration branch), \
                 then retry the merge.",
            ),
            Self::Repository(RepoError::BranchNotFound { .. }) => {
                Some("Verify the branch exists: git branch --list")
            }
            Self::Repository(RepoError::BranchExists { .. }) => {
                Some("Delete or reuse the existing branch.")
            }
            Self::Repository(RepoError::Git { message, .. }) => {
                let lower = message.to_lowercase();
                if lower.contains("lock") || lower.contains("another git process") {
                    Some("Git lock file conflict. Wait a moment and retry.")
                } else if lower.contains("not a git repository") {
                    Some("Point the rig at a git working copy.")
                } else {
                    Some("Check git status and repository state: git status")
                }
            }
            Self::Repository(RepoError::Io(_)) => {
                Some("IO error occurred. Check that git is installed and the rig path exists.")
            }
        }
    }

    /// Get error with recovery suggestion formatted
    pub fn with_suggestion(&self) -> String {
        match self.recovery_suggestion() {
            Some(suggestion) => format!("{}\n\nRecovery: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}
