//! Branch naming policy
//!
//! Pure derivations, no registry access and no validation:
//! - integration branch: `swarm/<epic_id>`, stable per epic across swarm runs
//! - worker branch: `<swarm_id>/<worker>/<task_id>`, scoped to one swarm run
//!
//! Identifiers are expected to be well formed (no whitespace, no `..`).
//! Anything else is a caller error this layer does not detect.

/// Prefix shared by every integration branch
pub const INTEGRATION_BRANCH_PREFIX: &str = "swarm/";

/// Integration branch for an epic.
pub fn integration_branch(epic_id: &str) -> String {
    format!("{INTEGRATION_BRANCH_PREFIX}{epic_id}")
}

/// Branch a worker commits to for one task of a swarm.
pub fn worker_branch(swarm_id: &str, worker: &str, task_id: &str) -> String {
    format!("{swarm_id}/{worker}/{task_id}")
}

/// Namespace holding every task branch of one worker in one swarm.
pub fn worker_branch_prefix(swarm_id: &str, worker: &str) -> String {
    format!("{swarm_id}/{worker}/")
}
