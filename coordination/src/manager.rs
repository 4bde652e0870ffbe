//! Swarm manager
//!
//! The façade callers drive a swarm through:
//!
//! ```text
//! create → create_integration_branch → merge_to_integration (×N)
//!        → land_to_main → cleanup_branches
//! ```
//!
//! Every lifecycle operation starts with the same registry lookup, so an
//! unknown id always fails with `SwarmNotFound` before any git call.
//! Operations on one swarm are serialized; different swarms run concurrently.
//! A failed operation never advances the swarm's state.

use crate::config::ManagerConfig;
use crate::error::{RepoError, SwarmError, SwarmResult};
use crate::naming;
use crate::registry::SwarmRegistry;
use crate::rig::{Repository, Rig};
use crate::state::SwarmState;
use crate::swarm::Swarm;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Branches touched by [`Manager::cleanup_branches`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Branches deleted, worker branches first, integration branch last.
    pub deleted: Vec<String>,
    /// Branches expected but already absent.
    pub missing: Vec<String>,
}

/// Coordinates swarms on one rig.
pub struct Manager {
    repo: Arc<dyn Repository>,
    registry: SwarmRegistry,
    config: ManagerConfig,
}

impl Manager {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self::with_config(repo, ManagerConfig::default())
    }

    pub fn with_config(repo: Arc<dyn Repository>, config: ManagerConfig) -> Self {
        Self {
            repo,
            registry: SwarmRegistry::new(),
            config,
        }
    }

    pub fn rig(&self) -> &Rig {
        self.repo.rig()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Register a new swarm for `epic_id`.
    pub fn create<S: AsRef<str>>(
        &self,
        epic_id: &str,
        workers: &[S],
        base_branch: &str,
    ) -> SwarmResult<Swarm> {
        self.registry.create(epic_id, workers, base_branch)
    }

    /// Current snapshot of a swarm.
    pub fn get_swarm(&self, swarm_id: &str) -> SwarmResult<Swarm> {
        self.registry.lookup(swarm_id)
    }

    pub fn list_swarms(&self) -> SwarmResult<Vec<Swarm>> {
        self.registry.list()
    }

    pub fn get_integration_branch(&self, swarm_id: &str) -> SwarmResult<String> {
        Ok(self.registry.lookup(swarm_id)?.integration_branch)
    }

    /// Branch name for a worker's task. Pure: no lookup, works for any id.
    pub fn get_worker_branch(&self, swarm_id: &str, worker: &str, task_id: &str) -> String {
        naming::worker_branch(swarm_id, worker, task_id)
    }

    /// Ensure the integration branch exists off the base branch.
    ///
    /// Idempotent: an existing integration branch is reused, and calling
    /// again after the swarm is ready only re-creates the branch if it has
    /// gone missing.
    pub fn create_integration_branch(&self, swarm_id: &str) -> SwarmResult<()> {
        let entry = self.registry.resolve(swarm_id)?;
        let _ops = entry.lock_ops()?;
        let swarm = entry.snapshot()?;

        if !matches!(
            swarm.state,
            SwarmState::Created | SwarmState::IntegrationReady | SwarmState::Landed
        ) {
            return Err(SwarmError::invalid_state(
                swarm_id,
                swarm.state,
                "create integration branch for",
            ));
        }

        let branch = &swarm.integration_branch;
        if self.repo.branch_exists(branch)? {
            debug!(swarm_id, branch = %branch, "Integration branch already exists");
        } else {
            match self.repo.create_branch(branch, &swarm.base_branch) {
                Ok(()) => {}
                // Created by someone else between the check and the call
                Err(RepoError::BranchExists { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        if swarm.state == SwarmState::Created {
            entry.update(|s| {
                s.advance_for(
                    SwarmState::IntegrationReady,
                    "create integration branch for",
                    Some("integration branch created"),
                )
            })??;
            info!(
                swarm_id,
                branch = %branch,
                base = %swarm.base_branch,
                "Integration branch ready"
            );
        }
        Ok(())
    }

    /// Merge `branch` into the swarm's integration branch.
    ///
    /// Order is whatever order callers merge in. A conflict is returned as is;
    /// nothing is retried and the swarm stays ready for the next merge. A
    /// branch with nothing new for the integration branch is accepted but not
    /// recorded as merged, so it never counts towards landing.
    pub fn merge_to_integration(&self, swarm_id: &str, branch: &str) -> SwarmResult<()> {
        const OPERATION: &str = "merge into integration branch of";

        let entry = self.registry.resolve(swarm_id)?;
        let _ops = entry.lock_ops()?;
        let swarm = entry.snapshot()?;

        if !swarm.state.accepts_merges() {
            return Err(SwarmError::invalid_state(swarm_id, swarm.state, OPERATION));
        }
        if branch == swarm.integration_branch || branch == swarm.base_branch {
            return Err(SwarmError::validation(format!(
                "cannot merge '{branch}' into the integration branch of swarm {swarm_id}"
            )));
        }
        let resume = swarm.state;

        entry.update(|s| s.advance_for(SwarmState::Merging, OPERATION, Some(branch)))??;

        let message = format!(
            "{} merge {} into {}",
            self.config.merge_message_prefix, branch, swarm.integration_branch
        );
        let result = self
            .repo
            .merge(branch, &swarm.integration_branch, &message);

        match result {
            Ok(false) => {
                entry.update(|s| s.advance_for(resume, OPERATION, Some("nothing to merge")))??;
                info!(swarm_id, branch, "Branch has no new commits, nothing merged");
                Ok(())
            }
            Ok(true) => {
                entry.update(|s| {
                    s.record_merge(branch);
                    s.advance_for(resume, OPERATION, Some("merge complete"))
                })??;
                info!(
                    swarm_id,
                    branch,
                    integration = %swarm.integration_branch,
                    "Merged into integration branch"
                );
                Ok(())
            }
            Err(e) => {
                entry.update(|s| s.advance_for(resume, OPERATION, Some("merge failed")))??;
                warn!(swarm_id, branch, error = %e, "Merge into integration branch failed");
                Err(e.into())
            }
        }
    }

    /// Merge the integration branch into the base branch.
    ///
    /// Requires at least one merged worker branch. A failed land leaves the
    /// swarm where it was, so landing can be retried after the conflict is
    /// resolved. Landing again after further merges is allowed.
    pub fn land_to_main(&self, swarm_id: &str) -> SwarmResult<()> {
        const OPERATION: &str = "land";

        let entry = self.registry.resolve(swarm_id)?;
        let _ops = entry.lock_ops()?;
        let swarm = entry.snapshot()?;

        if !swarm.state.accepts_merges() {
            return Err(SwarmError::invalid_state(swarm_id, swarm.state, OPERATION));
        }
        if swarm.merged_branches.is_empty() {
            return Err(SwarmError::NothingToLand {
                swarm_id: swarm_id.to_string(),
            });
        }

        let message = format!(
            "{} land {} into {}",
            self.config.merge_message_prefix, swarm.integration_branch, swarm.base_branch
        );
        match self
            .repo
            .merge(&swarm.integration_branch, &swarm.base_branch, &message)
        {
            Ok(true) => {}
            Ok(false) => debug!(
                swarm_id,
                base = %swarm.base_branch,
                "Base already contains the integration branch"
            ),
            Err(e) => {
                warn!(swarm_id, error = %e, "Landing failed");
                return Err(e.into());
            }
        }

        if swarm.state == SwarmState::Landed {
            entry.update(|s| s.updated_at = chrono::Utc::now())?;
            info!(swarm_id, base = %swarm.base_branch, "Re-landed follow-up merges");
        } else {
            entry.update(|s| {
                s.advance_for(SwarmState::Landed, OPERATION, Some("integration branch landed"))
            })??;
            info!(
                swarm_id,
                base = %swarm.base_branch,
                merged = swarm.merged_branches.len(),
                "Swarm landed"
            );
        }
        Ok(())
    }

    /// Delete the swarm's worker branches and its integration branch.
    ///
    /// Only a landed swarm may be cleaned up unless
    /// [`ManagerConfig::allow_unlanded_cleanup`] is set. Branches already
    /// gone are reported as missing, not treated as errors.
    pub fn cleanup_branches(&self, swarm_id: &str) -> SwarmResult<CleanupReport> {
        const OPERATION: &str = "clean up";

        let entry = self.registry.resolve(swarm_id)?;
        let _ops = entry.lock_ops()?;
        let swarm = entry.snapshot()?;

        let allowed = match swarm.state {
            SwarmState::Landed => true,
            SwarmState::Created | SwarmState::IntegrationReady => {
                self.config.allow_unlanded_cleanup
            }
            SwarmState::Merging | SwarmState::CleanedUp => false,
        };
        if !allowed {
            return Err(SwarmError::invalid_state(swarm_id, swarm.state, OPERATION));
        }
        if swarm.state != SwarmState::Landed {
            warn!(swarm_id, state = %swarm.state, "Cleaning up a swarm that has not landed");
        }

        let mut report = CleanupReport::default();

        for worker in &swarm.workers {
            let prefix = naming::worker_branch_prefix(swarm_id, worker);
            for branch in self.repo.list_branches(&prefix)? {
                delete_if_present(self.repo.as_ref(), &branch, &mut report)?;
            }
        }
        delete_if_present(self.repo.as_ref(), &swarm.integration_branch, &mut report)?;

        entry.update(|s| {
            s.advance_for(SwarmState::CleanedUp, OPERATION, Some("branches deleted"))
        })??;
        info!(
            swarm_id,
            deleted = report.deleted.len(),
            missing = report.missing.len(),
            "Swarm cleaned up"
        );
        Ok(report)
    }
}

fn delete_if_present(
    repo: &dyn Repository,
    branch: &str,
    report: &mut CleanupReport,
) -> SwarmResult<()> {
    match repo.delete_branch(branch) {
        Ok(()) => report.deleted.push(branch.to_string()),
        Err(RepoError::BranchNotFound { .. }) => report.missing.push(branch.to_string()),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
