//! Swarm record: identity, worker set, base branch and lifecycle state.

use crate::error::{SwarmError, SwarmResult};
use crate::naming;
use crate::state::{is_legal_transition, IllegalTransition, SwarmState, TransitionRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a [`Swarm`], e.g. `sw-3f9c2a1b7d04`.
///
/// Distinct from the epic: two runs of the same epic get different ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwarmId(String);

impl SwarmId {
    /// Generate a new random id.
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(format!("sw-{}", &hex[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SwarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for SwarmId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SwarmId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A group of workers collaborating on one epic through one integration branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Swarm {
    /// Unique swarm identifier.
    pub id: SwarmId,
    /// Caller-supplied epic label.
    pub epic_id: String,
    /// Worker names, in assignment order. Fixed for the swarm's lifetime.
    pub workers: Vec<String>,
    /// Branch the integration branch forks from and lands into.
    pub base_branch: String,
    /// Derived from `epic_id`.
    pub integration_branch: String,
    /// Current lifecycle state.
    pub state: SwarmState,
    /// Branches merged into the integration branch, in merge order.
    #[serde(default)]
    pub merged_branches: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Every state transition, oldest first.
    #[serde(default)]
    pub transitions: Vec<TransitionRecord>,
}

impl Swarm {
    pub(crate) fn new(
        id: SwarmId,
        epic_id: impl Into<String>,
        workers: Vec<String>,
        base_branch: impl Into<String>,
    ) -> Self {
        let epic_id = epic_id.into();
        let now = Utc::now();
        Self {
            id,
            integration_branch: naming::integration_branch(&epic_id),
            epic_id,
            workers,
            base_branch: base_branch.into(),
            state: SwarmState::Created,
            merged_branches: Vec::new(),
            created_at: now,
            updated_at: now,
            transitions: Vec::new(),
        }
    }

    /// Branch name for one of this swarm's workers on a task.
    pub fn worker_branch(&self, worker: &str, task_id: &str) -> String {
        naming::worker_branch(self.id.as_str(), worker, task_id)
    }

    pub fn has_worker(&self, worker: &str) -> bool {
        self.workers.iter().any(|w| w == worker)
    }

    /// Move to `to`, recording the transition.
    pub(crate) fn advance(
        &mut self,
        to: SwarmState,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.state, to) {
            return Err(IllegalTransition {
                from: self.state,
                to,
            });
        }

        tracing::debug!(
            swarm_id = %self.id,
            from = %self.state,
            to = %to,
            "Swarm state transition"
        );

        let now = Utc::now();
        self.transitions.push(TransitionRecord {
            from: self.state,
            to,
            at: now,
            reason: reason.map(String::from),
        });
        self.state = to;
        self.updated_at = now;
        Ok(())
    }

    /// Like [`advance`](Self::advance), reporting an illegal move as
    /// `InvalidState` for `operation`.
    pub(crate) fn advance_for(
        &mut self,
        to: SwarmState,
        operation: &str,
        reason: Option<&str>,
    ) -> SwarmResult<()> {
        self.advance(to, reason)
            .map_err(|e| SwarmError::invalid_state(self.id.as_str(), e.from, operation))
    }

    pub(crate) fn record_merge(&mut self, branch: &str) {
        self.merged_branches.push(branch.to_string());
        self.updated_at = Utc::now();
    }

    /// `"<from> → <to>"` path through every recorded state.
    pub fn history(&self) -> String {
        let mut states = vec![SwarmState::Created.to_string()];
        states.extend(self.transitions.iter().map(|t| t.to.to_string()));
        states.join(" → ")
    }
}
