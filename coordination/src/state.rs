//! Swarm lifecycle states and legal transition guards.
//!
//! ```text
//! Created → IntegrationReady → Landed → CleanedUp
//!                 ↕               ↕
//!              Merging         Merging
//! ```
//!
//! `Merging` is transient: it is entered at the start of a merge into the
//! integration branch and left again (back to the state it was entered from)
//! when the merge finishes, successfully or not. Swarms only move forward;
//! `CleanedUp` is terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwarmState {
    /// Registered; no integration branch yet.
    Created,
    /// Integration branch exists and accepts worker merges.
    IntegrationReady,
    /// A worker branch is being merged into the integration branch.
    Merging,
    /// Integration branch has been merged into the base branch.
    Landed,
    /// Integration and worker branches deleted — terminal state.
    CleanedUp,
}

impl SwarmState {
    /// Whether this is a terminal state (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::CleanedUp)
    }

    /// Whether worker branches can be merged into the integration branch.
    ///
    /// Landing is not terminal: follow-up merges are accepted and can be
    /// landed again.
    pub fn accepts_merges(self) -> bool {
        matches!(self, Self::IntegrationReady | Self::Landed)
    }
}

impl fmt::Display for SwarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::IntegrationReady => write!(f, "IntegrationReady"),
            Self::Merging => write!(f, "Merging"),
            Self::Landed => write!(f, "Landed"),
            Self::CleanedUp => write!(f, "CleanedUp"),
        }
    }
}

/// Legal transitions between swarm states.
///
/// ```text
/// Created          → IntegrationReady | CleanedUp
/// IntegrationReady → Merging | Landed | CleanedUp
/// Merging          → IntegrationReady | Landed
/// Landed           → Merging | CleanedUp
/// ```
///
/// Cleanup from before `Landed` is structurally legal; whether it is allowed
/// is a manager policy (`ManagerConfig::allow_unlanded_cleanup`).
pub fn is_legal_transition(from: SwarmState, to: SwarmState) -> bool {
    use SwarmState::*;

    matches!(
        (from, to),
        (Created, IntegrationReady)
            | (Created, CleanedUp)
            | (IntegrationReady, Merging)
            | (IntegrationReady, Landed)
            | (IntegrationReady, CleanedUp)
            // Merge finished: back to where it started
            | (Merging, IntegrationReady)
            | (Merging, Landed)
            | (Landed, Merging)
            | (Landed, CleanedUp)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// The state transitioned from.
    pub from: SwarmState,
    /// The state transitioned to.
    pub to: SwarmState,
    /// When the transition happened.
    pub at: DateTime<Utc>,
    /// Optional context about why this transition happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: SwarmState,
    pub to: SwarmState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal state transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}
