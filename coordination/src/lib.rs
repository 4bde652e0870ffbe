//! Swarm Coordination Library
//!
//! Control plane for a swarm of workers landing one epic through git:
//! - Branch naming policy for integration and worker branches
//! - In-memory swarm registry with a single not-found signal
//! - Lifecycle state machine: `Created → IntegrationReady → Landed → CleanedUp`
//! - Repository handles: git CLI ([`GitRig`]) and in-memory ([`MemoryRig`])
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use swarm_coordination::{GitRig, Manager, Rig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rig = GitRig::open(Rig::from_path("/srv/rigs/app"))?;
//! let manager = Manager::new(Arc::new(rig));
//!
//! let swarm = manager.create("epic-1", &["Toast", "Nux"], "main")?;
//! let id = swarm.id.as_str();
//! manager.create_integration_branch(id)?;
//!
//! // Workers commit to their own branches...
//! let branch = manager.get_worker_branch(id, "Toast", "task-1");
//!
//! manager.merge_to_integration(id, &branch)?;
//! manager.land_to_main(id)?;
//! manager.cleanup_branches(id)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod naming;
pub mod registry;
pub mod rig;
pub mod state;
pub mod swarm;

pub use config::ManagerConfig;
pub use error::{ErrorKind, RepoError, RepoResult, SwarmError, SwarmResult};
pub use manager::{CleanupReport, Manager};
pub use naming::{integration_branch, worker_branch};
pub use registry::SwarmRegistry;
pub use rig::{GitRig, MemoryRig, RepoCall, Repository, Rig};
pub use state::{SwarmState, TransitionRecord};
pub use swarm::{Swarm, SwarmId};
