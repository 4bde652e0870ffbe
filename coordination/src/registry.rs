//! Swarm registry
//!
//! In-memory map from swarm id to swarm state, guarded by one mutex. The map
//! is never handed out; callers get snapshots. Each entry carries two locks:
//! - `swarm`: short-held, protects the record itself
//! - `ops`: held for a whole lifecycle operation, so git work on one swarm is
//!   serialized while other swarms proceed
//!
//! Lock order is always registry → entry. Nothing acquires the registry lock
//! while holding an entry lock.

use crate::error::{SwarmError, SwarmResult};
use crate::state::SwarmState;
use crate::swarm::{Swarm, SwarmId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

pub(crate) struct SwarmEntry {
    swarm: Mutex<Swarm>,
    ops: Mutex<()>,
}

impl SwarmEntry {
    fn new(swarm: Swarm) -> Self {
        Self {
            swarm: Mutex::new(swarm),
            ops: Mutex::new(()),
        }
    }

    /// Copy of the current record.
    pub(crate) fn snapshot(&self) -> SwarmResult<Swarm> {
        self.update(|swarm| swarm.clone())
    }

    /// Run `f` against the record under its lock.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut Swarm) -> R) -> SwarmResult<R> {
        let mut swarm = self
            .swarm
            .lock()
            .map_err(|e| SwarmError::lock_poisoned(format!("swarm record: {e}")))?;
        Ok(f(&mut swarm))
    }

    /// Exclusive right to run a lifecycle operation on this swarm.
    pub(crate) fn lock_ops(&self) -> SwarmResult<MutexGuard<'_, ()>> {
        self.ops
            .lock()
            .map_err(|e| SwarmError::lock_poisoned(format!("swarm operations: {e}")))
    }
}

/// Registry of every swarm created by one manager.
#[derive(Default)]
pub struct SwarmRegistry {
    entries: Mutex<HashMap<SwarmId, Arc<SwarmEntry>>>,
}

impl SwarmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> SwarmResult<MutexGuard<'_, HashMap<SwarmId, Arc<SwarmEntry>>>> {
        self.entries
            .lock()
            .map_err(|e| SwarmError::lock_poisoned(format!("swarm registry: {e}")))
    }

    /// Validate inputs and register a new swarm in state `Created`.
    ///
    /// Nothing is registered if validation fails. An epic may only back one
    /// swarm at a time: a second swarm for the same epic is rejected until
    /// the first has been cleaned up, since both would share one integration
    /// branch. A swarm abandoned before landing keeps its epic reserved until
    /// it is cleaned up, which needs
    /// [`ManagerConfig::allow_unlanded_cleanup`](crate::ManagerConfig::allow_unlanded_cleanup).
    pub fn create<S: AsRef<str>>(
        &self,
        epic_id: &str,
        workers: &[S],
        base_branch: &str,
    ) -> SwarmResult<Swarm> {
        let workers = validate_create(epic_id, workers, base_branch)?;

        let mut entries = self.entries()?;

        for entry in entries.values() {
            let conflicting = entry.update(|s| {
                (s.epic_id == epic_id && s.state != SwarmState::CleanedUp).then(|| s.id.clone())
            })?;
            if let Some(existing) = conflicting {
                return Err(SwarmError::validation(format!(
                    "epic '{epic_id}' is already active in swarm {existing}; \
                     land and clean it up first (an unlanded swarm needs \
                     allow_unlanded_cleanup)"
                )));
            }
        }

        // Ids are never reused: no entry is ever removed, so checking the
        // live map covers the registry's whole lifetime.
        let mut id = SwarmId::generate();
        while entries.contains_key(&id) {
            id = SwarmId::generate();
        }

        let swarm = Swarm::new(id.clone(), epic_id, workers, base_branch);
        entries.insert(id, Arc::new(SwarmEntry::new(swarm.clone())));

        tracing::info!(
            swarm_id = %swarm.id,
            epic = %swarm.epic_id,
            workers = swarm.workers.len(),
            base = %swarm.base_branch,
            "Swarm created"
        );

        Ok(swarm)
    }

    /// Snapshot of a swarm, or `SwarmNotFound`.
    pub fn lookup(&self, swarm_id: &str) -> SwarmResult<Swarm> {
        self.resolve(swarm_id)?.snapshot()
    }

    /// The single lookup-or-fail step every lifecycle operation goes through.
    pub(crate) fn resolve(&self, swarm_id: &str) -> SwarmResult<Arc<SwarmEntry>> {
        self.entries()?
            .get(swarm_id)
            .cloned()
            .ok_or_else(|| SwarmError::not_found(swarm_id))
    }

    /// Snapshots of every swarm, oldest first.
    pub fn list(&self) -> SwarmResult<Vec<Swarm>> {
        let entries: Vec<Arc<SwarmEntry>> = self.entries()?.values().cloned().collect();
        let mut swarms = entries
            .iter()
            .map(|e| e.snapshot())
            .collect::<SwarmResult<Vec<_>>>()?;
        swarms.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(swarms)
    }

    pub fn len(&self) -> SwarmResult<usize> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> SwarmResult<bool> {
        Ok(self.len()? == 0)
    }
}

fn validate_create<S: AsRef<str>>(
    epic_id: &str,
    workers: &[S],
    base_branch: &str,
) -> SwarmResult<Vec<String>> {
    validate_identifier("epic ID", epic_id)?;
    validate_identifier("base branch", base_branch)?;

    if workers.is_empty() {
        return Err(SwarmError::validation("a swarm needs at least one worker"));
    }

    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(workers.len());
    for worker in workers {
        let worker = worker.as_ref();
        validate_identifier("worker name", worker)?;
        if !seen.insert(worker) {
            return Err(SwarmError::validation(format!(
                "duplicate worker name '{worker}'"
            )));
        }
        names.push(worker.to_string());
    }
    Ok(names)
}

fn validate_identifier(what: &str, value: &str) -> SwarmResult<()> {
    if value.trim().is_empty() {
        return Err(SwarmError::validation(format!("{what} must not be empty")));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(SwarmError::validation(format!(
            "{what} '{value}' must not contain whitespace"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_lookup() {
        let registry = SwarmRegistry::new();
        let swarm = registry.create("epic-1", &["Toast"], "main").unwrap();

        let found = registry.lookup(swarm.id.as_str()).unwrap();
        assert_eq!(found.id, swarm.id);
        assert_eq!(found.epic_id, "epic-1");
        assert_eq!(found.workers, vec!["Toast"]);
        assert_eq!(found.base_branch, "main");
        assert_eq!(found.state, SwarmState::Created);
        assert_eq!(registry.len().unwrap(), 1);
    }

    #[test]
    fn test_lookup_unknown() {
        let registry = SwarmRegistry::new();
        let err = registry.lookup("nonexistent").unwrap_err();
        assert!(matches!(
            err,
            SwarmError::SwarmNotFound { ref swarm_id } if swarm_id == "nonexistent"
        ));
    }

    #[test]
    fn test_validation_registers_nothing() {
        let registry = SwarmRegistry::new();
        let none: [&str; 0] = [];

        assert!(matches!(
            registry.create("epic-1", &none, "main"),
            Err(SwarmError::Validation { .. })
        ));
        assert!(matches!(
            registry.create("", &["Toast"], "main"),
            Err(SwarmError::Validation { .. })
        ));
        assert!(matches!(
            registry.create("epic-1", &["Toast"], "  "),
            Err(SwarmError::Validation { .. })
        ));
        assert!(matches!(
            registry.create("epic-1", &["Toast", "Toast"], "main"),
            Err(SwarmError::Validation { .. })
        ));
        assert!(matches!(
            registry.create("epic 1", &["Toast"], "main"),
            Err(SwarmError::Validation { .. })
        ));
        assert!(registry.is_empty().unwrap());
    }

    #[test]
    fn test_active_epic_cannot_be_reused() {
        let registry = SwarmRegistry::new();
        let first = registry.create("epic-1", &["Toast"], "main").unwrap();
        let err = registry.create("epic-1", &["Nux"], "main").unwrap_err();
        assert!(err.to_string().contains(first.id.as_str()));
        assert!(err.to_string().contains("allow_unlanded_cleanup"));

        // Once cleaned up the epic is free again
        let entry = registry.resolve(first.id.as_str()).unwrap();
        entry
            .update(|s| s.advance(SwarmState::CleanedUp, None))
            .unwrap()
            .unwrap();
        let second = registry.create("epic-1", &["Nux"], "main").unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_list_is_ordered() {
        let registry = SwarmRegistry::new();
        let a = registry.create("epic-a", &["w"], "main").unwrap();
        let b = registry.create("epic-b", &["w"], "main").unwrap();
        let listed = registry.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().any(|s| s.id == a.id));
        assert!(listed.iter().any(|s| s.id == b.id));
        assert!(listed[0].created_at <= listed[1].created_at);
    }

    #[test]
    fn test_concurrent_create_unique_ids() {
        let registry = SwarmRegistry::new();
        let ids: Vec<SwarmId> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let registry = &registry;
                    scope.spawn(move || {
                        registry
                            .create(&format!("epic-{i}"), &["Toast"], "main")
                            .unwrap()
                            .id
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 16);
        assert_eq!(registry.len().unwrap(), 16);
    }

    #[test]
    fn test_poisoned_registry_is_reported() {
        let registry = SwarmRegistry::new();
        registry.create("epic-1", &["Toast"], "main").unwrap();

        std::thread::scope(|scope| {
            let result = scope
                .spawn(|| {
                    let _entries = registry.entries.lock().unwrap();
                    panic!("panic while holding the registry lock");
                })
                .join();
            assert!(result.is_err());
        });

        assert!(matches!(registry.len(), Err(SwarmError::LockPoisoned { .. })));
        assert!(matches!(
            registry.lookup("sw-anything"),
            Err(SwarmError::LockPoisoned { .. })
        ));
    }
}
